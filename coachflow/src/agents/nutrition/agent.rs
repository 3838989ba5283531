//! The nutrition-planning agent.

use super::calculator::{MifflinStJeor, NutritionCalculator};
use super::{
    CONTENT_NUTRITION_PLAN, NUTRITION_PLANS_TABLE, PROFILES_TABLE, STEP_CALCULATE_BMR,
    STEP_CALCULATE_MACROS, STEP_CALCULATE_TDEE, STEP_EXPLANATION, STEP_FETCH_USER_DATA,
    STEP_MEAL_SUGGESTIONS, STEP_MEMORY, STEP_STORE_PLAN, STEP_VALIDATE_GOALS,
};
use crate::agents::{log_fatal, Agent, AgentBase, AgentRequirements};
use crate::config::AgentConfig;
use crate::domain::{GoalType, MacroTargets, MealSuggestion, NutritionGoal, NutritionPlan, UserProfile};
use crate::errors::{AgentError, CoachError, ErrorCode};
use crate::memory::MemoryMetadata;
use crate::observability::LogLevel;
use crate::pipeline::{CancellationToken, PipelineTrace, StageIssue};
use crate::ports::{AgentPorts, ChatMessage, CompletionOptions, SelectQuery};
use crate::utils::{now_utc, to_content};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Request for a nutrition plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRequest {
    /// User whose profile drives the numbers.
    pub user_id: String,
    /// What the user wants.
    pub goal: NutritionGoal,
}

/// Per-invocation state of the nutrition pipeline.
#[derive(Debug, Clone)]
pub struct NutritionState {
    /// The request.
    pub input: NutritionRequest,
    /// Profile loaded by `fetchUserData`.
    pub profile: Option<UserProfile>,
    /// Basal metabolic rate.
    pub bmr: Option<f64>,
    /// Total daily energy expenditure.
    pub tdee: Option<f64>,
    /// Daily targets.
    pub targets: Option<MacroTargets>,
    /// Meal ideas; empty when generation failed.
    pub meal_suggestions: Option<Vec<MealSuggestion>>,
    /// Explanation text.
    pub explanation: Option<String>,
    /// The plan as stored.
    pub plan: Option<NutritionPlan>,
    /// Errors, warnings and reasoning.
    pub trace: PipelineTrace,
}

impl NutritionState {
    fn new(input: NutritionRequest) -> Self {
        Self {
            input,
            profile: None,
            bmr: None,
            tdee: None,
            targets: None,
            meal_suggestions: None,
            explanation: None,
            plan: None,
            trace: PipelineTrace::new(),
        }
    }
}

/// Result of a nutrition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionOutput {
    /// The stored plan.
    pub plan: NutritionPlan,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Reasoning lines.
    pub reasoning: Vec<String>,
    /// Non-critical stage issues.
    pub errors: Vec<StageIssue>,
}

#[derive(Debug, Deserialize)]
struct MealPlanResponse {
    meals: Vec<MealSuggestion>,
}

/// Builds a nutrition plan from the user's stored profile.
///
/// The numbers come from a [`NutritionCalculator`]; the completion service
/// only suggests meals and writes the explanation.
pub struct NutritionAgent {
    base: AgentBase,
    calculator: Arc<dyn NutritionCalculator>,
}

impl std::fmt::Debug for NutritionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NutritionAgent")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl NutritionAgent {
    /// Agent name used in logs and memory metadata.
    pub const NAME: &'static str = "nutrition";

    /// Creates the agent with the Mifflin-St Jeor calculator.
    ///
    /// Fails if no completion client or no datastore is injected.
    pub fn new(ports: AgentPorts, config: AgentConfig) -> Result<Self, CoachError> {
        Self::with_calculator(ports, config, Arc::new(MifflinStJeor::default()))
    }

    /// Creates the agent with a custom calculator.
    pub fn with_calculator(
        ports: AgentPorts,
        config: AgentConfig,
        calculator: Arc<dyn NutritionCalculator>,
    ) -> Result<Self, CoachError> {
        let base = AgentBase::new(Self::NAME, ports, AgentRequirements::data_backed(), config)?;
        Ok(Self { base, calculator })
    }

    async fn run(&self, state: &mut NutritionState, cancel: &CancellationToken) -> Result<(), CoachError> {
        let runner = self.base.runner(cancel);

        let user_id = state.input.user_id.as_str();
        runner.check_cancelled(STEP_FETCH_USER_DATA)?;
        runner.guard(
            STEP_FETCH_USER_DATA,
            self.base
                .validate(user_id, |id: &str| !id.trim().is_empty(), "User id is required"),
        )?;
        let profile = runner
            .critical(STEP_FETCH_USER_DATA, ErrorCode::ExternalService, self.fetch_profile(user_id))
            .await?;
        let profile = runner.guard(
            STEP_FETCH_USER_DATA,
            profile.ok_or_else(|| {
                AgentError::resource("User profile not found")
                    .with_detail("userId", user_id)
                    .into()
            }),
        )?;
        state.trace.complete(STEP_FETCH_USER_DATA);
        let profile = &*state.profile.insert(profile);

        runner
            .critical(STEP_VALIDATE_GOALS, ErrorCode::Validation, async {
                validate_goal(&state.input.goal, profile)
            })
            .await?;
        state.trace.complete(STEP_VALIDATE_GOALS);

        let bmr = runner
            .critical(STEP_CALCULATE_BMR, ErrorCode::Processing, async { self.calculator.bmr(profile) })
            .await?;
        state.bmr = Some(bmr);
        state.trace.complete(STEP_CALCULATE_BMR);

        let tdee = runner
            .critical(STEP_CALCULATE_TDEE, ErrorCode::Processing, async {
                self.calculator.tdee(bmr, profile.activity_level)
            })
            .await?;
        state.tdee = Some(tdee);
        state.trace.complete(STEP_CALCULATE_TDEE);

        let targets = runner
            .critical(STEP_CALCULATE_MACROS, ErrorCode::Processing, async {
                self.calculator.macros(tdee, &state.input.goal, profile)
            })
            .await?;
        state.targets = Some(targets);
        state.trace.reason(format!(
            "BMR {bmr:.0} kcal, TDEE {tdee:.0} kcal, target {:.0} kcal ({:.0}g protein, {:.0}g carbs, {:.0}g fat)",
            targets.calories, targets.protein_g, targets.carbs_g, targets.fat_g
        ));
        state.trace.complete(STEP_CALCULATE_MACROS);

        let meals = runner
            .non_critical(STEP_MEAL_SUGGESTIONS, self.suggest_meals(profile, &state.input.goal, &targets))
            .await;
        let meals = match meals {
            Ok(meals) => {
                state.trace.complete(STEP_MEAL_SUGGESTIONS);
                meals
            }
            Err(err) => {
                state.trace.warn(format!("Meal suggestions unavailable: {}", err.message()));
                state.trace.record_issue(StageIssue::non_critical(
                    STEP_MEAL_SUGGESTIONS,
                    err.message(),
                    err.code().unwrap_or(ErrorCode::ExternalService),
                ));
                Vec::new()
            }
        };
        state.meal_suggestions = Some(meals);

        let explanation = runner
            .critical(
                STEP_EXPLANATION,
                ErrorCode::ExternalService,
                self.explain(profile, &state.input.goal, bmr, tdee, &targets),
            )
            .await?;
        state.explanation = Some(explanation.clone());
        state.trace.complete(STEP_EXPLANATION);

        let draft = NutritionPlan {
            id: None,
            user_id: profile.id.clone(),
            goal: state.input.goal.clone(),
            bmr,
            tdee,
            targets,
            meal_suggestions: state.meal_suggestions.clone().unwrap_or_default(),
            explanation,
            created_at: now_utc(),
        };
        let plan = runner
            .critical(STEP_STORE_PLAN, ErrorCode::ExternalService, self.store_plan(draft))
            .await?;
        state.trace.complete(STEP_STORE_PLAN);
        let plan = &*state.plan.insert(plan);

        runner.check_cancelled(STEP_MEMORY)?;
        let stored = async {
            let metadata = MemoryMetadata::agent_output(plan.user_id.as_str(), CONTENT_NUTRITION_PLAN)
                .with_tags(["nutrition", goal_tag(plan.goal.goal_type)]);
            let metadata = match &plan.id {
                Some(id) => metadata.with_plan_id(id.as_str()),
                None => metadata,
            };
            self.base.store_memory(to_content(plan)?, metadata).await
        }
        .await;
        state.trace.absorb("Memory storage failed (nutrition plan)", stored);
        Ok(())
    }

    /// Loads the profile; `None` when no row matches.
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>, CoachError> {
        let datastore = self.base.require_datastore()?;
        let row = match datastore
            .select(PROFILES_TABLE, &SelectQuery::new().eq("id", user_id).single())
            .await
            .into_result()?
        {
            None | Some(Value::Null) => return Ok(None),
            Some(row) => row,
        };
        serde_json::from_value(row).map(Some).map_err(|e| {
            AgentError::processing(format!("Stored profile has an invalid structure: {e}"))
                .with_detail("userId", user_id)
                .into()
        })
    }

    async fn suggest_meals(
        &self,
        profile: &UserProfile,
        goal: &NutritionGoal,
        targets: &MacroTargets,
    ) -> Result<Vec<MealSuggestion>, CoachError> {
        let restrictions = if profile.dietary_restrictions.is_empty() {
            "none".to_string()
        } else {
            profile.dietary_restrictions.join(", ")
        };
        let messages = [
            ChatMessage::system(
                "You are a sports nutritionist. Reply with JSON {\"meals\": [{\"meal\": \"breakfast\", \
                 \"name\": \"...\", \"description\": \"...\", \"calories\": 500}]}.",
            ),
            ChatMessage::user(format!(
                "Suggest {} meals for a {:?} goal totalling about {:.0} kcal with {:.0}g protein. \
                 Dietary restrictions: {restrictions}.",
                goal.meals_per_day, goal.goal_type, targets.calories, targets.protein_g
            )),
        ];
        let response: MealPlanResponse = self.base.complete_json(&messages, &["meals"]).await?;
        Ok(response.meals)
    }

    async fn explain(
        &self,
        profile: &UserProfile,
        goal: &NutritionGoal,
        bmr: f64,
        tdee: f64,
        targets: &MacroTargets,
    ) -> Result<String, CoachError> {
        let messages = [
            ChatMessage::system("You explain nutrition targets to clients in two short paragraphs."),
            ChatMessage::user(format!(
                "Client: {} years, {:.0} kg, {:?} activity, goal {:?}. BMR {bmr:.0}, TDEE {tdee:.0}. \
                 Targets: {:.0} kcal, {:.0}g protein, {:.0}g carbs, {:.0}g fat.",
                profile.age,
                profile.weight_kg,
                profile.activity_level,
                goal.goal_type,
                targets.calories,
                targets.protein_g,
                targets.carbs_g,
                targets.fat_g
            )),
        ];
        let options = CompletionOptions::default().with_model(self.base.config().completion.model.as_str());
        let text = self.base.complete_text(&messages, &options).await?;
        if text.trim().is_empty() {
            return Err(AgentError::processing("Completion returned an empty explanation").into());
        }
        Ok(text.trim().to_string())
    }

    /// Inserts the plan once; datastore writes are never retried.
    async fn store_plan(&self, mut plan: NutritionPlan) -> Result<NutritionPlan, CoachError> {
        let datastore = self.base.require_datastore()?;
        let mut row = to_content(&plan)?;
        if let Some(object) = row.as_object_mut() {
            object.remove("id");
        }
        let row = datastore
            .insert(NUTRITION_PLANS_TABLE, row)
            .await
            .into_found("Stored nutrition plan")?;
        plan.id = row.get("id").and_then(Value::as_str).map(str::to_string);
        Ok(plan)
    }
}

fn goal_tag(goal: GoalType) -> &'static str {
    match goal {
        GoalType::WeightLoss => "weight_loss",
        GoalType::Maintenance => "maintenance",
        GoalType::MuscleGain => "muscle_gain",
    }
}

fn validate_goal(goal: &NutritionGoal, profile: &UserProfile) -> Result<(), CoachError> {
    let invalid = |message: &str| -> Result<(), CoachError> {
        Err(AgentError::validation(message)
            .with_detail("goalType", goal_tag(goal.goal_type))
            .into())
    };

    if !(1..=6).contains(&goal.meals_per_day) {
        return invalid("Meals per day must be between 1 and 6");
    }
    if let Some(weekly) = goal.weekly_change_kg {
        if !(weekly.abs() > 0.0 && weekly.abs() <= 1.0) {
            return invalid("Weekly change must be above 0 and at most 1 kg");
        }
    }
    if let Some(target) = goal.target_weight_kg {
        if target < 30.0 {
            return invalid("Target weight must be at least 30 kg");
        }
        match goal.goal_type {
            GoalType::WeightLoss if target >= profile.weight_kg => {
                return invalid("Weight-loss target must be below the current weight");
            }
            GoalType::MuscleGain if target <= profile.weight_kg => {
                return invalid("Muscle-gain target must be above the current weight");
            }
            _ => {}
        }
    }
    Ok(())
}

#[async_trait]
impl Agent for NutritionAgent {
    type Input = NutritionRequest;
    type Output = NutritionOutput;

    fn base(&self) -> &AgentBase {
        &self.base
    }

    async fn process_with_cancellation(
        &self,
        input: NutritionRequest,
        cancel: &CancellationToken,
    ) -> Result<NutritionOutput, CoachError> {
        let mut state = NutritionState::new(input);
        self.base.log(
            LogLevel::Info,
            "Building nutrition plan",
            Some(json!({ "userId": state.input.user_id })),
        );

        if let Err(err) = self.run(&mut state, cancel).await {
            state.trace.record_fatal(&err);
            log_fatal(&self.base, &err);
            return Err(err);
        }

        let NutritionState { plan, trace, .. } = state;
        let plan = plan.ok_or_else(|| AgentError::processing("Nutrition pipeline finished without a plan"))?;
        Ok(NutritionOutput {
            plan,
            warnings: trace.warnings,
            reasoning: trace.reasoning,
            errors: trace.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMemoryStore;
    use crate::pipeline::RetryPolicy;
    use crate::ports::{CompletionError, InMemoryDatastore};
    use crate::testing::{
        assert_failed_at, sample_profile, FailingDatastore, FailingMemoryStore,
        ScriptedCompletionClient, SAMPLE_USER_ID,
    };
    use pretty_assertions::assert_eq;

    fn profiles() -> InMemoryDatastore {
        InMemoryDatastore::new().with_rows(PROFILES_TABLE, vec![serde_json::to_value(sample_profile()).unwrap()])
    }

    fn request(goal_type: GoalType) -> NutritionRequest {
        NutritionRequest {
            user_id: SAMPLE_USER_ID.to_string(),
            goal: NutritionGoal::new(goal_type),
        }
    }

    fn meals() -> Value {
        json!({"meals": [
            {"meal": "breakfast", "name": "Oats", "description": "Oats with whey", "calories": 550},
            {"meal": "lunch", "name": "Chicken bowl", "calories": 800}
        ]})
    }

    fn agent(client: ScriptedCompletionClient, datastore: Arc<dyn crate::ports::Datastore>) -> NutritionAgent {
        let ports = AgentPorts::new()
            .with_completion(Arc::new(client))
            .with_datastore(datastore);
        NutritionAgent::new(ports, AgentConfig::default().with_retry(RetryPolicy::none())).unwrap()
    }

    #[tokio::test]
    async fn test_full_run_stores_plan() {
        let datastore = Arc::new(profiles());
        let memory = Arc::new(InMemoryMemoryStore::new());
        let ports = AgentPorts::new()
            .with_completion(Arc::new(
                ScriptedCompletionClient::new().then_json(meals()).then_text("  Eat a little less.  "),
            ))
            .with_datastore(datastore.clone())
            .with_memory(memory.clone());
        let agent = NutritionAgent::new(ports, AgentConfig::default()).unwrap();

        let output = agent.process(request(GoalType::WeightLoss)).await.unwrap();

        assert_eq!(output.plan.bmr, 1780.0);
        assert_eq!(output.plan.tdee, 2759.0);
        assert_eq!(output.plan.targets.calories, 2209.0);
        assert_eq!(output.plan.meal_suggestions.len(), 2);
        assert_eq!(output.plan.explanation, "Eat a little less.");
        assert!(output.plan.id.is_some());
        assert!(output.warnings.is_empty());
        assert_eq!(datastore.rows(NUTRITION_PLANS_TABLE).len(), 1);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_profile_is_resource_error() {
        let agent = agent(ScriptedCompletionClient::new(), Arc::new(InMemoryDatastore::new()));

        let err = agent.process(request(GoalType::Maintenance)).await.unwrap_err();

        assert_failed_at(&err, STEP_FETCH_USER_DATA, ErrorCode::Resource);
        assert_eq!(err.message(), "User profile not found");
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_profile_lookup_failure_takes_stage_code() {
        let agent = agent(ScriptedCompletionClient::new(), Arc::new(FailingDatastore::new("connection reset")));

        let err = agent.process(request(GoalType::Maintenance)).await.unwrap_err();

        assert_failed_at(&err, STEP_FETCH_USER_DATA, ErrorCode::ExternalService);
        assert_eq!(err.message(), "fetchUserData failed: Datastore error: connection reset");
    }

    #[tokio::test]
    async fn test_blank_user_id_is_rejected_before_lookup() {
        let agent = agent(ScriptedCompletionClient::new(), Arc::new(FailingDatastore::new("unreachable")));
        let mut input = request(GoalType::Maintenance);
        input.user_id = "  ".into();

        let err = agent.process(input).await.unwrap_err();

        assert_failed_at(&err, STEP_FETCH_USER_DATA, ErrorCode::Validation);
        assert_eq!(err.message(), "User id is required");
    }

    #[tokio::test]
    async fn test_invalid_goal_is_validation_error() {
        let client = ScriptedCompletionClient::new();
        let agent = agent(client, Arc::new(profiles()));
        let mut input = request(GoalType::WeightLoss);
        input.goal.target_weight_kg = Some(95.0);

        let err = agent.process(input).await.unwrap_err();

        assert_failed_at(&err, STEP_VALIDATE_GOALS, ErrorCode::Validation);
        assert!(err.message().contains("below the current weight"));
    }

    #[tokio::test]
    async fn test_meal_suggestion_failure_is_warning() {
        let client = ScriptedCompletionClient::new()
            .then_text("I cannot help with that")
            .then_text("Your targets explained.");
        let agent = agent(client, Arc::new(profiles()));

        let output = agent.process(request(GoalType::MuscleGain)).await.unwrap();

        assert!(output.plan.meal_suggestions.is_empty());
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].starts_with("Meal suggestions unavailable"));
        assert_eq!(output.errors[0].step, STEP_MEAL_SUGGESTIONS);
    }

    #[tokio::test]
    async fn test_explanation_failure_is_fatal() {
        let client = ScriptedCompletionClient::new()
            .then_json(meals())
            .then_error(CompletionError::Upstream { status: 400, message: "bad request".into() });
        let datastore = Arc::new(profiles());
        let agent = agent(client, datastore.clone());

        let err = agent.process(request(GoalType::Maintenance)).await.unwrap_err();

        assert_failed_at(&err, STEP_EXPLANATION, ErrorCode::ExternalService);
        assert!(datastore.rows(NUTRITION_PLANS_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_retried() {
        let client = ScriptedCompletionClient::new()
            .then_json(meals())
            .then_text("Explained.");
        let datastore = Arc::new(FailingDatastore::failing_writes(profiles(), "disk full"));
        let memory = Arc::new(InMemoryMemoryStore::new());
        let ports = AgentPorts::new()
            .with_completion(Arc::new(client))
            .with_datastore(datastore)
            .with_memory(memory.clone());
        let agent = NutritionAgent::new(ports, AgentConfig::default()).unwrap();

        let err = agent.process(request(GoalType::Maintenance)).await.unwrap_err();

        assert_failed_at(&err, STEP_STORE_PLAN, ErrorCode::ExternalService);
        assert_eq!(err.message(), "storePlan failed: Datastore error: disk full");
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_memory_failure_keeps_plan() {
        let ports = AgentPorts::new()
            .with_completion(Arc::new(
                ScriptedCompletionClient::new().then_json(meals()).then_text("Explained."),
            ))
            .with_datastore(Arc::new(profiles()))
            .with_memory(Arc::new(FailingMemoryStore::new("offline")));
        let agent = NutritionAgent::new(ports, AgentConfig::default()).unwrap();

        let output = agent.process(request(GoalType::Maintenance)).await.unwrap();

        assert_eq!(
            output.warnings,
            vec!["Memory storage failed (nutrition plan): Memory store unavailable: offline"]
        );
    }

    #[test]
    fn test_requires_datastore() {
        let ports = AgentPorts::new().with_completion(Arc::new(ScriptedCompletionClient::new()));
        let err = NutritionAgent::new(ports, AgentConfig::default()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Configuration));
        assert_eq!(err.details().unwrap()["missing"], json!("datastore"));
    }
}
