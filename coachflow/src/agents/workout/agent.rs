//! The workout-generation agent.

use super::{
    CONTENT_WORKOUT_PLAN, STEP_INITIAL_UNDERSTANDING, STEP_MEMORY, STEP_PERSISTENCE,
    STEP_PLAN_GENERATION, STEP_REFLECTION, WORKOUT_PLANS_TABLE,
};
use crate::agents::{log_fatal, Agent, AgentBase, AgentRequirements};
use crate::config::AgentConfig;
use crate::domain::{check_plan_constraints, DaySchedule, PlanConstraints, UserProfile, WorkoutPlan, WEEKDAYS};
use crate::errors::{AgentError, CoachError, ErrorCode};
use crate::memory::{MemoryMetadata, MemoryQuery, MemoryRecord, MemoryType};
use crate::observability::LogLevel;
use crate::pipeline::{CancellationToken, PipelineTrace, StageIssue};
use crate::ports::{AgentPorts, ChatMessage};
use crate::utils::{generate_uuid, now_utc, to_content};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Request for a new weekly plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRequest {
    /// Who the plan is for.
    pub user_profile: UserProfile,
    /// Training days wanted.
    pub days_per_week: u32,
    /// Preferred session length.
    #[serde(default)]
    pub session_minutes: Option<u32>,
    /// Emphasis, e.g. `strength` or `hypertrophy`.
    #[serde(default)]
    pub focus: Option<String>,
    /// Anything else the user asked for.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Per-invocation state of the workout pipeline.
#[derive(Debug, Clone)]
pub struct WorkoutState {
    /// The request.
    pub input: WorkoutRequest,
    /// Names of previously generated plans.
    pub past_plans: Option<Vec<String>>,
    /// The generated plan; gains an id once persisted.
    pub plan: Option<WorkoutPlan>,
    /// Constraint problems found in reflection.
    pub issues: Option<Vec<String>>,
    /// Errors, warnings and reasoning.
    pub trace: PipelineTrace,
}

impl WorkoutState {
    fn new(input: WorkoutRequest) -> Self {
        Self {
            input,
            past_plans: None,
            plan: None,
            issues: None,
            trace: PipelineTrace::new(),
        }
    }
}

/// Result of a workout-generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutOutput {
    /// The generated plan.
    pub plan: WorkoutPlan,
    /// Constraint problems the plan still has.
    pub issues: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Reasoning lines.
    pub reasoning: Vec<String>,
    /// Non-critical stage issues.
    pub errors: Vec<StageIssue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedPlan {
    name: String,
    #[serde(default)]
    description: String,
    weekly_schedule: BTreeMap<String, DaySchedule>,
}

/// Generates a weekly plan with the completion service.
///
/// Persists the plan when a datastore is injected; otherwise the plan gets
/// a fresh id and is only returned.
#[derive(Debug)]
pub struct WorkoutAgent {
    base: AgentBase,
    constraints: PlanConstraints,
}

impl WorkoutAgent {
    /// Agent name used in logs and memory metadata.
    pub const NAME: &'static str = "workout";

    /// Creates the agent with default plan constraints.
    pub fn new(ports: AgentPorts, config: AgentConfig) -> Result<Self, CoachError> {
        let base = AgentBase::new(Self::NAME, ports, AgentRequirements::completion_only(), config)?;
        Ok(Self {
            base,
            constraints: PlanConstraints::default(),
        })
    }

    /// Replaces the constraints checked in reflection.
    #[must_use]
    pub fn with_constraints(mut self, constraints: PlanConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    async fn run(&self, state: &mut WorkoutState, cancel: &CancellationToken) -> Result<(), CoachError> {
        let runner = self.base.runner(cancel);

        runner.check_cancelled(STEP_INITIAL_UNDERSTANDING)?;
        runner.guard(STEP_INITIAL_UNDERSTANDING, self.validate_request(&state.input))?;
        let history = runner
            .non_critical(STEP_INITIAL_UNDERSTANDING, self.retrieve_past_plans(&state.input.user_profile))
            .await;
        let past_plans = state
            .trace
            .absorb("Memory retrieval failed", history)
            .unwrap_or_default()
            .iter()
            .filter_map(|record| record.content.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !past_plans.is_empty() {
            state.trace.reason(format!("Found {} earlier plan(s) to vary from", past_plans.len()));
        }
        state.trace.complete(STEP_INITIAL_UNDERSTANDING);
        let past_plans = &*state.past_plans.insert(past_plans);

        let plan = runner
            .critical(STEP_PLAN_GENERATION, ErrorCode::Processing, self.generate(&state.input, past_plans))
            .await?;
        state.trace.reason(format!(
            "Generated '{}' with {} session(s) and {} total sets",
            plan.name,
            plan.session_days().len(),
            plan.total_sets()
        ));
        state.trace.complete(STEP_PLAN_GENERATION);
        let plan = &*state.plan.insert(plan);

        let reflection = runner
            .non_critical(STEP_REFLECTION, async { Ok(self.reflect(plan, &state.input)) })
            .await;
        if let Some(issues) = state.trace.absorb("Plan reflection failed", reflection) {
            if !issues.is_empty() {
                state
                    .trace
                    .warn(format!("Generated plan failed validation: {}", issues.join("; ")));
                state.trace.record_issue(
                    StageIssue::non_critical(STEP_REFLECTION, "Generated plan failed validation", ErrorCode::Validation)
                        .with_details(json!({ "issues": issues })),
                );
            }
            state.trace.complete(STEP_REFLECTION);
            state.issues = Some(issues);
        }

        let Some(plan) = state.plan.as_mut() else {
            return Err(AgentError::processing("Workout pipeline lost its plan").into());
        };
        if self.base.datastore().is_some() {
            let id = runner
                .critical(STEP_PERSISTENCE, ErrorCode::ExternalService, self.persist(plan))
                .await?;
            plan.id = Some(id);
        } else {
            plan.id = Some(generate_uuid().to_string());
            state.trace.reason("No datastore configured; plan returned without persisting");
        }
        state.trace.complete(STEP_PERSISTENCE);

        runner.check_cancelled(STEP_MEMORY)?;
        let plan = &*plan;
        let stored = async {
            let mut metadata = MemoryMetadata::agent_output(plan.user_id.as_str(), CONTENT_WORKOUT_PLAN)
                .with_tags(["workout"]);
            if let Some(id) = &plan.id {
                metadata = metadata.with_plan_id(id.as_str());
            }
            self.base.store_memory(to_content(plan)?, metadata).await
        }
        .await;
        state.trace.absorb("Memory storage failed (workout plan)", stored);
        Ok(())
    }

    fn validate_request(&self, input: &WorkoutRequest) -> Result<(), CoachError> {
        self.base.validate(
            input.user_profile.id.as_str(),
            |id: &str| !id.trim().is_empty(),
            "User profile must have an id",
        )?;
        let max = u32::try_from(self.constraints.max_sessions_per_week).unwrap_or(u32::MAX);
        if input.days_per_week == 0 || input.days_per_week > max {
            return Err(AgentError::validation(format!("Days per week must be between 1 and {max}"))
                .with_detail("daysPerWeek", input.days_per_week)
                .into());
        }
        self.base.validate(
            &input.session_minutes,
            |minutes: &Option<u32>| minutes.map_or(true, |m| (15..=180).contains(&m)),
            "Session length must be between 15 and 180 minutes",
        )
    }

    async fn retrieve_past_plans(&self, profile: &UserProfile) -> Result<Vec<MemoryRecord>, CoachError> {
        let query = MemoryQuery::for_user(profile.id.as_str())
            .of_type(MemoryType::AgentOutput)
            .content_type(CONTENT_WORKOUT_PLAN)
            .limit(self.base.config().memory.retrieval_limit);
        self.base.retrieve_memories(&query).await
    }

    async fn generate(&self, input: &WorkoutRequest, past_plans: &[String]) -> Result<WorkoutPlan, CoachError> {
        let profile = &input.user_profile;
        let mut request = format!(
            "Create a {}-day weekly plan for a {:?} lifter. Focus: {}. Equipment: {}. Limitations: {}.",
            input.days_per_week,
            profile.fitness_level,
            input.focus.as_deref().unwrap_or("general fitness"),
            if profile.equipment.is_empty() { "bodyweight only".to_string() } else { profile.equipment.join(", ") },
            if profile.limitations.is_empty() { "none".to_string() } else { profile.limitations.join(", ") },
        );
        if let Some(minutes) = input.session_minutes {
            request.push_str(&format!(" Sessions last about {minutes} minutes."));
        }
        if let Some(notes) = &input.notes {
            request.push_str(&format!(" Notes: {notes}."));
        }
        if !past_plans.is_empty() {
            request.push_str(&format!(" Earlier plans: {}.", past_plans.join(", ")));
        }
        let messages = [
            ChatMessage::system(
                "You are a strength coach. Reply with JSON {\"name\", \"description\", \"weeklySchedule\"} \
                 where weeklySchedule maps lowercase weekdays to {\"type\": \"rest\"} or \
                 {\"type\": \"session\", \"focus\", \"exercises\": [{\"name\", \"sets\", \"reps\", \"muscleGroups\"}]}.",
            ),
            ChatMessage::user(request),
        ];

        let generated: GeneratedPlan = self
            .base
            .complete_json(&messages, &["name", "weeklySchedule"])
            .await?;
        into_plan(generated, input)
    }

    /// Constraint problems of a generated plan; empty means it passed.
    fn reflect(&self, plan: &WorkoutPlan, input: &WorkoutRequest) -> Vec<String> {
        let mut issues = check_plan_constraints(plan, &self.constraints);

        let sessions = plan.session_days().len();
        if u32::try_from(sessions).ok() != Some(input.days_per_week) {
            issues.push(format!(
                "Plan has {sessions} session(s) but {} were requested",
                input.days_per_week
            ));
        }
        for exercise in plan.exercises() {
            if let Some(group) = exercise
                .muscle_groups
                .iter()
                .find(|group| input.user_profile.has_limitation(group))
            {
                issues.push(format!("{} loads the user's {group} limitation", exercise.name));
            }
        }
        issues
    }

    /// Inserts the plan once and returns its stored id.
    async fn persist(&self, plan: &WorkoutPlan) -> Result<String, CoachError> {
        let datastore = self.base.require_datastore()?;
        let mut row = to_content(plan)?;
        if let Some(object) = row.as_object_mut() {
            object.remove("id");
        }
        let stored = datastore
            .insert(WORKOUT_PLANS_TABLE, row)
            .await
            .into_found("Stored workout plan")?;
        stored
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AgentError::processing("Stored workout plan has no id").into())
    }
}

/// Normalizes a decoded completion into a plan.
///
/// Day keys are lowercased and missing weekdays become rest days. A
/// schedule with no recognizable day is an invalid structure.
fn into_plan(generated: GeneratedPlan, input: &WorkoutRequest) -> Result<WorkoutPlan, CoachError> {
    let mut plan = WorkoutPlan::new(input.user_profile.id.as_str(), generated.name.trim());
    plan.description = generated.description;

    for (day, mut schedule) in generated.weekly_schedule {
        if let DaySchedule::Session { duration_minutes, .. } = &mut schedule {
            if duration_minutes.is_none() {
                *duration_minutes = input.session_minutes;
            }
        }
        plan.weekly_schedule.insert(day.trim().to_lowercase(), schedule);
    }
    if !WEEKDAYS.iter().any(|day| plan.weekly_schedule.contains_key(*day)) {
        return Err(AgentError::processing("Generated plan has an invalid structure: no weekday schedule")
            .with_detail("invalidStructure", true)
            .into());
    }
    for day in WEEKDAYS {
        plan.weekly_schedule.entry(day.to_string()).or_insert(DaySchedule::Rest);
    }
    let now = now_utc();
    plan.created_at = now;
    plan.updated_at = now;
    Ok(plan)
}

#[async_trait]
impl Agent for WorkoutAgent {
    type Input = WorkoutRequest;
    type Output = WorkoutOutput;

    fn base(&self) -> &AgentBase {
        &self.base
    }

    async fn process_with_cancellation(
        &self,
        input: WorkoutRequest,
        cancel: &CancellationToken,
    ) -> Result<WorkoutOutput, CoachError> {
        let mut state = WorkoutState::new(input);
        self.base.log(
            LogLevel::Info,
            "Generating workout plan",
            Some(json!({
                "userId": state.input.user_profile.id,
                "daysPerWeek": state.input.days_per_week,
            })),
        );

        if let Err(err) = self.run(&mut state, cancel).await {
            state.trace.record_fatal(&err);
            log_fatal(&self.base, &err);
            return Err(err);
        }

        let WorkoutState { plan, issues, trace, .. } = state;
        let plan = plan.ok_or_else(|| AgentError::processing("Workout pipeline finished without a plan"))?;
        Ok(WorkoutOutput {
            plan,
            issues: issues.unwrap_or_default(),
            warnings: trace.warnings,
            reasoning: trace.reasoning,
            errors: trace.errors,
        })
    }
}
