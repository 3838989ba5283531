//! The plan-adjustment agent.

use super::collaborators::{AdjustmentValidator, ExplanationGenerator, FeedbackParser, PlanModifier};
use super::explanations::LlmExplanationGenerator;
use super::modifier::RuleBasedModifier;
use super::output::{
    format_output, AdjustmentBucket, AdjustmentOutput, PlanAdjustmentState, ReflectionBucket,
    UnderstandingBucket,
};
use super::parser::LlmFeedbackParser;
use super::types::{AdjustmentInput, ConsiderationResult, ParsedFeedback};
use super::validator::{staleness_issues, RuleBasedValidator};
use super::{
    CONTENT_ADJUSTED_PLAN, CONTENT_ADJUSTMENT_REASONING, STEP_ADJUSTMENT, STEP_CONSIDERATION,
    STEP_CONTEXT_RETRIEVAL, STEP_INITIAL_UNDERSTANDING, STEP_MEMORY, STEP_REFLECTION,
};
use crate::agents::{log_fatal, Agent, AgentBase, AgentRequirements};
use crate::config::AgentConfig;
use crate::domain::WorkoutPlan;
use crate::errors::{AgentError, CoachError, ErrorCode};
use crate::memory::{MemoryMetadata, MemoryQuery, MemoryRecord, MemoryType};
use crate::observability::LogLevel;
use crate::pipeline::{CancellationToken, StageIssue};
use crate::ports::{AgentPorts, CompletionClient};
use crate::utils::{adjustment_id, now_millis, to_content};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// The collaborators a [`PlanAdjustmentAgent`] delegates to.
#[derive(Clone)]
pub struct AdjustmentCollaborators {
    /// Feedback parser.
    pub parser: Arc<dyn FeedbackParser>,
    /// Feasibility, safety, coherence and final validation.
    pub validator: Arc<dyn AdjustmentValidator>,
    /// Applies vetted changes.
    pub modifier: Arc<dyn PlanModifier>,
    /// Explanations and comparison.
    pub explainer: Arc<dyn ExplanationGenerator>,
}

impl AdjustmentCollaborators {
    /// Completion-backed parsing and explanations with rule-based vetting.
    #[must_use]
    pub fn defaults(completion: Arc<dyn CompletionClient>, config: &AgentConfig) -> Self {
        Self {
            parser: Arc::new(LlmFeedbackParser::new(completion.clone(), config.retry.clone())),
            validator: Arc::new(RuleBasedValidator::default()),
            modifier: Arc::new(RuleBasedModifier::default()),
            explainer: Arc::new(LlmExplanationGenerator::new(completion, config.retry.clone())),
        }
    }
}

impl std::fmt::Debug for AdjustmentCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdjustmentCollaborators").finish_non_exhaustive()
    }
}

/// Adjusts a workout plan from free-text user feedback.
///
/// Stages run in order: initial understanding, consideration, adjustment,
/// reflection, then two best-effort memory writes. A failure in any of the
/// four stages halts the run; memory problems only add warnings.
#[derive(Debug)]
pub struct PlanAdjustmentAgent {
    base: AgentBase,
    collaborators: AdjustmentCollaborators,
}

impl PlanAdjustmentAgent {
    /// Agent name used in logs and memory metadata.
    pub const NAME: &'static str = "plan_adjustment";

    /// Creates the agent with default collaborators.
    pub fn new(ports: AgentPorts, config: AgentConfig) -> Result<Self, CoachError> {
        let base = AgentBase::new(Self::NAME, ports, AgentRequirements::completion_only(), config)?;
        let collaborators = AdjustmentCollaborators::defaults(base.completion().clone(), base.config());
        Ok(Self { base, collaborators })
    }

    /// Creates the agent with injected collaborators.
    pub fn with_collaborators(
        ports: AgentPorts,
        config: AgentConfig,
        collaborators: AdjustmentCollaborators,
    ) -> Result<Self, CoachError> {
        let base = AgentBase::new(Self::NAME, ports, AgentRequirements::completion_only(), config)?;
        Ok(Self { base, collaborators })
    }

    /// Runs the pipeline and returns the formatted output even on failure.
    ///
    /// A fatal error yields `status: error` with the original plan echoed.
    pub async fn process_with_fallback(&self, input: AdjustmentInput) -> AdjustmentOutput {
        let cancel = CancellationToken::new();
        let (state, _) = self.execute(input, &cancel).await;
        format_output(state)
    }

    async fn execute(
        &self,
        input: AdjustmentInput,
        cancel: &CancellationToken,
    ) -> (PlanAdjustmentState, Result<(), CoachError>) {
        let mut state = PlanAdjustmentState::new(input);
        self.base.log(
            LogLevel::Info,
            "Adjusting plan",
            Some(json!({
                "planId": state.input.plan.id,
                "userId": state.input.user_profile.id,
            })),
        );

        let result = self.run(&mut state, cancel).await;
        if let Err(err) = &result {
            state.trace.record_fatal(err);
            log_fatal(&self.base, err);
        }
        (state, result)
    }

    async fn run(&self, state: &mut PlanAdjustmentState, cancel: &CancellationToken) -> Result<(), CoachError> {
        let runner = self.base.runner(cancel);

        let history = runner
            .non_critical(STEP_CONTEXT_RETRIEVAL, self.retrieve_history(&state.input))
            .await;
        state.history = state
            .trace
            .absorb("Memory retrieval failed", history)
            .unwrap_or_default();

        runner.guard(STEP_INITIAL_UNDERSTANDING, self.check_input(&state.input))?;
        let (understanding, parser_warnings) = runner
            .critical(
                STEP_INITIAL_UNDERSTANDING,
                ErrorCode::Processing,
                self.understand(&state.input, &state.history),
            )
            .await?;
        for warning in parser_warnings {
            state.trace.warn(warning);
        }
        state.trace.reason(format!(
            "Understood {} change request(s) across {} categor{}",
            understanding.parsed.items.len(),
            understanding.categories.len(),
            if understanding.categories.len() == 1 { "y" } else { "ies" }
        ));
        state.trace.complete(STEP_INITIAL_UNDERSTANDING);
        let parsed = understanding.parsed.clone();
        state.initial_understanding = Some(understanding);

        let consideration = runner
            .critical(
                STEP_CONSIDERATION,
                ErrorCode::Processing,
                self.consider(&state.input, &parsed),
            )
            .await?;
        state.trace.reason(format!(
            "{} of {} request(s) passed feasibility, safety and coherence checks",
            consideration.vetted.items.len(),
            parsed.items.len()
        ));
        state.trace.complete(STEP_CONSIDERATION);
        let consideration = &*state.consideration.insert(consideration);

        let adjustment = runner
            .critical(
                STEP_ADJUSTMENT,
                ErrorCode::Processing,
                self.adjust(&state.input.plan, consideration),
            )
            .await?;
        state.trace.reason(format!(
            "Applied {} change(s), skipped {}",
            adjustment.applied.len(),
            adjustment.skipped.len()
        ));
        state.trace.complete(STEP_ADJUSTMENT);
        let adjustment = &*state.adjustment.insert(adjustment);

        let reflection = runner
            .critical(
                STEP_REFLECTION,
                ErrorCode::Processing,
                self.reflect(&state.input, adjustment),
            )
            .await?;
        if !reflection.validation.is_valid {
            let message = format!(
                "Adjusted plan failed validation: {}",
                reflection.validation.issues.join("; ")
            );
            state.trace.warn(message.clone());
            state.trace.record_issue(
                StageIssue::non_critical(STEP_REFLECTION, message, ErrorCode::Validation)
                    .with_details(json!({ "issues": reflection.validation.issues })),
            );
        }
        state.trace.complete(STEP_REFLECTION);
        state.reflection = Some(reflection);

        runner.check_cancelled(STEP_MEMORY)?;
        self.store_outcome(state).await;
        Ok(())
    }

    async fn retrieve_history(&self, input: &AdjustmentInput) -> Result<Vec<MemoryRecord>, CoachError> {
        let query = MemoryQuery::for_user(input.user_profile.id.as_str())
            .of_type(MemoryType::AgentOutput)
            .content_type(CONTENT_ADJUSTED_PLAN)
            .limit(self.base.config().memory.retrieval_limit);
        self.base.retrieve_memories(&query).await
    }

    fn check_input(&self, input: &AdjustmentInput) -> Result<(), CoachError> {
        self.base.validate(
            &input.plan,
            |plan: &WorkoutPlan| plan.id.as_deref().is_some_and(|id| !id.trim().is_empty()),
            "Plan must have an id",
        )?;
        self.base.validate(
            input.feedback.as_str(),
            |feedback: &str| !feedback.trim().is_empty(),
            "Feedback must not be empty",
        )
    }

    async fn understand(
        &self,
        input: &AdjustmentInput,
        history: &[MemoryRecord],
    ) -> Result<(UnderstandingBucket, Vec<String>), CoachError> {
        let outcome = self
            .collaborators
            .parser
            .parse(&input.feedback, &input.plan, history)
            .await?;
        let categories = outcome.parsed.category_counts();
        Ok((
            UnderstandingBucket {
                parsed: outcome.parsed,
                categories,
            },
            outcome.warnings,
        ))
    }

    async fn consider(
        &self,
        input: &AdjustmentInput,
        parsed: &ParsedFeedback,
    ) -> Result<ConsiderationResult, CoachError> {
        let validator = &self.collaborators.validator;
        let (feasibility, safety, coherence) = futures::try_join!(
            validator.analyze_feasibility(&input.plan, parsed),
            validator.check_safety(&input.plan, parsed, &input.user_profile),
            validator.verify_coherence(&input.plan, parsed, &input.user_profile),
        )?;
        Ok(ConsiderationResult::merge(parsed, &feasibility, &safety, &coherence))
    }

    async fn adjust(
        &self,
        plan: &WorkoutPlan,
        consideration: &ConsiderationResult,
    ) -> Result<AdjustmentBucket, CoachError> {
        let mut result = self
            .collaborators
            .modifier
            .apply(plan, &consideration.vetted, &consideration.summary)
            .await?;

        let Some(mut modified) = result.modified_plan.take() else {
            return Err(AgentError::processing(
                "Plan modifier returned an invalid structure: no modified plan",
            )
            .with_detail("invalidStructure", true)
            .into());
        };

        let id = adjustment_id(plan.id.as_deref().unwrap_or_default(), now_millis());
        modified.id = Some(id.clone());
        Ok(AdjustmentBucket::from_result(id, modified, result))
    }

    async fn reflect(
        &self,
        input: &AdjustmentInput,
        adjustment: &AdjustmentBucket,
    ) -> Result<ReflectionBucket, CoachError> {
        let validator = &self.collaborators.validator;
        let explainer = &self.collaborators.explainer;
        let (mut validation, explanations, comparison) = futures::try_join!(
            validator.validate_adjusted_plan(&input.plan, &adjustment.plan, &input.user_profile),
            explainer.explain(&input.plan, &adjustment.plan, &adjustment.applied, &input.user_profile),
            explainer.compare(&input.plan, &adjustment.plan),
        )?;

        for issue in staleness_issues(&input.plan, &adjustment.plan) {
            if !validation.issues.contains(&issue) {
                validation.issues.push(issue);
            }
        }
        validation.is_valid = validation.is_valid && validation.issues.is_empty();

        Ok(ReflectionBucket {
            validation,
            explanations,
            comparison,
        })
    }

    async fn store_outcome(&self, state: &mut PlanAdjustmentState) {
        let Some(adjustment) = state.adjustment.as_ref() else {
            return;
        };
        let user_id = state.input.user_profile.id.as_str();

        let plan_write = async {
            let content = to_content(&adjustment.plan)?;
            let metadata = MemoryMetadata::agent_output(user_id, CONTENT_ADJUSTED_PLAN)
                .with_plan_id(adjustment.adjusted_plan_id.as_str())
                .with_tags(["plan_adjustment", "workout_plan"]);
            self.base.store_memory(content, metadata).await
        };
        let reasoning_write = async {
            let content = json!({
                "originalPlanId": state.input.plan.id,
                "feedback": state.input.feedback,
                "reasoning": state.trace.reasoning,
                "considerations": state.consideration.as_ref().map(|c| &c.summary),
                "appliedChanges": adjustment.applied,
                "skippedChanges": adjustment.skipped,
            });
            let metadata = MemoryMetadata::agent_metadata(user_id, CONTENT_ADJUSTMENT_REASONING)
                .with_plan_id(adjustment.adjusted_plan_id.as_str())
                .with_tags(["plan_adjustment", "reasoning"]);
            self.base.store_memory(content, metadata).await
        };

        let (plan_stored, reasoning_stored) = futures::join!(plan_write, reasoning_write);
        state
            .trace
            .absorb("Memory storage failed (adjusted plan)", plan_stored);
        state
            .trace
            .absorb("Memory storage failed (adjustment reasoning)", reasoning_stored);
    }
}

#[async_trait]
impl Agent for PlanAdjustmentAgent {
    type Input = AdjustmentInput;
    type Output = AdjustmentOutput;

    fn base(&self) -> &AgentBase {
        &self.base
    }

    async fn process_with_cancellation(
        &self,
        input: AdjustmentInput,
        cancel: &CancellationToken,
    ) -> Result<AdjustmentOutput, CoachError> {
        let (state, result) = self.execute(input, cancel).await;
        result.map(|()| format_output(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::plan_adjustment::{
        compare_plans, AnalysisVerdict, AppliedChange, ChangeExplanation, ChangeRequest, Explanations,
        FeedbackCategory, FeedbackItem, MockAdjustmentValidator, MockExplanationGenerator,
        MockFeedbackParser, MockPlanModifier, ModificationResult, OutputStatus, ParseOutcome,
        PlanValidation, SafetyVerdict,
    };
    use crate::memory::InMemoryMemoryStore;
    use crate::pipeline::RetryPolicy;
    use crate::testing::{sample_plan, sample_profile, FailingMemoryStore, ScriptedCompletionClient};
    use pretty_assertions::assert_eq;

    fn config() -> AgentConfig {
        AgentConfig::default().with_retry(RetryPolicy::none())
    }

    fn input(feedback: &str) -> AdjustmentInput {
        AdjustmentInput {
            plan: sample_plan(),
            feedback: feedback.to_string(),
            user_profile: sample_profile(),
        }
    }

    fn ports() -> AgentPorts {
        AgentPorts::new().with_completion(Arc::new(ScriptedCompletionClient::new()))
    }

    fn leg_feedback() -> ParseOutcome {
        ParseOutcome {
            parsed: ParsedFeedback {
                items: vec![FeedbackItem::new(
                    "fb_1",
                    ChangeRequest::AddExercise { focus: "legs".into(), exercise: None },
                    "add more leg exercises",
                )],
                general_comments: vec![],
            },
            warnings: vec![],
        }
    }

    fn parser_ok() -> MockFeedbackParser {
        let mut parser = MockFeedbackParser::new();
        parser.expect_parse().returning(|_, _, _| Ok(leg_feedback()));
        parser
    }

    fn permissive_validator() -> MockAdjustmentValidator {
        validator_returning(PlanValidation::valid())
    }

    fn validator_returning(validation: PlanValidation) -> MockAdjustmentValidator {
        let mut validator = MockAdjustmentValidator::new();
        validator
            .expect_analyze_feasibility()
            .returning(|_, fb| Ok(AnalysisVerdict::accept_all(fb)));
        validator.expect_check_safety().returning(|_, fb, _| {
            Ok(SafetyVerdict {
                verdict: AnalysisVerdict::accept_all(fb),
                warnings: vec![],
            })
        });
        validator
            .expect_verify_coherence()
            .returning(|_, fb, _| Ok(AnalysisVerdict::accept_all(fb)));
        validator
            .expect_validate_adjusted_plan()
            .returning(move |_, _, _| Ok(validation.clone()));
        validator
    }

    fn touching_modifier() -> MockPlanModifier {
        let mut modifier = MockPlanModifier::new();
        modifier.expect_apply().returning(|plan, fb, _| {
            let mut modified = plan.clone();
            modified.touch();
            Ok(ModificationResult {
                modified_plan: Some(modified),
                applied_changes: fb
                    .items
                    .iter()
                    .map(|item| AppliedChange {
                        item_id: item.id.clone(),
                        category: FeedbackCategory::ExerciseAddition,
                        description: "Added Walking Lunge on monday".into(),
                        day: Some("monday".into()),
                    })
                    .collect(),
                skipped_changes: vec![],
            })
        });
        modifier
    }

    fn explainer_ok() -> MockExplanationGenerator {
        let mut explainer = MockExplanationGenerator::new();
        explainer.expect_explain().returning(|_, _, _, _| {
            Ok(Explanations {
                summary: "More leg work".into(),
                details: vec![ChangeExplanation {
                    change: "Added Walking Lunge".into(),
                    rationale: "Unilateral strength".into(),
                }],
            })
        });
        explainer
            .expect_compare()
            .returning(|original, adjusted| Ok(compare_plans(original, adjusted)));
        explainer
    }

    fn agent_with(
        ports: AgentPorts,
        parser: MockFeedbackParser,
        validator: MockAdjustmentValidator,
        modifier: MockPlanModifier,
        explainer: MockExplanationGenerator,
    ) -> PlanAdjustmentAgent {
        let collaborators = AdjustmentCollaborators {
            parser: Arc::new(parser),
            validator: Arc::new(validator),
            modifier: Arc::new(modifier),
            explainer: Arc::new(explainer),
        };
        PlanAdjustmentAgent::with_collaborators(ports, config(), collaborators).unwrap()
    }

    #[tokio::test]
    async fn test_leg_exercise_feedback_end_to_end() {
        let client = Arc::new(
            ScriptedCompletionClient::new()
                .then_json(json!({
                    "items": [{
                        "request": {"type": "add_exercise", "focus": "legs"},
                        "sourceText": "add more leg exercises"
                    }]
                }))
                .then_json(json!({
                    "summary": "Added a unilateral leg movement",
                    "details": [{"change": "Added Bulgarian Split Squat", "rationale": "Balances both legs"}]
                })),
        );
        let memory = Arc::new(InMemoryMemoryStore::new());
        let ports = AgentPorts::new()
            .with_completion(client.clone())
            .with_memory(memory.clone());
        let agent = PlanAdjustmentAgent::new(ports, config()).unwrap();

        let output = agent.process(input("add more leg exercises")).await.unwrap();

        assert_eq!(output.status, OutputStatus::Success);
        assert_eq!(output.changes_summary.len(), 1);
        assert_eq!(output.changes_summary[0].category, FeedbackCategory::ExerciseAddition);
        assert!(output.adjusted_plan.contains_exercise("Bulgarian Split Squat"));
        assert!(output
            .adjusted_plan_id
            .as_deref()
            .is_some_and(|id| id.starts_with("adj_plan-1_")));
        assert_eq!(output.adjusted_plan.id, output.adjusted_plan_id);
        assert!(!output.reasoning.is_empty());
        assert!(output.warnings.is_empty(), "{:?}", output.warnings);
        assert_eq!(
            output.explanations.ready().map(|e| e.summary.as_str()),
            Some("Added a unilateral leg movement")
        );
        assert_eq!(
            output.comparison.ready().map(|c| c.exercises_added.clone()),
            Some(vec!["Bulgarian Split Squat".to_string()])
        );
        assert_eq!(client.calls(), 2);
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn test_parser_failure_halts_before_modifier() {
        let mut parser = MockFeedbackParser::new();
        parser
            .expect_parse()
            .returning(|_, _, _| Err(AgentError::processing("parser offline").into()));
        let mut modifier = MockPlanModifier::new();
        modifier.expect_apply().never();

        let agent = agent_with(ports(), parser, permissive_validator(), modifier, explainer_ok());
        let err = agent.process(input("add more leg exercises")).await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Processing));
        assert_eq!(err.step(), Some(STEP_INITIAL_UNDERSTANDING));
        assert_eq!(err.message(), "initialUnderstanding failed: parser offline");
        assert_eq!(err.original_error().unwrap().message(), "parser offline");
    }

    #[tokio::test]
    async fn test_parser_validation_error_takes_stage_code() {
        let mut parser = MockFeedbackParser::new();
        parser
            .expect_parse()
            .returning(|_, _, _| Err(AgentError::validation("ambiguous feedback").into()));
        let mut modifier = MockPlanModifier::new();
        modifier.expect_apply().never();

        let agent = agent_with(ports(), parser, permissive_validator(), modifier, explainer_ok());
        let err = agent.process(input("add more leg exercises")).await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Processing));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.step(), Some(STEP_INITIAL_UNDERSTANDING));
        assert_eq!(err.message(), "initialUnderstanding failed: ambiguous feedback");
        assert_eq!(err.original_error().unwrap().code(), Some(ErrorCode::Validation));
    }

    #[tokio::test]
    async fn test_reflection_failure_halts_memory_writes() {
        let mut explainer = MockExplanationGenerator::new();
        explainer
            .expect_explain()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("llm down").into()));
        explainer
            .expect_compare()
            .returning(|original, adjusted| Ok(compare_plans(original, adjusted)));
        let memory = Arc::new(InMemoryMemoryStore::new());
        let ports = ports().with_memory(memory.clone());

        let agent = agent_with(ports, parser_ok(), permissive_validator(), touching_modifier(), explainer);
        let err = agent.process(input("add more leg exercises")).await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Processing));
        assert_eq!(err.step(), Some(STEP_REFLECTION));
        assert_eq!(err.message(), "reflection failed: llm down");
        assert_eq!(memory.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_failures_are_warnings() {
        let ports = ports().with_memory(Arc::new(FailingMemoryStore::new("store offline")));
        let agent = agent_with(ports, parser_ok(), permissive_validator(), touching_modifier(), explainer_ok());

        let output = agent.process(input("add more leg exercises")).await.unwrap();

        assert_eq!(output.status, OutputStatus::Success);
        assert_eq!(
            output.warnings,
            vec![
                "Memory retrieval failed: Memory store unavailable: store offline",
                "Memory storage failed (adjusted plan): Memory store unavailable: store offline",
                "Memory storage failed (adjustment reasoning): Memory store unavailable: store offline",
            ]
        );
        assert!(output.errors.is_empty());
    }

    #[tokio::test]
    async fn test_consideration_error_is_wrapped_with_step() {
        let mut validator = MockAdjustmentValidator::new();
        validator
            .expect_analyze_feasibility()
            .returning(|_, _| Err(anyhow::anyhow!("rules unavailable").into()));
        validator
            .expect_check_safety()
            .returning(|_, fb, _| Ok(SafetyVerdict { verdict: AnalysisVerdict::accept_all(fb), warnings: vec![] }));
        validator
            .expect_verify_coherence()
            .returning(|_, fb, _| Ok(AnalysisVerdict::accept_all(fb)));
        let mut modifier = MockPlanModifier::new();
        modifier.expect_apply().never();

        let agent = agent_with(ports(), parser_ok(), validator, modifier, explainer_ok());
        let err = agent.process(input("add more leg exercises")).await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Processing));
        assert_eq!(err.step(), Some(STEP_CONSIDERATION));
        assert_eq!(err.original_error().unwrap().message(), "rules unavailable");
        assert!(err.stack().contains("Caused by:"));
    }

    #[tokio::test]
    async fn test_missing_modified_plan_is_invalid_structure() {
        let mut modifier = MockPlanModifier::new();
        modifier
            .expect_apply()
            .returning(|_, _, _| Ok(ModificationResult::default()));
        let mut explainer = MockExplanationGenerator::new();
        explainer.expect_explain().never();

        let agent = agent_with(ports(), parser_ok(), permissive_validator(), modifier, explainer);

        let err = agent.process(input("add more leg exercises")).await.unwrap_err();
        assert_eq!(err.step(), Some(STEP_ADJUSTMENT));
        assert!(err.message().contains("invalid structure"));
        let cause = err.original_error().unwrap();
        assert_eq!(cause.details().unwrap()["invalidStructure"], json!(true));

        let degraded = agent.process_with_fallback(input("add more leg exercises")).await;
        assert_eq!(degraded.status, OutputStatus::Error);
        assert_eq!(degraded.adjusted_plan, sample_plan());
        assert!(degraded.explanations.ready().is_none());
        assert_eq!(degraded.errors.len(), 1);
        assert_eq!(degraded.errors[0].step, STEP_ADJUSTMENT);
        assert!(degraded.errors[0].critical);
    }

    #[tokio::test]
    async fn test_invalid_adjusted_plan_is_non_critical() {
        let validator = validator_returning(PlanValidation::from_issues(vec![
            "Session on monday has 13 exercises".into(),
        ]));

        let agent = agent_with(ports(), parser_ok(), validator, touching_modifier(), explainer_ok());
        let output = agent.process(input("add more leg exercises")).await.unwrap();

        assert_eq!(output.status, OutputStatus::Success);
        assert_eq!(
            output.warnings,
            vec!["Adjusted plan failed validation: Session on monday has 13 exercises"]
        );
        assert_eq!(output.errors.len(), 1);
        assert!(!output.errors[0].critical);
        assert_eq!(output.errors[0].code, ErrorCode::Validation);
        assert!(output.explanations.ready().is_some());
    }

    #[tokio::test]
    async fn test_stale_modified_plan_is_flagged() {
        let mut modifier = MockPlanModifier::new();
        modifier.expect_apply().returning(|plan, _, _| {
            Ok(ModificationResult {
                modified_plan: Some(plan.clone()),
                ..ModificationResult::default()
            })
        });

        let agent = agent_with(ports(), parser_ok(), permissive_validator(), modifier, explainer_ok());
        let output = agent.process(input("add more leg exercises")).await.unwrap();

        assert_eq!(output.errors.len(), 1);
        assert!(output.warnings[0].contains("does not advance original version"));
    }

    #[tokio::test]
    async fn test_empty_feedback_is_validation_error() {
        let mut parser = MockFeedbackParser::new();
        parser.expect_parse().never();

        let agent = agent_with(ports(), parser, permissive_validator(), touching_modifier(), explainer_ok());
        let err = agent.process(input("   ")).await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Validation));
        assert_eq!(err.message(), "Feedback must not be empty");
        assert_eq!(err.step(), Some(STEP_INITIAL_UNDERSTANDING));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_first_stage() {
        let mut parser = MockFeedbackParser::new();
        parser.expect_parse().never();
        let agent = agent_with(ports(), parser, permissive_validator(), touching_modifier(), explainer_ok());

        let cancel = CancellationToken::new();
        cancel.cancel("client disconnected");
        let err = agent
            .process_with_cancellation(input("add more leg exercises"), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(STEP_INITIAL_UNDERSTANDING));
        assert_eq!(err.details().unwrap()["cancelled"], json!(true));
    }

    #[tokio::test]
    async fn test_safe_process_formats_error() {
        let mut parser = MockFeedbackParser::new();
        parser
            .expect_parse()
            .returning(|_, _, _| Err(AgentError::processing("parser offline").into()));
        let agent = agent_with(ports(), parser, permissive_validator(), touching_modifier(), explainer_ok());

        let outcome = agent.safe_process(input("add more leg exercises")).await;

        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert_eq!(error.error_code.as_deref(), Some("PROCESSING_ERROR"));
    }

    #[test]
    fn test_missing_completion_fails_construction() {
        let err = PlanAdjustmentAgent::new(AgentPorts::new(), config()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Configuration));
    }
}
