//! Pipeline state and the formatted result of a plan adjustment.

use super::types::{
    AdjustmentInput, AppliedChange, ConsiderationEntry, ConsiderationResult, Explanations,
    FeedbackCategory, ModificationResult, ParsedFeedback, PlanComparison, PlanValidation,
    SkippedChange,
};
use crate::domain::WorkoutPlan;
use crate::memory::MemoryRecord;
use crate::pipeline::{PipelineTrace, StageIssue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output of the initial-understanding stage.
#[derive(Debug, Clone, PartialEq)]
pub struct UnderstandingBucket {
    /// Structured feedback.
    pub parsed: ParsedFeedback,
    /// Items per category.
    pub categories: BTreeMap<FeedbackCategory, usize>,
}

/// Output of the adjustment stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentBucket {
    /// Generated id of the adjusted plan.
    pub adjusted_plan_id: String,
    /// Modified plan.
    pub plan: WorkoutPlan,
    /// Applied changes.
    pub applied: Vec<AppliedChange>,
    /// Skipped changes.
    pub skipped: Vec<SkippedChange>,
}

impl AdjustmentBucket {
    pub(crate) fn from_result(
        adjusted_plan_id: String,
        plan: WorkoutPlan,
        result: ModificationResult,
    ) -> Self {
        Self {
            adjusted_plan_id,
            plan,
            applied: result.applied_changes,
            skipped: result.skipped_changes,
        }
    }
}

/// Output of the reflection stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionBucket {
    /// Validation of the adjusted plan.
    pub validation: PlanValidation,
    /// Explanations for the user.
    pub explanations: Explanations,
    /// Before/after comparison.
    pub comparison: PlanComparison,
}

/// Per-invocation state of the plan-adjustment pipeline.
#[derive(Debug, Clone)]
pub struct PlanAdjustmentState {
    /// The request.
    pub input: AdjustmentInput,
    /// Past adjustments retrieved from memory.
    pub history: Vec<MemoryRecord>,
    /// Set once initial understanding completes.
    pub initial_understanding: Option<UnderstandingBucket>,
    /// Set once consideration completes.
    pub consideration: Option<ConsiderationResult>,
    /// Set once adjustment completes.
    pub adjustment: Option<AdjustmentBucket>,
    /// Set once reflection completes.
    pub reflection: Option<ReflectionBucket>,
    /// Errors, warnings and reasoning.
    pub trace: PipelineTrace,
}

impl PlanAdjustmentState {
    /// Fresh state for one run.
    #[must_use]
    pub fn new(input: AdjustmentInput) -> Self {
        Self {
            input,
            history: Vec::new(),
            initial_understanding: None,
            consideration: None,
            adjustment: None,
            reflection: None,
            trace: PipelineTrace::new(),
        }
    }
}

/// Overall result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    /// The pipeline completed.
    Success,
    /// A fatal error was recorded.
    Error,
}

/// A value that may be missing because the pipeline failed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Elaboration<T> {
    /// The value.
    Ready(T),
    /// Placeholder naming why the value is missing.
    Unavailable {
        /// Reason.
        error: String,
    },
}

impl<T> Elaboration<T> {
    fn unavailable(what: &str) -> Self {
        Self::Unavailable {
            error: format!("{what} unavailable due to processing error"),
        }
    }

    /// The value, if present.
    #[must_use]
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Result of a plan adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentOutput {
    /// Success or error.
    pub status: OutputStatus,
    /// Generated id, absent on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_plan_id: Option<String>,
    /// Id of the plan that was adjusted.
    #[serde(default)]
    pub original_plan_id: Option<String>,
    /// The adjusted plan, or the original on error.
    pub adjusted_plan: WorkoutPlan,
    /// Explanations.
    pub explanations: Elaboration<Explanations>,
    /// Comparison.
    pub comparison: Elaboration<PlanComparison>,
    /// Applied changes.
    pub changes_summary: Vec<AppliedChange>,
    /// Skipped changes.
    pub skipped_changes: Vec<SkippedChange>,
    /// Considerations summary.
    pub considerations: Vec<ConsiderationEntry>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Reasoning lines.
    pub reasoning: Vec<String>,
    /// Recorded stage issues.
    pub errors: Vec<StageIssue>,
}

/// Builds the output from the final state.
#[must_use]
pub fn format_output(state: PlanAdjustmentState) -> AdjustmentOutput {
    let PlanAdjustmentState {
        input,
        consideration,
        adjustment,
        reflection,
        trace,
        ..
    } = state;

    let considerations = consideration.map(|c| c.summary).unwrap_or_default();
    let original_plan_id = input.plan.id.clone();

    match (trace.has_fatal(), adjustment, reflection) {
        (false, Some(adjustment), Some(reflection)) => AdjustmentOutput {
            status: OutputStatus::Success,
            adjusted_plan_id: Some(adjustment.adjusted_plan_id),
            original_plan_id,
            adjusted_plan: adjustment.plan,
            explanations: Elaboration::Ready(reflection.explanations),
            comparison: Elaboration::Ready(reflection.comparison),
            changes_summary: adjustment.applied,
            skipped_changes: adjustment.skipped,
            considerations,
            warnings: trace.warnings,
            reasoning: trace.reasoning,
            errors: trace.errors,
        },
        (_, adjustment, _) => AdjustmentOutput {
            status: OutputStatus::Error,
            adjusted_plan_id: None,
            original_plan_id,
            adjusted_plan: input.plan,
            explanations: Elaboration::unavailable("Explanations"),
            comparison: Elaboration::unavailable("Comparison"),
            changes_summary: Vec::new(),
            skipped_changes: adjustment.map(|a| a.skipped).unwrap_or_default(),
            considerations,
            warnings: trace.warnings,
            reasoning: trace.reasoning,
            errors: trace.errors,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AgentError, CoachError};
    use crate::testing::{sample_plan, sample_profile};
    use serde_json::json;

    fn state() -> PlanAdjustmentState {
        PlanAdjustmentState::new(AdjustmentInput {
            plan: sample_plan(),
            feedback: "add more leg exercises".into(),
            user_profile: sample_profile(),
        })
    }

    #[test]
    fn test_error_output_echoes_original_plan() {
        let mut state = state();
        let err: CoachError = AgentError::processing("boom").with_step("consideration").into();
        state.trace.record_fatal(&err);

        let output = format_output(state);

        assert_eq!(output.status, OutputStatus::Error);
        assert_eq!(output.adjusted_plan, sample_plan());
        assert!(output.adjusted_plan_id.is_none());
        assert_eq!(
            serde_json::to_value(&output.explanations).unwrap(),
            json!({"error": "Explanations unavailable due to processing error"})
        );
        assert_eq!(output.errors[0].step, "consideration");
    }

    #[test]
    fn test_ready_elaboration_serializes_inline() {
        let value = serde_json::to_value(Elaboration::Ready(PlanComparison::default())).unwrap();
        assert_eq!(value["sessionsBefore"], json!(0));
        assert!(Elaboration::<PlanComparison>::unavailable("Comparison").ready().is_none());
    }
}
