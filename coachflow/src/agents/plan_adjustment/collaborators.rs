//! Capabilities the plan-adjustment pipeline delegates to.

use super::types::{
    AnalysisVerdict, AppliedChange, ConsiderationEntry, Explanations, ModificationResult,
    ParseOutcome, ParsedFeedback, PlanComparison, PlanValidation, SafetyVerdict,
};
use crate::domain::{UserProfile, WorkoutPlan};
use crate::errors::CoachError;
use crate::memory::MemoryRecord;
use async_trait::async_trait;

/// Turns free-text feedback into structured requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackParser: Send + Sync {
    /// Parses `feedback` about `plan`; `history` holds past adjustments.
    async fn parse(
        &self,
        feedback: &str,
        plan: &WorkoutPlan,
        history: &[MemoryRecord],
    ) -> Result<ParseOutcome, CoachError>;
}

/// Vets requested changes and the resulting plan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdjustmentValidator: Send + Sync {
    /// Which requests can be applied to the plan at all.
    async fn analyze_feasibility(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
    ) -> Result<AnalysisVerdict, CoachError>;

    /// Which requests are safe for the user.
    async fn check_safety(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
        profile: &UserProfile,
    ) -> Result<SafetyVerdict, CoachError>;

    /// Which requests are consistent with each other and the user's goals.
    async fn verify_coherence(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
        profile: &UserProfile,
    ) -> Result<AnalysisVerdict, CoachError>;

    /// Validates the adjusted plan against domain constraints.
    async fn validate_adjusted_plan(
        &self,
        original: &WorkoutPlan,
        adjusted: &WorkoutPlan,
        profile: &UserProfile,
    ) -> Result<PlanValidation, CoachError>;
}

/// Applies vetted requests to a plan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanModifier: Send + Sync {
    /// Returns the modified plan with applied and skipped changes.
    async fn apply(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
        considerations: &[ConsiderationEntry],
    ) -> Result<ModificationResult, CoachError>;
}

/// Explains an adjustment to the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    /// Explains why the applied changes help.
    async fn explain(
        &self,
        original: &WorkoutPlan,
        adjusted: &WorkoutPlan,
        applied: &[AppliedChange],
        profile: &UserProfile,
    ) -> Result<Explanations, CoachError>;

    /// Compares the two plans.
    async fn compare(
        &self,
        original: &WorkoutPlan,
        adjusted: &WorkoutPlan,
    ) -> Result<PlanComparison, CoachError>;
}
