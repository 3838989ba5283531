//! Plan adjustment: turns user feedback into a revised workout plan.

mod agent;
pub mod catalog;
mod collaborators;
mod explanations;
mod modifier;
mod output;
mod parser;
mod types;
mod validator;

pub use agent::{AdjustmentCollaborators, PlanAdjustmentAgent};
pub use collaborators::{AdjustmentValidator, ExplanationGenerator, FeedbackParser, PlanModifier};
pub use explanations::{compare_plans, LlmExplanationGenerator};
pub use modifier::RuleBasedModifier;
pub use output::{
    format_output, AdjustmentBucket, AdjustmentOutput, Elaboration, OutputStatus,
    PlanAdjustmentState, ReflectionBucket, UnderstandingBucket,
};
pub use parser::{parse_keywords, LlmFeedbackParser};
pub use types::*;
pub use validator::{staleness_issues, RuleBasedValidator};

#[cfg(test)]
pub(crate) use collaborators::{
    MockAdjustmentValidator, MockExplanationGenerator, MockFeedbackParser, MockPlanModifier,
};

/// Lookup of earlier adjustments.
pub const STEP_CONTEXT_RETRIEVAL: &str = "contextRetrieval";
/// Feedback parsing.
pub const STEP_INITIAL_UNDERSTANDING: &str = "initialUnderstanding";
/// Feasibility, safety and coherence analyses.
pub const STEP_CONSIDERATION: &str = "consideration";
/// Plan modification.
pub const STEP_ADJUSTMENT: &str = "adjustment";
/// Validation, explanation and comparison.
pub const STEP_REFLECTION: &str = "reflection";
/// Best-effort memory writes.
pub const STEP_MEMORY: &str = "memoryStorage";

/// Memory content type of stored adjusted plans.
pub const CONTENT_ADJUSTED_PLAN: &str = "adjusted_plan";
/// Memory content type of stored adjustment reasoning.
pub const CONTENT_ADJUSTMENT_REASONING: &str = "adjustment_reasoning";
