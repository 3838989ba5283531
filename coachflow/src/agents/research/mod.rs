//! Research: a topic and questions to a sourced summary.

mod agent;

pub use agent::{
    plan_queries, Insight, ResearchAgent, ResearchOutput, ResearchRequest, ResearchState, Synthesis,
};

/// Request validation and query planning.
pub const STEP_PLAN_QUERIES: &str = "planQueries";
/// One completion per query.
pub const STEP_GATHER_INSIGHTS: &str = "gatherInsights";
/// Drops unsourced or low-confidence insights.
pub const STEP_VALIDATE_INSIGHTS: &str = "validateInsights";
/// Summary and recommendations.
pub const STEP_SYNTHESIS: &str = "synthesis";
/// Best-effort memory write.
pub const STEP_MEMORY: &str = "memoryStorage";

/// Memory content type of research summaries.
pub const CONTENT_RESEARCH_SUMMARY: &str = "research_summary";
/// Insights below this confidence are dropped.
pub const MIN_CONFIDENCE: f64 = 0.5;
