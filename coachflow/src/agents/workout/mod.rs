//! Workout generation: a user profile and preferences to a weekly plan.

mod agent;

pub use agent::{WorkoutAgent, WorkoutOutput, WorkoutRequest, WorkoutState};

/// Request validation and past-plan lookup.
pub const STEP_INITIAL_UNDERSTANDING: &str = "initialUnderstanding";
/// Completion-backed plan generation.
pub const STEP_PLAN_GENERATION: &str = "planGeneration";
/// Constraint check of the generated plan.
pub const STEP_REFLECTION: &str = "reflection";
/// Datastore insert, when a datastore is configured.
pub const STEP_PERSISTENCE: &str = "persistence";
/// Best-effort memory write.
pub const STEP_MEMORY: &str = "memoryStorage";

/// Table generated plans are inserted into.
pub const WORKOUT_PLANS_TABLE: &str = "workout_plans";
/// Memory content type of generated plans.
pub const CONTENT_WORKOUT_PLAN: &str = "workout_plan";
