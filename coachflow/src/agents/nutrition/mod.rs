//! Nutrition planning: profile to calorie and macro targets with meal ideas.

mod agent;
mod calculator;

pub use agent::{NutritionAgent, NutritionOutput, NutritionRequest, NutritionState};
pub use calculator::{MifflinStJeor, NutritionCalculator};

/// Loads the user profile.
pub const STEP_FETCH_USER_DATA: &str = "fetchUserData";
/// Checks the goal against the profile.
pub const STEP_VALIDATE_GOALS: &str = "validateGoals";
/// Basal metabolic rate.
pub const STEP_CALCULATE_BMR: &str = "calculateBmr";
/// Total daily energy expenditure.
pub const STEP_CALCULATE_TDEE: &str = "calculateTdee";
/// Calorie and macro targets.
pub const STEP_CALCULATE_MACROS: &str = "calculateMacros";
/// Optional meal ideas; failures become warnings.
pub const STEP_MEAL_SUGGESTIONS: &str = "generateMealSuggestions";
/// Prose explanation of the targets.
pub const STEP_EXPLANATION: &str = "generateExplanation";
/// Single datastore insert of the plan.
pub const STEP_STORE_PLAN: &str = "storePlan";
/// Best-effort memory write.
pub const STEP_MEMORY: &str = "memoryStorage";

/// Table holding user profiles.
pub const PROFILES_TABLE: &str = "profiles";
/// Table nutrition plans are inserted into.
pub const NUTRITION_PLANS_TABLE: &str = "nutrition_plans";
/// Memory content type of stored plans.
pub const CONTENT_NUTRITION_PLAN: &str = "nutrition_plan";
