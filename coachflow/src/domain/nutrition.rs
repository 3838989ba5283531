//! Nutrition goals and plans.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Direction of a nutrition goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Calorie deficit.
    WeightLoss,
    /// Energy balance.
    Maintenance,
    /// Calorie surplus.
    MuscleGain,
}

/// What the user wants to achieve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionGoal {
    /// Goal direction.
    pub goal_type: GoalType,
    /// Target body weight.
    #[serde(default)]
    pub target_weight_kg: Option<f64>,
    /// Desired weekly change magnitude in kilograms.
    #[serde(default)]
    pub weekly_change_kg: Option<f64>,
    /// Meals per day for suggestions.
    #[serde(default = "default_meals_per_day")]
    pub meals_per_day: u32,
}

fn default_meals_per_day() -> u32 {
    3
}

impl NutritionGoal {
    /// Creates a goal with default pacing.
    #[must_use]
    pub fn new(goal_type: GoalType) -> Self {
        Self {
            goal_type,
            target_weight_kg: None,
            weekly_change_kg: None,
            meals_per_day: default_meals_per_day(),
        }
    }
}

/// Daily calorie and macronutrient targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroTargets {
    /// Daily calories.
    pub calories: f64,
    /// Protein grams.
    pub protein_g: f64,
    /// Carbohydrate grams.
    pub carbs_g: f64,
    /// Fat grams.
    pub fat_g: f64,
}

impl MacroTargets {
    /// Calories implied by the macros (4/4/9 kcal per gram).
    #[must_use]
    pub fn macro_calories(&self) -> f64 {
        self.protein_g * 4.0 + self.carbs_g * 4.0 + self.fat_g * 9.0
    }
}

/// A suggested meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealSuggestion {
    /// Meal slot, e.g. `breakfast`.
    pub meal: String,
    /// Dish name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Approximate calories.
    #[serde(default)]
    pub calories: Option<f64>,
}

/// A computed nutrition plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionPlan {
    /// Id assigned on insert.
    #[serde(default)]
    pub id: Option<String>,
    /// Owner.
    pub user_id: String,
    /// Goal the plan serves.
    pub goal: NutritionGoal,
    /// Basal metabolic rate.
    pub bmr: f64,
    /// Total daily energy expenditure.
    pub tdee: f64,
    /// Daily targets.
    pub targets: MacroTargets,
    /// Meal ideas; empty when generation was unavailable.
    #[serde(default)]
    pub meal_suggestions: Vec<MealSuggestion>,
    /// Explanation of the numbers.
    pub explanation: String,
    /// Creation time.
    pub created_at: Timestamp,
}
