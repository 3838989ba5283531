//! Energy and macronutrient calculation.

use crate::domain::{ActivityLevel, Gender, GoalType, MacroTargets, NutritionGoal, UserProfile};
use crate::errors::{AgentError, CoachError};

/// kcal in one kilogram of body mass.
const KCAL_PER_KG: f64 = 7700.0;

/// Computes BMR, TDEE and daily targets.
pub trait NutritionCalculator: Send + Sync {
    /// Basal metabolic rate in kcal/day.
    fn bmr(&self, profile: &UserProfile) -> Result<f64, CoachError>;

    /// Total daily energy expenditure in kcal/day.
    fn tdee(&self, bmr: f64, activity: ActivityLevel) -> Result<f64, CoachError>;

    /// Daily calorie and macro targets for `goal`.
    fn macros(&self, tdee: f64, goal: &NutritionGoal, profile: &UserProfile) -> Result<MacroTargets, CoachError>;
}

/// Mifflin-St Jeor BMR with standard activity multipliers.
#[derive(Debug, Clone)]
pub struct MifflinStJeor {
    /// Lowest daily calories ever recommended.
    pub calorie_floor: f64,
    /// Largest daily deficit or surplus.
    pub max_daily_adjustment: f64,
}

impl Default for MifflinStJeor {
    fn default() -> Self {
        Self {
            calorie_floor: 1200.0,
            max_daily_adjustment: 1000.0,
        }
    }
}

impl MifflinStJeor {
    fn daily_adjustment(&self, goal: &NutritionGoal) -> f64 {
        let default_weekly = match goal.goal_type {
            GoalType::WeightLoss => 0.5,
            GoalType::Maintenance => 0.0,
            GoalType::MuscleGain => 0.25,
        };
        let weekly = goal.weekly_change_kg.map_or(default_weekly, f64::abs);
        let magnitude = (weekly * KCAL_PER_KG / 7.0).min(self.max_daily_adjustment);
        match goal.goal_type {
            GoalType::WeightLoss => -magnitude,
            GoalType::Maintenance => 0.0,
            GoalType::MuscleGain => magnitude,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl NutritionCalculator for MifflinStJeor {
    fn bmr(&self, profile: &UserProfile) -> Result<f64, CoachError> {
        if profile.weight_kg <= 0.0 || profile.height_cm <= 0.0 || profile.age == 0 {
            return Err(AgentError::validation("Profile needs a positive weight, height and age")
                .with_detail("userId", profile.id.as_str())
                .into());
        }
        let base = 10.0 * profile.weight_kg + 6.25 * profile.height_cm - 5.0 * f64::from(profile.age);
        let offset = match profile.gender {
            Gender::Male => 5.0,
            Gender::Female => -161.0,
            Gender::Other => -78.0,
        };
        Ok(round1(base + offset))
    }

    fn tdee(&self, bmr: f64, activity: ActivityLevel) -> Result<f64, CoachError> {
        if !bmr.is_finite() || bmr <= 0.0 {
            return Err(AgentError::processing(format!("Cannot derive TDEE from BMR {bmr}")).into());
        }
        Ok(round1(bmr * activity.multiplier()))
    }

    fn macros(&self, tdee: f64, goal: &NutritionGoal, profile: &UserProfile) -> Result<MacroTargets, CoachError> {
        let calories = (tdee + self.daily_adjustment(goal)).max(self.calorie_floor).round();

        let protein_per_kg = match goal.goal_type {
            GoalType::WeightLoss => 2.0,
            GoalType::Maintenance => 1.6,
            GoalType::MuscleGain => 1.8,
        };
        let protein_g = (protein_per_kg * profile.weight_kg).round();
        let fat_g = (calories * 0.25 / 9.0).round();
        let carbs_g = ((calories - protein_g * 4.0 - fat_g * 9.0) / 4.0).max(0.0).round();

        Ok(MacroTargets {
            calories,
            protein_g,
            carbs_g,
            fat_g,
        })
    }
}
