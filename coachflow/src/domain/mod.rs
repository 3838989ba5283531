//! Typed artifacts the agents read and produce.

mod nutrition;
mod profile;
mod workout;

pub use nutrition::{GoalType, MacroTargets, MealSuggestion, NutritionGoal, NutritionPlan};
pub use profile::{ActivityLevel, FitnessLevel, Gender, UserProfile};
pub use workout::{
    check_plan_constraints, DaySchedule, ExerciseEntry, PlanConstraints, WorkoutPlan, WEEKDAYS,
};
