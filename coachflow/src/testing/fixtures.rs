//! Deterministic fixtures.

use crate::domain::{
    ActivityLevel, DaySchedule, ExerciseEntry, FitnessLevel, Gender, UserProfile, WorkoutPlan,
};
use chrono::{TimeZone, Utc};

/// Id of [`sample_plan`].
pub const SAMPLE_PLAN_ID: &str = "plan-1";
/// Id of [`sample_profile`].
pub const SAMPLE_USER_ID: &str = "user-1";

/// An intermediate lifter with no limitations.
#[must_use]
pub fn sample_profile() -> UserProfile {
    UserProfile {
        id: SAMPLE_USER_ID.to_string(),
        name: Some("Sam".to_string()),
        age: 30,
        gender: Gender::Male,
        weight_kg: 80.0,
        height_cm: 180.0,
        activity_level: ActivityLevel::Moderate,
        fitness_level: FitnessLevel::Intermediate,
        goals: vec!["build strength".to_string()],
        limitations: Vec::new(),
        equipment: vec!["barbell".to_string(), "dumbbell".to_string(), "bench".to_string()],
        dietary_restrictions: Vec::new(),
    }
}

fn exercise(name: &str, sets: u32, reps: &str, group: &str) -> ExerciseEntry {
    let mut entry = ExerciseEntry::new(name, sets, reps).with_muscle_groups([group]);
    entry.rest_seconds = Some(90);
    entry
}

/// A persisted three-day plan: legs Monday, upper Wednesday, full body Friday.
///
/// Timestamps are fixed so two calls compare equal.
#[must_use]
pub fn sample_plan() -> WorkoutPlan {
    let created = Utc
        .with_ymd_and_hms(2026, 1, 5, 8, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let mut plan = WorkoutPlan::new(SAMPLE_USER_ID, "Three-Day Strength")
        .with_day(
            "monday",
            DaySchedule::session(
                "legs",
                vec![
                    exercise("Back Squat", 4, "5", "legs"),
                    exercise("Romanian Deadlift", 3, "8", "legs"),
                ],
            ),
        )
        .with_day("tuesday", DaySchedule::Rest)
        .with_day(
            "wednesday",
            DaySchedule::session(
                "upper body",
                vec![
                    exercise("Bench Press", 4, "5", "chest"),
                    exercise("Barbell Row", 3, "8", "back"),
                    exercise("Overhead Press", 3, "8", "shoulders"),
                ],
            ),
        )
        .with_day("thursday", DaySchedule::Rest)
        .with_day(
            "friday",
            DaySchedule::session(
                "full body",
                vec![
                    exercise("Deadlift", 3, "5", "back"),
                    exercise("Pull-Up", 3, "6-8", "back"),
                    exercise("Plank", 3, "45s", "core"),
                ],
            ),
        )
        .with_day("saturday", DaySchedule::Rest)
        .with_day("sunday", DaySchedule::Rest);

    plan.id = Some(SAMPLE_PLAN_ID.to_string());
    plan.description = "Squat, press and pull three times a week".to_string();
    plan.created_at = created;
    plan.updated_at = created;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{check_plan_constraints, PlanConstraints};

    #[test]
    fn test_sample_plan_is_valid_and_stable() {
        let plan = sample_plan();
        assert!(check_plan_constraints(&plan, &PlanConstraints::default()).is_empty());
        assert_eq!(plan, sample_plan());
        assert_eq!(plan.session_days(), vec!["monday", "wednesday", "friday"]);
    }
}
