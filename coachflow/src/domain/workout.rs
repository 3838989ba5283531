//! Workout plans and their domain constraints.

use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Day keys of a weekly schedule, Monday first.
pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// One exercise prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseEntry {
    /// Exercise name.
    pub name: String,
    /// Working sets.
    pub sets: u32,
    /// Rep prescription, e.g. `8-12`.
    pub reps: String,
    /// Rest between sets.
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    /// Primary muscle groups.
    #[serde(default)]
    pub muscle_groups: Vec<String>,
    /// Coaching notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExerciseEntry {
    /// Creates an entry with no rest, groups or notes.
    #[must_use]
    pub fn new(name: impl Into<String>, sets: u32, reps: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sets,
            reps: reps.into(),
            rest_seconds: None,
            muscle_groups: Vec::new(),
            notes: None,
        }
    }

    /// Sets the muscle groups.
    #[must_use]
    pub fn with_muscle_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.muscle_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the name contains `needle`, ignoring case.
    #[must_use]
    pub fn name_matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(&needle.to_lowercase())
    }

    /// Returns true if the entry works `group`, ignoring case.
    #[must_use]
    pub fn targets(&self, group: &str) -> bool {
        let group = group.to_lowercase();
        self.muscle_groups.iter().any(|g| g.to_lowercase() == group)
    }
}

/// One day of a weekly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaySchedule {
    /// Recovery day.
    Rest,
    /// Training session.
    Session {
        /// Session focus, e.g. `legs` or `upper body`.
        focus: String,
        /// Exercises in order.
        exercises: Vec<ExerciseEntry>,
        /// Planned length.
        #[serde(default, rename = "durationMinutes")]
        duration_minutes: Option<u32>,
    },
}

impl DaySchedule {
    /// Creates a session.
    #[must_use]
    pub fn session(focus: impl Into<String>, exercises: Vec<ExerciseEntry>) -> Self {
        Self::Session {
            focus: focus.into(),
            exercises,
            duration_minutes: None,
        }
    }

    /// Returns true for training days.
    #[must_use]
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session { .. })
    }

    /// The session's exercises; empty on rest days.
    #[must_use]
    pub fn exercises(&self) -> &[ExerciseEntry] {
        match self {
            Self::Session { exercises, .. } => exercises,
            Self::Rest => &[],
        }
    }

    /// Mutable access to the session's exercises.
    pub fn exercises_mut(&mut self) -> Option<&mut Vec<ExerciseEntry>> {
        match self {
            Self::Session { exercises, .. } => Some(exercises),
            Self::Rest => None,
        }
    }

    /// The session focus.
    #[must_use]
    pub fn focus(&self) -> Option<&str> {
        match self {
            Self::Session { focus, .. } => Some(focus),
            Self::Rest => None,
        }
    }
}

/// A weekly workout plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    /// Plan id; absent until persisted.
    #[serde(default)]
    pub id: Option<String>,
    /// Owner.
    pub user_id: String,
    /// Plan name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Schedule keyed by lowercase weekday.
    pub weekly_schedule: BTreeMap<String, DaySchedule>,
    /// Optimistic-lock version; bumped on every modification.
    #[serde(default = "default_version")]
    pub version: u64,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

fn default_version() -> u64 {
    1
}

impl WorkoutPlan {
    /// Creates an empty version-1 plan.
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id: user_id.into(),
            name: name.into(),
            description: String::new(),
            weekly_schedule: BTreeMap::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets a day, returning `self`.
    #[must_use]
    pub fn with_day(mut self, day: &str, schedule: DaySchedule) -> Self {
        self.weekly_schedule.insert(day.to_lowercase(), schedule);
        self
    }

    /// Training days, in weekday order.
    #[must_use]
    pub fn session_days(&self) -> Vec<&str> {
        WEEKDAYS
            .iter()
            .copied()
            .filter(|day| self.weekly_schedule.get(*day).is_some_and(DaySchedule::is_session))
            .collect()
    }

    /// Every exercise across the week.
    pub fn exercises(&self) -> impl Iterator<Item = &ExerciseEntry> {
        self.weekly_schedule.values().flat_map(DaySchedule::exercises)
    }

    /// Sum of working sets across the week.
    #[must_use]
    pub fn total_sets(&self) -> u32 {
        self.exercises().map(|e| e.sets).sum()
    }

    /// Returns true if any exercise name contains `needle`.
    #[must_use]
    pub fn contains_exercise(&self, needle: &str) -> bool {
        self.exercises().any(|e| e.name_matches(needle))
    }

    /// Marks the plan as modified: bumps the version and `updated_at`.
    pub fn touch(&mut self) {
        self.version = self.version.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

/// Limits a plan must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConstraints {
    /// Most training days per week.
    pub max_sessions_per_week: usize,
    /// Fewest training days per week.
    pub min_sessions_per_week: usize,
    /// Most exercises in one session.
    pub max_exercises_per_session: usize,
    /// Most sets for one exercise.
    pub max_sets_per_exercise: u32,
}

impl Default for PlanConstraints {
    fn default() -> Self {
        Self {
            max_sessions_per_week: 6,
            min_sessions_per_week: 1,
            max_exercises_per_session: 12,
            max_sets_per_exercise: 10,
        }
    }
}

/// Returns every constraint `plan` violates; empty means valid.
#[must_use]
pub fn check_plan_constraints(plan: &WorkoutPlan, constraints: &PlanConstraints) -> Vec<String> {
    let mut issues = Vec::new();

    if plan.name.trim().is_empty() {
        issues.push("Plan name is empty".to_string());
    }
    for day in plan.weekly_schedule.keys() {
        if !WEEKDAYS.contains(&day.as_str()) {
            issues.push(format!("Unknown schedule day '{day}'"));
        }
    }

    let sessions = plan.session_days().len();
    if sessions > constraints.max_sessions_per_week {
        issues.push(format!(
            "Plan has {sessions} sessions per week, more than the maximum of {}",
            constraints.max_sessions_per_week
        ));
    }
    if sessions < constraints.min_sessions_per_week {
        issues.push("Plan has no training sessions".to_string());
    }

    for (day, schedule) in &plan.weekly_schedule {
        let DaySchedule::Session { exercises, .. } = schedule else {
            continue;
        };
        if exercises.is_empty() {
            issues.push(format!("Session on {day} has no exercises"));
        }
        if exercises.len() > constraints.max_exercises_per_session {
            issues.push(format!(
                "Session on {day} has {} exercises, more than the maximum of {}",
                exercises.len(),
                constraints.max_exercises_per_session
            ));
        }
        for exercise in exercises {
            if exercise.sets == 0 || exercise.sets > constraints.max_sets_per_exercise {
                issues.push(format!(
                    "{} on {day} has {} sets, outside 1..={}",
                    exercise.name, exercise.sets, constraints.max_sets_per_exercise
                ));
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> WorkoutPlan {
        WorkoutPlan::new("u1", "Strength")
            .with_day(
                "Monday",
                DaySchedule::session(
                    "legs",
                    vec![ExerciseEntry::new("Back Squat", 4, "5").with_muscle_groups(["legs"])],
                ),
            )
            .with_day("tuesday", DaySchedule::Rest)
            .with_day(
                "thursday",
                DaySchedule::session("upper", vec![ExerciseEntry::new("Bench Press", 3, "8")]),
            )
    }

    #[test]
    fn test_session_days_in_week_order() {
        assert_eq!(plan().session_days(), vec!["monday", "thursday"]);
        assert_eq!(plan().total_sets(), 7);
        assert!(plan().contains_exercise("squat"));
    }

    #[test]
    fn test_valid_plan_has_no_issues() {
        assert!(check_plan_constraints(&plan(), &PlanConstraints::default()).is_empty());
    }

    #[test]
    fn test_constraint_violations() {
        let mut bad = plan().with_day("funday", DaySchedule::Rest);
        if let Some(exercises) = bad
            .weekly_schedule
            .get_mut("monday")
            .and_then(DaySchedule::exercises_mut)
        {
            exercises[0].sets = 25;
        }

        let issues = check_plan_constraints(&bad, &PlanConstraints::default());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.contains("funday")));
        assert!(issues.iter().any(|i| i.contains("Back Squat")));
    }

    #[test]
    fn test_touch_advances_version() {
        let mut p = plan();
        let before = p.updated_at;
        p.touch();
        assert_eq!(p.version, 2);
        assert!(p.updated_at >= before);
    }

    #[test]
    fn test_touch_saturates_version() {
        let mut p = plan();
        p.version = u64::MAX;
        p.touch();
        assert_eq!(p.version, u64::MAX);
    }

    #[test]
    fn test_day_schedule_serde_tag() {
        let json = serde_json::to_value(DaySchedule::Rest).unwrap();
        assert_eq!(json, serde_json::json!({"type": "rest"}));
    }
}
