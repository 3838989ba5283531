//! Deterministic application of vetted change requests.

use super::catalog::{equipment_alternative, find_focus, focus_named, substitute_for};
use super::collaborators::PlanModifier;
use super::types::{
    AppliedChange, ChangeRequest, ConsiderationEntry, Direction, FeedbackItem, ModificationResult,
    ParsedFeedback, SkippedChange,
};
use crate::domain::{DaySchedule, ExerciseEntry, PlanConstraints, WorkoutPlan};
use crate::errors::CoachError;
use async_trait::async_trait;

/// Applies each vetted request to a copy of the plan.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedModifier {
    constraints: PlanConstraints,
}

type Applied = Result<(String, Option<String>), String>;

impl RuleBasedModifier {
    /// Creates a modifier bounded by `constraints`.
    #[must_use]
    pub fn new(constraints: PlanConstraints) -> Self {
        Self { constraints }
    }

    fn apply_one(&self, plan: &mut WorkoutPlan, item: &FeedbackItem) -> Applied {
        match &item.request {
            ChangeRequest::SubstituteExercise { from, to } => {
                let replacement = to
                    .clone()
                    .or_else(|| substitute_for(from).map(str::to_string))
                    .ok_or_else(|| format!("No substitute known for {from}"))?;
                replace_matching(plan, from, &replacement)
                    .map(|day| (format!("Replaced {from} with {replacement}"), Some(day)))
                    .ok_or_else(|| format!("{from} is not in the plan"))
            }
            ChangeRequest::AddExercise { focus, exercise } => {
                let catalog = focus_named(focus).or_else(|| find_focus(focus));
                let name = exercise
                    .clone()
                    .or_else(|| {
                        catalog.and_then(|f| {
                            f.exercises
                                .iter()
                                .find(|candidate| !plan.contains_exercise(candidate))
                                .map(|candidate| (*candidate).to_string())
                        })
                    })
                    .ok_or_else(|| format!("No new exercise available for {focus}"))?;
                let group = catalog.map_or(focus.as_str(), |f| f.name);
                let day = pick_day(plan, group, self.constraints.max_exercises_per_session)
                    .ok_or_else(|| "Every session is already full".to_string())?;

                let mut entry = ExerciseEntry::new(&name, 3, "10-12").with_muscle_groups([group]);
                entry.rest_seconds = Some(60);
                if let Some(exercises) = plan
                    .weekly_schedule
                    .get_mut(&day)
                    .and_then(DaySchedule::exercises_mut)
                {
                    exercises.push(entry);
                }
                Ok((format!("Added {name} on {day}"), Some(day)))
            }
            ChangeRequest::RemoveExercise { exercise } => {
                let mut removed_from = None;
                for (day, schedule) in &mut plan.weekly_schedule {
                    if let Some(exercises) = schedule.exercises_mut() {
                        let before = exercises.len();
                        exercises.retain(|e| !e.name_matches(exercise));
                        if exercises.len() < before && removed_from.is_none() {
                            removed_from = Some(day.clone());
                        }
                    }
                }
                removed_from
                    .map(|day| (format!("Removed {exercise}"), Some(day)))
                    .ok_or_else(|| format!("{exercise} is not in the plan"))
            }
            ChangeRequest::AdjustVolume { exercise, direction } => {
                let max = self.constraints.max_sets_per_exercise;
                let mut changed = 0usize;
                for entry in exercises_mut(plan) {
                    if exercise.as_ref().is_some_and(|name| !entry.name_matches(name)) {
                        continue;
                    }
                    let sets = match direction {
                        Direction::Increase => (entry.sets + 1).min(max),
                        Direction::Decrease => entry.sets.saturating_sub(1).max(1),
                    };
                    if sets != entry.sets {
                        entry.sets = sets;
                        changed += 1;
                    }
                }
                if changed == 0 {
                    return Err("Volume is already at its limit".to_string());
                }
                Ok((item.request.describe(), None))
            }
            ChangeRequest::AdjustIntensity { direction } => {
                let note = match direction {
                    Direction::Increase => "Add load when the last set feels easy (RPE 8)",
                    Direction::Decrease => "Keep two reps in reserve on every set (RPE 7)",
                };
                for entry in exercises_mut(plan) {
                    entry.notes = Some(note.to_string());
                }
                Ok((item.request.describe(), None))
            }
            ChangeRequest::ChangeSchedule { from_day, to_day } => {
                let session = plan
                    .weekly_schedule
                    .insert(from_day.clone(), DaySchedule::Rest)
                    .filter(DaySchedule::is_session)
                    .ok_or_else(|| format!("There is no session on {from_day}"))?;
                plan.weekly_schedule.insert(to_day.clone(), session);
                Ok((item.request.describe(), Some(to_day.clone())))
            }
            ChangeRequest::PainConcern { area, exercise } => {
                let Some(exercise) = exercise else {
                    return Err(format!("Noted {area} pain; no specific exercise to change"));
                };
                let replacement = substitute_for(exercise)
                    .ok_or_else(|| format!("No pain-free alternative known for {exercise}"))?;
                replace_matching(plan, exercise, replacement)
                    .map(|day| (format!("Replaced {exercise} with {replacement} for {area} pain"), Some(day)))
                    .ok_or_else(|| format!("{exercise} is not in the plan"))
            }
            ChangeRequest::EquipmentLimitation { equipment } => {
                let alternative = equipment_alternative(equipment)
                    .ok_or_else(|| format!("No alternative known for {equipment}"))?;
                let replaced = replace_matching(plan, equipment, alternative);
                replaced
                    .map(|day| (format!("Replaced {equipment} work with {alternative}"), Some(day)))
                    .ok_or_else(|| format!("No exercise in the plan uses {equipment}"))
            }
        }
    }
}

fn exercises_mut(plan: &mut WorkoutPlan) -> impl Iterator<Item = &mut ExerciseEntry> {
    plan.weekly_schedule
        .values_mut()
        .filter_map(DaySchedule::exercises_mut)
        .flat_map(|exercises| exercises.iter_mut())
}

/// Renames every exercise matching `needle`; returns the first day touched.
fn replace_matching(plan: &mut WorkoutPlan, needle: &str, replacement: &str) -> Option<String> {
    let mut first = None;
    for (day, schedule) in &mut plan.weekly_schedule {
        for entry in schedule.exercises_mut().into_iter().flatten() {
            if entry.name_matches(needle) {
                entry.name = replacement.to_string();
                first.get_or_insert_with(|| day.clone());
            }
        }
    }
    first
}

/// Session matching `group`, else the least-loaded session with room.
fn pick_day(plan: &WorkoutPlan, group: &str, max_exercises: usize) -> Option<String> {
    let sessions = || {
        plan.session_days().into_iter().filter_map(|day| {
            plan.weekly_schedule
                .get(day)
                .filter(|s| s.exercises().len() < max_exercises)
                .map(|s| (day, s))
        })
    };

    sessions()
        .find(|(_, s)| {
            s.focus().is_some_and(|f| f.to_lowercase().contains(group))
                || s.exercises().iter().any(|e| e.targets(group))
        })
        .or_else(|| sessions().min_by_key(|(_, s)| s.exercises().len()))
        .map(|(day, _)| day.to_string())
}

#[async_trait]
impl PlanModifier for RuleBasedModifier {
    async fn apply(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
        _considerations: &[ConsiderationEntry],
    ) -> Result<ModificationResult, CoachError> {
        let mut modified = plan.clone();
        let mut result = ModificationResult::default();

        for item in &feedback.items {
            match self.apply_one(&mut modified, item) {
                Ok((description, day)) => result.applied_changes.push(AppliedChange {
                    item_id: item.id.clone(),
                    category: item.request.category(),
                    description,
                    day,
                }),
                Err(reason) => result.skipped_changes.push(SkippedChange {
                    item_id: item.id.clone(),
                    reason,
                }),
            }
        }

        modified.touch();
        result.modified_plan = Some(modified);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::plan_adjustment::parser::parse_keywords;
    use crate::testing::sample_plan;
    use pretty_assertions::assert_eq;

    async fn apply(feedback: &str) -> ModificationResult {
        RuleBasedModifier::default()
            .apply(&sample_plan(), &parse_keywords(feedback), &[])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_leg_exercise_lands_on_leg_day() {
        let original = sample_plan();
        let result = apply("add more leg exercises").await;
        let plan = result.modified_plan.unwrap();

        assert_eq!(result.applied_changes.len(), 1);
        assert_eq!(result.applied_changes[0].day.as_deref(), Some("monday"));
        assert_eq!(plan.exercises().count(), original.exercises().count() + 1);
        assert_eq!(plan.version, original.version + 1);
    }

    #[tokio::test]
    async fn test_missing_target_is_skipped() {
        let result = apply("remove the zercher carries").await;

        assert!(result.applied_changes.is_empty());
        assert_eq!(result.skipped_changes[0].item_id, "fb_1");
        assert!(result.modified_plan.is_some());
    }

    #[tokio::test]
    async fn test_substitution_and_schedule_move() {
        let result = apply("swap the back squat for a leg press. move friday to saturday").await;
        let plan = result.modified_plan.unwrap();

        assert_eq!(result.applied_changes.len(), 2, "{:?}", result.skipped_changes);
        assert!(plan.contains_exercise("leg press"));
        assert!(!plan.contains_exercise("back squat"));
        assert!(plan.weekly_schedule.get("saturday").is_some_and(DaySchedule::is_session));
        assert_eq!(plan.weekly_schedule.get("friday"), Some(&DaySchedule::Rest));
    }

    #[tokio::test]
    async fn test_volume_respects_limits() {
        let modifier = RuleBasedModifier::new(PlanConstraints {
            max_sets_per_exercise: 3,
            ..PlanConstraints::default()
        });
        let mut plan = sample_plan();
        for entry in exercises_mut(&mut plan) {
            entry.sets = 3;
        }

        let result = modifier
            .apply(&plan, &parse_keywords("I want more sets"), &[])
            .await
            .unwrap();

        assert_eq!(result.skipped_changes.len(), 1);
        assert_eq!(result.modified_plan.unwrap().total_sets(), plan.total_sets());
    }
}
