//! Rule-based vetting of requested changes.

use super::catalog::{find_focus, focus_named, Focus};
use super::collaborators::AdjustmentValidator;
use super::types::{
    AnalysisVerdict, ChangeRequest, Direction, FeedbackItem, ParsedFeedback, PlanValidation,
    RejectedItem, SafetyVerdict,
};
use crate::domain::{
    check_plan_constraints, DaySchedule, FitnessLevel, PlanConstraints, UserProfile, WorkoutPlan,
    WEEKDAYS,
};
use crate::errors::CoachError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Validator driven by [`PlanConstraints`] and the user's profile.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedValidator {
    constraints: PlanConstraints,
}

impl RuleBasedValidator {
    /// Creates a validator with custom constraints.
    #[must_use]
    pub fn new(constraints: PlanConstraints) -> Self {
        Self { constraints }
    }

    fn feasibility_problem(&self, plan: &WorkoutPlan, request: &ChangeRequest) -> Option<String> {
        match request {
            ChangeRequest::SubstituteExercise { from, .. } if !plan.contains_exercise(from) => {
                Some(format!("'{from}' is not in the plan"))
            }
            ChangeRequest::RemoveExercise { exercise } if !plan.contains_exercise(exercise) => {
                Some(format!("'{exercise}' is not in the plan"))
            }
            ChangeRequest::AdjustVolume {
                exercise: Some(exercise),
                ..
            } if !plan.contains_exercise(exercise) => Some(format!("'{exercise}' is not in the plan")),
            ChangeRequest::AddExercise { focus, exercise } => {
                if exercise.is_none() && focus_named(focus).is_none() && find_focus(focus).is_none() {
                    Some(format!("Unknown focus area '{focus}'"))
                } else if plan.session_days().is_empty() {
                    Some("The plan has no training sessions to add to".to_string())
                } else {
                    None
                }
            }
            ChangeRequest::ChangeSchedule { from_day, to_day } => {
                if !WEEKDAYS.contains(&from_day.as_str()) || !WEEKDAYS.contains(&to_day.as_str()) {
                    Some(format!("Unknown day in '{from_day}' to '{to_day}'"))
                } else if !plan
                    .weekly_schedule
                    .get(from_day)
                    .is_some_and(DaySchedule::is_session)
                {
                    Some(format!("There is no session on {from_day}"))
                } else if plan
                    .weekly_schedule
                    .get(to_day)
                    .is_some_and(DaySchedule::is_session)
                {
                    Some(format!("{to_day} already has a session"))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn focus_of(request: &ChangeRequest) -> Option<&'static Focus> {
    match request {
        ChangeRequest::AddExercise { focus, .. } => focus_named(focus).or_else(|| find_focus(focus)),
        ChangeRequest::SubstituteExercise { to: Some(to), .. } => find_focus(to),
        _ => None,
    }
}

fn split_verdict<F>(items: &[FeedbackItem], mut problem: F) -> AnalysisVerdict
where
    F: FnMut(&FeedbackItem) -> Option<String>,
{
    let mut verdict = AnalysisVerdict::default();
    for item in items {
        match problem(item) {
            Some(reason) => verdict.rejected.push(RejectedItem {
                item_id: item.id.clone(),
                reason,
            }),
            None => verdict.accepted.push(item.id.clone()),
        }
    }
    verdict
}

/// Issues that make `adjusted` look older than `original`.
#[must_use]
pub fn staleness_issues(original: &WorkoutPlan, adjusted: &WorkoutPlan) -> Vec<String> {
    let mut issues = Vec::new();
    if adjusted.updated_at < original.updated_at {
        issues.push(format!(
            "Adjusted plan is stale: updated {} before the original's {}",
            adjusted.updated_at.to_rfc3339(),
            original.updated_at.to_rfc3339()
        ));
    }
    if adjusted.version <= original.version {
        issues.push(format!(
            "Adjusted plan version {} does not advance original version {}",
            adjusted.version, original.version
        ));
    }
    issues
}

#[async_trait]
impl AdjustmentValidator for RuleBasedValidator {
    async fn analyze_feasibility(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
    ) -> Result<AnalysisVerdict, CoachError> {
        Ok(split_verdict(&feedback.items, |item| {
            self.feasibility_problem(plan, &item.request)
        }))
    }

    async fn check_safety(
        &self,
        plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
        profile: &UserProfile,
    ) -> Result<SafetyVerdict, CoachError> {
        let mut warnings = Vec::new();

        let verdict = split_verdict(&feedback.items, |item| match &item.request {
            ChangeRequest::AdjustVolume {
                direction: Direction::Increase,
                exercise,
            } => {
                let limit = self.constraints.max_sets_per_exercise;
                let at_limit = plan.exercises().any(|e| {
                    e.sets >= limit && exercise.as_ref().map_or(true, |name| e.name_matches(name))
                });
                at_limit.then(|| format!("Volume is already at the {limit}-set limit"))
            }
            ChangeRequest::AdjustIntensity {
                direction: Direction::Increase,
            } if profile.fitness_level == FitnessLevel::Beginner => {
                warnings.push("Intensity increase for a beginner: progress load gradually".to_string());
                None
            }
            ChangeRequest::PainConcern { area, .. } => {
                warnings.push(format!(
                    "Reported {area} pain: stop any exercise that aggravates it and consult a professional if it persists"
                ));
                None
            }
            request => focus_of(request).and_then(|focus| {
                focus
                    .body_parts
                    .iter()
                    .find(|part| profile.has_limitation(part))
                    .map(|part| format!("Conflicts with the user's {part} limitation"))
            }),
        });

        Ok(SafetyVerdict { verdict, warnings })
    }

    async fn verify_coherence(
        &self,
        _plan: &WorkoutPlan,
        feedback: &ParsedFeedback,
        _profile: &UserProfile,
    ) -> Result<AnalysisVerdict, CoachError> {
        let mut volume: HashMap<String, Direction> = HashMap::new();
        let mut intensity: Option<Direction> = None;
        let mut removed: Vec<String> = Vec::new();
        let mut targeted_days: Vec<String> = Vec::new();
        let mut vacated_days: Vec<String> = Vec::new();

        Ok(split_verdict(&feedback.items, |item| match &item.request {
            ChangeRequest::AdjustVolume { exercise, direction } => {
                let key = exercise.clone().unwrap_or_default().to_lowercase();
                match volume.get(&key) {
                    Some(previous) if previous != direction => {
                        Some("Contradicts an earlier volume request".to_string())
                    }
                    _ => {
                        volume.insert(key, *direction);
                        None
                    }
                }
            }
            ChangeRequest::AdjustIntensity { direction } => match intensity {
                Some(previous) if previous != *direction => {
                    Some("Contradicts an earlier intensity request".to_string())
                }
                _ => {
                    intensity = Some(*direction);
                    None
                }
            },
            ChangeRequest::RemoveExercise { exercise } => {
                removed.push(exercise.to_lowercase());
                None
            }
            ChangeRequest::SubstituteExercise { from, .. } if removed.contains(&from.to_lowercase()) => {
                Some(format!("'{from}' is also being removed"))
            }
            ChangeRequest::ChangeSchedule { from_day, to_day } => {
                if targeted_days.contains(to_day) || vacated_days.contains(from_day) {
                    Some(format!("Conflicts with another move involving {to_day} or {from_day}"))
                } else {
                    targeted_days.push(to_day.clone());
                    vacated_days.push(from_day.clone());
                    None
                }
            }
            _ => None,
        }))
    }

    async fn validate_adjusted_plan(
        &self,
        original: &WorkoutPlan,
        adjusted: &WorkoutPlan,
        profile: &UserProfile,
    ) -> Result<PlanValidation, CoachError> {
        let mut issues = check_plan_constraints(adjusted, &self.constraints);
        issues.extend(staleness_issues(original, adjusted));

        for exercise in adjusted.exercises() {
            if exercise
                .muscle_groups
                .iter()
                .filter_map(|g| focus_named(g))
                .any(|focus| focus.body_parts.iter().any(|part| profile.has_limitation(part)))
                && !original.contains_exercise(&exercise.name)
            {
                issues.push(format!(
                    "{} was added despite a limitation on the muscles it loads",
                    exercise.name
                ));
            }
        }

        Ok(PlanValidation::from_issues(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::plan_adjustment::parser::parse_keywords;
    use crate::testing::{sample_plan, sample_profile};

    #[tokio::test]
    async fn test_feasibility_rejects_missing_exercise() {
        let plan = sample_plan();
        let feedback = parse_keywords("remove the zercher carries; add more leg exercises");

        let verdict = RuleBasedValidator::default()
            .analyze_feasibility(&plan, &feedback)
            .await
            .unwrap();

        assert_eq!(verdict.accepted, vec!["fb_2"]);
        assert_eq!(verdict.rejected[0].item_id, "fb_1");
        assert!(verdict.rejected[0].reason.contains("not in the plan"));
    }

    #[tokio::test]
    async fn test_safety_respects_limitations() {
        let plan = sample_plan();
        let mut profile = sample_profile();
        profile.limitations = vec!["left knee".into()];
        let feedback = parse_keywords("add more leg exercises. my shoulder hurts");

        let safety = RuleBasedValidator::default()
            .check_safety(&plan, &feedback, &profile)
            .await
            .unwrap();

        assert_eq!(safety.verdict.rejected.len(), 1);
        assert!(safety.verdict.rejected[0].reason.contains("knee"));
        assert_eq!(safety.warnings.len(), 1);
        assert!(safety.warnings[0].contains("shoulder"));
    }

    #[tokio::test]
    async fn test_coherence_flags_contradictions() {
        let plan = sample_plan();
        let feedback = parse_keywords("it's too easy. it's too hard");

        let verdict = RuleBasedValidator::default()
            .verify_coherence(&plan, &feedback, &sample_profile())
            .await
            .unwrap();

        assert_eq!(verdict.accepted, vec!["fb_1"]);
        assert_eq!(verdict.rejected[0].item_id, "fb_2");
    }

    #[tokio::test]
    async fn test_validate_adjusted_plan_detects_staleness() {
        let original = sample_plan();
        let same = original.clone();

        let validation = RuleBasedValidator::default()
            .validate_adjusted_plan(&original, &same, &sample_profile())
            .await
            .unwrap();

        assert!(!validation.is_valid);
        assert!(validation.issues.iter().any(|i| i.contains("version")));

        let mut touched = original.clone();
        touched.touch();
        let validation = RuleBasedValidator::default()
            .validate_adjusted_plan(&original, &touched, &sample_profile())
            .await
            .unwrap();
        assert!(validation.is_valid, "{:?}", validation.issues);
    }
}
