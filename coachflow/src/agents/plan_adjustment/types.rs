//! Data flowing between the plan-adjustment stages.

use crate::domain::{UserProfile, WorkoutPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request handed to the plan-adjustment agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentInput {
    /// The plan to adjust.
    pub plan: WorkoutPlan,
    /// Free-text feedback from the user.
    pub feedback: String,
    /// The user's profile.
    pub user_profile: UserProfile,
}

/// Coarse category of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    /// Swap one exercise for another.
    ExerciseSubstitution,
    /// Add an exercise.
    ExerciseAddition,
    /// Remove an exercise.
    ExerciseRemoval,
    /// Change sets.
    VolumeAdjustment,
    /// Change load or effort.
    IntensityAdjustment,
    /// Move sessions between days.
    ScheduleChange,
    /// Pain or injury report.
    PainConcern,
    /// Missing equipment.
    EquipmentLimitation,
}

/// Which way to move volume or intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// More.
    Increase,
    /// Less.
    Decrease,
}

/// A structured change the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeRequest {
    /// Replace `from` with `to`, or with a catalog substitute.
    SubstituteExercise {
        /// Exercise to replace.
        from: String,
        /// Replacement.
        #[serde(default)]
        to: Option<String>,
    },
    /// Add work for a focus area.
    AddExercise {
        /// Focus area, e.g. `legs`.
        focus: String,
        /// Specific exercise.
        #[serde(default)]
        exercise: Option<String>,
    },
    /// Remove an exercise.
    RemoveExercise {
        /// Exercise to remove.
        exercise: String,
    },
    /// Add or remove sets.
    AdjustVolume {
        /// Exercise to change; every exercise when absent.
        #[serde(default)]
        exercise: Option<String>,
        /// Direction.
        direction: Direction,
    },
    /// Make sessions harder or easier.
    AdjustIntensity {
        /// Direction.
        direction: Direction,
    },
    /// Move a session.
    ChangeSchedule {
        /// Day the session is on.
        from_day: String,
        /// Day to move it to.
        to_day: String,
    },
    /// Reported pain.
    PainConcern {
        /// Body area.
        area: String,
        /// Exercise that caused it.
        #[serde(default)]
        exercise: Option<String>,
    },
    /// Missing equipment.
    EquipmentLimitation {
        /// Equipment name.
        equipment: String,
    },
}

impl ChangeRequest {
    /// The request's category.
    #[must_use]
    pub fn category(&self) -> FeedbackCategory {
        match self {
            Self::SubstituteExercise { .. } => FeedbackCategory::ExerciseSubstitution,
            Self::AddExercise { .. } => FeedbackCategory::ExerciseAddition,
            Self::RemoveExercise { .. } => FeedbackCategory::ExerciseRemoval,
            Self::AdjustVolume { .. } => FeedbackCategory::VolumeAdjustment,
            Self::AdjustIntensity { .. } => FeedbackCategory::IntensityAdjustment,
            Self::ChangeSchedule { .. } => FeedbackCategory::ScheduleChange,
            Self::PainConcern { .. } => FeedbackCategory::PainConcern,
            Self::EquipmentLimitation { .. } => FeedbackCategory::EquipmentLimitation,
        }
    }

    /// One-line description for summaries and prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::SubstituteExercise { from, to } => match to {
                Some(to) => format!("Replace {from} with {to}"),
                None => format!("Replace {from}"),
            },
            Self::AddExercise { focus, exercise } => match exercise {
                Some(exercise) => format!("Add {exercise} for {focus}"),
                None => format!("Add a {focus} exercise"),
            },
            Self::RemoveExercise { exercise } => format!("Remove {exercise}"),
            Self::AdjustVolume { exercise, direction } => {
                let verb = match direction {
                    Direction::Increase => "Increase",
                    Direction::Decrease => "Decrease",
                };
                format!("{verb} volume for {}", exercise.as_deref().unwrap_or("all exercises"))
            }
            Self::AdjustIntensity { direction } => match direction {
                Direction::Increase => "Increase intensity".to_string(),
                Direction::Decrease => "Decrease intensity".to_string(),
            },
            Self::ChangeSchedule { from_day, to_day } => {
                format!("Move the {from_day} session to {to_day}")
            }
            Self::PainConcern { area, .. } => format!("Address {area} pain"),
            Self::EquipmentLimitation { equipment } => format!("Work around missing {equipment}"),
        }
    }
}

/// One request parsed out of the feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    /// Stable id within one run, e.g. `fb_1`.
    pub id: String,
    /// The request.
    pub request: ChangeRequest,
    /// Feedback text it came from.
    #[serde(default)]
    pub source_text: String,
}

impl FeedbackItem {
    /// Creates an item.
    #[must_use]
    pub fn new(id: impl Into<String>, request: ChangeRequest, source_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            request,
            source_text: source_text.into(),
        }
    }
}

/// Structured form of the user's feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFeedback {
    /// Actionable requests.
    pub items: Vec<FeedbackItem>,
    /// Remarks that map to no change.
    #[serde(default)]
    pub general_comments: Vec<String>,
}

impl ParsedFeedback {
    /// Number of items per category.
    #[must_use]
    pub fn category_counts(&self) -> BTreeMap<FeedbackCategory, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.request.category()).or_insert(0) += 1;
        }
        counts
    }

    /// Keeps only items whose id satisfies `keep`.
    #[must_use]
    pub fn retain_ids<F: Fn(&str) -> bool>(&self, keep: F) -> Self {
        Self {
            items: self.items.iter().filter(|i| keep(&i.id)).cloned().collect(),
            general_comments: self.general_comments.clone(),
        }
    }
}

/// What the feedback parser produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutcome {
    /// Structured feedback.
    pub parsed: ParsedFeedback,
    /// Non-fatal parser warnings.
    pub warnings: Vec<String>,
}

/// An item an analysis refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItem {
    /// Id of the refused item.
    pub item_id: String,
    /// Why it was refused.
    pub reason: String,
}

/// Accepted and rejected items of one analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    /// Ids that passed.
    pub accepted: Vec<String>,
    /// Items that failed.
    pub rejected: Vec<RejectedItem>,
}

impl AnalysisVerdict {
    /// A verdict accepting every item.
    #[must_use]
    pub fn accept_all(feedback: &ParsedFeedback) -> Self {
        Self {
            accepted: feedback.items.iter().map(|i| i.id.clone()).collect(),
            rejected: Vec::new(),
        }
    }

    /// Returns true if `id` was accepted.
    #[must_use]
    pub fn accepts(&self, id: &str) -> bool {
        self.accepted.iter().any(|a| a == id)
    }
}

/// Safety analysis result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Accepted and unsafe items.
    pub verdict: AnalysisVerdict,
    /// Cautions that do not block a change.
    pub warnings: Vec<String>,
}

/// Which analysis produced a consideration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsiderationKind {
    /// Can the change be applied to this plan.
    Feasibility,
    /// Is the change safe for this user.
    Safety,
    /// Does the change fit with the other requests.
    Coherence,
}

/// Outcome recorded for a consideration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsiderationStatus {
    /// Cannot be applied.
    Infeasible,
    /// Not safe.
    Unsafe,
    /// Conflicts with other requests.
    Incoherent,
    /// Caution only.
    Warning,
}

/// One line of the considerations summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsiderationEntry {
    /// Analysis that produced it.
    #[serde(rename = "type")]
    pub kind: ConsiderationKind,
    /// Outcome.
    pub status: ConsiderationStatus,
    /// Item id, for item rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message, for warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConsiderationEntry {
    fn rejected(kind: ConsiderationKind, status: ConsiderationStatus, item: &RejectedItem) -> Self {
        Self {
            kind,
            status,
            id: Some(item.item_id.clone()),
            message: None,
            reason: Some(item.reason.clone()),
        }
    }

    fn warning(message: &str) -> Self {
        Self {
            kind: ConsiderationKind::Safety,
            status: ConsiderationStatus::Warning,
            id: None,
            message: Some(message.to_string()),
            reason: None,
        }
    }
}

/// Merged result of the three analyses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsiderationResult {
    /// Items accepted by every analysis.
    pub vetted: ParsedFeedback,
    /// Ordered summary: infeasible, unsafe, incoherent, then safety warnings.
    pub summary: Vec<ConsiderationEntry>,
}

impl ConsiderationResult {
    /// Merges the three analyses of `feedback`.
    #[must_use]
    pub fn merge(
        feedback: &ParsedFeedback,
        feasibility: &AnalysisVerdict,
        safety: &SafetyVerdict,
        coherence: &AnalysisVerdict,
    ) -> Self {
        let vetted = feedback.retain_ids(|id| {
            feasibility.accepts(id) && safety.verdict.accepts(id) && coherence.accepts(id)
        });

        let summary = feasibility
            .rejected
            .iter()
            .map(|r| {
                ConsiderationEntry::rejected(
                    ConsiderationKind::Feasibility,
                    ConsiderationStatus::Infeasible,
                    r,
                )
            })
            .chain(safety.verdict.rejected.iter().map(|r| {
                ConsiderationEntry::rejected(ConsiderationKind::Safety, ConsiderationStatus::Unsafe, r)
            }))
            .chain(coherence.rejected.iter().map(|r| {
                ConsiderationEntry::rejected(
                    ConsiderationKind::Coherence,
                    ConsiderationStatus::Incoherent,
                    r,
                )
            }))
            .chain(safety.warnings.iter().map(|w| ConsiderationEntry::warning(w)))
            .collect();

        Self { vetted, summary }
    }
}

/// A change the modifier applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    /// Feedback item it came from.
    pub item_id: String,
    /// Category.
    pub category: FeedbackCategory,
    /// What was done.
    pub description: String,
    /// Affected day, if one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
}

/// A vetted change the modifier could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedChange {
    /// Feedback item it came from.
    pub item_id: String,
    /// Why it was skipped.
    pub reason: String,
}

/// What the plan modifier returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationResult {
    /// The modified plan; absence is an invalid result.
    pub modified_plan: Option<WorkoutPlan>,
    /// Applied changes.
    #[serde(default)]
    pub applied_changes: Vec<AppliedChange>,
    /// Skipped changes.
    #[serde(default)]
    pub skipped_changes: Vec<SkippedChange>,
}

/// Result of re-validating the modified plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanValidation {
    /// Whether the plan passed.
    pub is_valid: bool,
    /// Problems found.
    pub issues: Vec<String>,
}

impl PlanValidation {
    /// A passing validation.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            issues: Vec::new(),
        }
    }

    /// Builds a validation from a list of issues.
    #[must_use]
    pub fn from_issues(issues: Vec<String>) -> Self {
        Self {
            is_valid: issues.is_empty(),
            issues,
        }
    }
}

/// Rationale for one applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeExplanation {
    /// The change.
    pub change: String,
    /// Why it helps.
    pub rationale: String,
}

/// User-facing explanation of an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanations {
    /// Overall summary.
    pub summary: String,
    /// Per-change rationale.
    #[serde(default)]
    pub details: Vec<ChangeExplanation>,
}

/// Side-by-side numbers of the original and adjusted plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanComparison {
    /// Training days before.
    pub sessions_before: usize,
    /// Training days after.
    pub sessions_after: usize,
    /// Weekly sets before.
    pub total_sets_before: u32,
    /// Weekly sets after.
    pub total_sets_after: u32,
    /// Exercises only in the adjusted plan.
    pub exercises_added: Vec<String>,
    /// Exercises only in the original plan.
    pub exercises_removed: Vec<String>,
    /// Days whose content changed.
    pub days_changed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn feedback() -> ParsedFeedback {
        ParsedFeedback {
            items: vec![
                FeedbackItem::new(
                    "fb_1",
                    ChangeRequest::AddExercise { focus: "legs".into(), exercise: None },
                    "add legs",
                ),
                FeedbackItem::new("fb_2", ChangeRequest::RemoveExercise { exercise: "Curl".into() }, ""),
                FeedbackItem::new(
                    "fb_3",
                    ChangeRequest::AdjustIntensity { direction: Direction::Increase },
                    "",
                ),
            ],
            general_comments: vec![],
        }
    }

    #[test]
    fn test_merge_orders_summary_and_vets() {
        let fb = feedback();
        let feasibility = AnalysisVerdict {
            accepted: vec!["fb_1".into(), "fb_3".into()],
            rejected: vec![RejectedItem { item_id: "fb_2".into(), reason: "not in plan".into() }],
        };
        let safety = SafetyVerdict {
            verdict: AnalysisVerdict {
                accepted: vec!["fb_1".into(), "fb_2".into()],
                rejected: vec![RejectedItem { item_id: "fb_3".into(), reason: "beginner".into() }],
            },
            warnings: vec!["Progress gradually".into()],
        };
        let coherence = AnalysisVerdict::accept_all(&fb);

        let result = ConsiderationResult::merge(&fb, &feasibility, &safety, &coherence);

        assert_eq!(result.vetted.items.len(), 1);
        assert_eq!(result.vetted.items[0].id, "fb_1");
        let statuses: Vec<_> = result.summary.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                ConsiderationStatus::Infeasible,
                ConsiderationStatus::Unsafe,
                ConsiderationStatus::Warning
            ]
        );
        assert_eq!(
            serde_json::to_value(&result.summary[0]).unwrap(),
            json!({"type": "feasibility", "status": "infeasible", "id": "fb_2", "reason": "not in plan"})
        );
    }

    #[test]
    fn test_category_counts() {
        let counts = feedback().category_counts();
        assert_eq!(counts.get(&FeedbackCategory::ExerciseAddition), Some(&1));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_change_request_serde() {
        let request: ChangeRequest =
            serde_json::from_value(json!({"type": "add_exercise", "focus": "legs"})).unwrap();
        assert_eq!(request, ChangeRequest::AddExercise { focus: "legs".into(), exercise: None });
        assert_eq!(request.describe(), "Add a legs exercise");
    }
}
