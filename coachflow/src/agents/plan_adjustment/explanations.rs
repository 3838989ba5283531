//! User-facing explanations and plan comparison.

use super::collaborators::ExplanationGenerator;
use super::types::{AppliedChange, Explanations, PlanComparison};
use crate::agents::complete_json_with_retry;
use crate::domain::{UserProfile, WorkoutPlan, WEEKDAYS};
use crate::errors::CoachError;
use crate::pipeline::RetryPolicy;
use crate::ports::{ChatMessage, CompletionClient};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Numeric and structural differences between two plans.
#[must_use]
pub fn compare_plans(original: &WorkoutPlan, adjusted: &WorkoutPlan) -> PlanComparison {
    let names = |plan: &WorkoutPlan| -> BTreeSet<String> {
        plan.exercises().map(|e| e.name.clone()).collect()
    };
    let before = names(original);
    let after = names(adjusted);

    let days_changed = WEEKDAYS
        .iter()
        .filter(|day| original.weekly_schedule.get(**day) != adjusted.weekly_schedule.get(**day))
        .map(|day| (*day).to_string())
        .collect();

    PlanComparison {
        sessions_before: original.session_days().len(),
        sessions_after: adjusted.session_days().len(),
        total_sets_before: original.total_sets(),
        total_sets_after: adjusted.total_sets(),
        exercises_added: after.difference(&before).cloned().collect(),
        exercises_removed: before.difference(&after).cloned().collect(),
        days_changed,
    }
}

const EXPLAINER_INSTRUCTIONS: &str = "You are a strength coach explaining plan changes to a client. \
Reply with a JSON object {\"summary\": \"...\", \"details\": [{\"change\": \"...\", \"rationale\": \"...\"}]} \
with one detail per change. Be encouraging and specific.";

/// Completion-backed explanations with deterministic comparison.
pub struct LlmExplanationGenerator {
    completion: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LlmExplanationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmExplanationGenerator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl LlmExplanationGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new(completion: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self { completion, retry }
    }
}

#[async_trait]
impl ExplanationGenerator for LlmExplanationGenerator {
    async fn explain(
        &self,
        original: &WorkoutPlan,
        adjusted: &WorkoutPlan,
        applied: &[AppliedChange],
        profile: &UserProfile,
    ) -> Result<Explanations, CoachError> {
        let comparison = compare_plans(original, adjusted);
        let changes: Vec<String> = applied.iter().map(|c| format!("- {}", c.description)).collect();
        let prompt = format!(
            "Client: {:?} level, goals: {}.\nChanges to \"{}\":\n{}\nWeekly sets went from {} to {}.",
            profile.fitness_level,
            if profile.goals.is_empty() { "general fitness".to_string() } else { profile.goals.join(", ") },
            adjusted.name,
            if changes.is_empty() { "- none".to_string() } else { changes.join("\n") },
            comparison.total_sets_before,
            comparison.total_sets_after,
        );

        complete_json_with_retry(
            self.completion.as_ref(),
            &self.retry,
            &[ChatMessage::system(EXPLAINER_INSTRUCTIONS), ChatMessage::user(prompt)],
            &["summary"],
        )
        .await
    }

    async fn compare(
        &self,
        original: &WorkoutPlan,
        adjusted: &WorkoutPlan,
    ) -> Result<PlanComparison, CoachError> {
        Ok(compare_plans(original, adjusted))
    }
}
