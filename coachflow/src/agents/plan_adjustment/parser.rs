//! Feedback parsing: completion-backed, with a keyword fallback.

use super::catalog::{find_body_part, find_equipment, find_focus};
use super::collaborators::FeedbackParser;
use super::types::{ChangeRequest, Direction, FeedbackItem, ParseOutcome, ParsedFeedback};
use crate::agents::complete_json_with_retry;
use crate::domain::{WorkoutPlan, WEEKDAYS};
use crate::errors::CoachError;
use crate::memory::MemoryRecord;
use crate::pipeline::RetryPolicy;
use crate::ports::{ChatMessage, CompletionClient};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

static SUBSTITUTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(?:replace|swap|substitute|switch)\s+(?:the\s+|my\s+)?(.+?)\s+(?:with|for|to)\s+(?:a\s+|an\s+|some\s+)?(.+)")
        .ok()
});

static REMOVAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(?:remove|drop|skip|get rid of|cut)\s+(?:the\s+|my\s+|all\s+)?(.+)").ok()
});

static SENTENCE_SPLIT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[.!?;\n]+|,\s*(?:and\s+)?|\s+and\s+(?:also\s+)?").ok());

const PAIN_WORDS: &[&str] = &["hurt", "hurts", "pain", "painful", "injur", "sore", "ache", "tweak"];
const EQUIPMENT_WORDS: &[&str] = &["don't have", "dont have", "do not have", "no access", "without", "lack"];
const MORE_VOLUME: &[&str] = &["more sets", "more volume", "more reps", "not enough"];
const LESS_VOLUME: &[&str] = &["fewer sets", "less volume", "too much", "too many", "too long", "fewer reps"];
const HARDER: &[&str] = &["harder", "heavier", "too easy", "more intense", "more challenging"];
const EASIER: &[&str] = &["easier", "lighter", "too hard", "less intense", "too difficult", "exhausting"];

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn clean_target(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(" exercises")
        .trim_end_matches(" exercise")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

fn days_in(text: &str) -> Vec<&'static str> {
    let mut found: Vec<(usize, &'static str)> = WEEKDAYS
        .iter()
        .filter_map(|day| text.find(day).map(|pos| (pos, *day)))
        .collect();
    found.sort_unstable();
    found.into_iter().map(|(_, day)| day).collect()
}

fn classify(sentence: &str) -> Option<ChangeRequest> {
    let text = sentence.to_lowercase();

    if contains_any(&text, PAIN_WORDS) {
        let area = find_body_part(&text).unwrap_or("unspecified").to_string();
        return Some(ChangeRequest::PainConcern { area, exercise: None });
    }
    if contains_any(&text, EQUIPMENT_WORDS) {
        if let Some(equipment) = find_equipment(&text) {
            return Some(ChangeRequest::EquipmentLimitation {
                equipment: equipment.to_string(),
            });
        }
    }
    if let Some(captures) = SUBSTITUTION.as_ref().and_then(|re| re.captures(&text)) {
        let from = captures.get(1).map(|m| clean_target(m.as_str())).unwrap_or_default();
        let to = captures.get(2).map(|m| clean_target(m.as_str())).filter(|s| !s.is_empty());
        if !from.is_empty() {
            return Some(ChangeRequest::SubstituteExercise { from, to });
        }
    }
    if text.contains("move") {
        if let [from_day, to_day, ..] = days_in(&text).as_slice() {
            return Some(ChangeRequest::ChangeSchedule {
                from_day: from_day.to_string(),
                to_day: to_day.to_string(),
            });
        }
    }
    if let Some(captures) = REMOVAL.as_ref().and_then(|re| re.captures(&text)) {
        let exercise = captures.get(1).map(|m| clean_target(m.as_str())).unwrap_or_default();
        if !exercise.is_empty() {
            return Some(ChangeRequest::RemoveExercise { exercise });
        }
    }
    if contains_any(&text, &["add", "include", "more"]) {
        if let Some(focus) = find_focus(&text) {
            if !contains_any(&text, MORE_VOLUME) {
                return Some(ChangeRequest::AddExercise {
                    focus: focus.name.to_string(),
                    exercise: None,
                });
            }
        }
    }
    if contains_any(&text, MORE_VOLUME) {
        return Some(ChangeRequest::AdjustVolume {
            exercise: None,
            direction: Direction::Increase,
        });
    }
    if contains_any(&text, LESS_VOLUME) {
        return Some(ChangeRequest::AdjustVolume {
            exercise: None,
            direction: Direction::Decrease,
        });
    }
    if contains_any(&text, HARDER) {
        return Some(ChangeRequest::AdjustIntensity {
            direction: Direction::Increase,
        });
    }
    if contains_any(&text, EASIER) {
        return Some(ChangeRequest::AdjustIntensity {
            direction: Direction::Decrease,
        });
    }
    None
}

/// Parses feedback with keyword rules only.
///
/// Each sentence (or `and`-joined clause) yields at most one request;
/// clauses matching no rule become general comments.
#[must_use]
pub fn parse_keywords(feedback: &str) -> ParsedFeedback {
    let clauses: Vec<&str> = match SENTENCE_SPLIT.as_ref() {
        Some(re) => re.split(feedback).collect(),
        None => vec![feedback],
    };

    let mut parsed = ParsedFeedback::default();
    for clause in clauses.into_iter().map(str::trim).filter(|c| !c.is_empty()) {
        match classify(clause) {
            Some(request) => {
                let id = format!("fb_{}", parsed.items.len() + 1);
                parsed.items.push(FeedbackItem::new(id, request, clause));
            }
            None => parsed.general_comments.push(clause.to_string()),
        }
    }
    parsed
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionItem {
    request: ChangeRequest,
    #[serde(default)]
    source_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionFeedback {
    items: Vec<CompletionItem>,
    #[serde(default)]
    general_comments: Vec<String>,
}

impl From<CompletionFeedback> for ParsedFeedback {
    fn from(raw: CompletionFeedback) -> Self {
        Self {
            items: raw
                .items
                .into_iter()
                .enumerate()
                .map(|(n, item)| FeedbackItem::new(format!("fb_{}", n + 1), item.request, item.source_text))
                .collect(),
            general_comments: raw.general_comments,
        }
    }
}

const PARSER_INSTRUCTIONS: &str = "You convert workout feedback into structured change requests. \
Reply with a JSON object {\"items\": [{\"request\": {...}, \"sourceText\": \"...\"}], \"generalComments\": []}. \
Each request has a \"type\" of substitute_exercise (from, to), add_exercise (focus, exercise), \
remove_exercise (exercise), adjust_volume (exercise, direction), adjust_intensity (direction), \
change_schedule (from_day, to_day), pain_concern (area, exercise) or equipment_limitation (equipment). \
Directions are increase or decrease. Days are lowercase weekday names.";

fn build_messages(feedback: &str, plan: &WorkoutPlan, history: &[MemoryRecord]) -> Vec<ChatMessage> {
    let exercises: Vec<&str> = plan.exercises().map(|e| e.name.as_str()).collect();
    let mut context = format!(
        "Plan \"{}\" trains on {}. Exercises: {}.",
        plan.name,
        plan.session_days().join(", "),
        exercises.join(", ")
    );
    if !history.is_empty() {
        context.push_str(&format!(
            " The user has made {} earlier adjustments.",
            history.len()
        ));
    }
    vec![
        ChatMessage::system(PARSER_INSTRUCTIONS),
        ChatMessage::user(format!("{context}\n\nFeedback: {feedback}")),
    ]
}

/// Completion-backed parser that falls back to keyword rules.
pub struct LlmFeedbackParser {
    completion: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LlmFeedbackParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmFeedbackParser")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl LlmFeedbackParser {
    /// Creates a parser.
    #[must_use]
    pub fn new(completion: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self { completion, retry }
    }
}

#[async_trait]
impl FeedbackParser for LlmFeedbackParser {
    async fn parse(
        &self,
        feedback: &str,
        plan: &WorkoutPlan,
        history: &[MemoryRecord],
    ) -> Result<ParseOutcome, CoachError> {
        let messages = build_messages(feedback, plan, history);
        let result: Result<CompletionFeedback, CoachError> = complete_json_with_retry(
            self.completion.as_ref(),
            &self.retry,
            &messages,
            &["items"],
        )
        .await;

        let mut warnings = Vec::new();
        let mut parsed = match result {
            Ok(raw) if !raw.items.is_empty() => ParsedFeedback::from(raw),
            Ok(_) => {
                warnings.push("Completion found no actionable feedback; used keyword rules".to_string());
                parse_keywords(feedback)
            }
            Err(err) => {
                warnings.push(format!(
                    "Feedback parsing fell back to keyword rules: {}",
                    err.message()
                ));
                parse_keywords(feedback)
            }
        };

        if parsed.items.is_empty() {
            warnings.push("No actionable changes found in feedback".to_string());
        }
        for item in &mut parsed.items {
            if item.source_text.is_empty() {
                item.source_text = feedback.to_string();
            }
        }

        Ok(ParseOutcome { parsed, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_plan, ScriptedCompletionClient};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_add_leg_exercises() {
        let parsed = parse_keywords("add more leg exercises");
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(
            parsed.items[0].request,
            ChangeRequest::AddExercise { focus: "legs".into(), exercise: None }
        );
        assert_eq!(parsed.items[0].id, "fb_1");
    }

    #[test]
    fn test_multiple_clauses() {
        let parsed = parse_keywords(
            "Replace the bench press with push-ups. My knee hurts on lunges, and it's too easy overall! Great plan",
        );
        let requests: Vec<_> = parsed.items.iter().map(|i| i.request.clone()).collect();

        assert_eq!(
            requests,
            vec![
                ChangeRequest::SubstituteExercise {
                    from: "bench press".into(),
                    to: Some("push-ups".into())
                },
                ChangeRequest::PainConcern { area: "knee".into(), exercise: None },
                ChangeRequest::AdjustIntensity { direction: Direction::Increase },
            ]
        );
        assert_eq!(parsed.general_comments, vec!["Great plan"]);
    }

    #[test]
    fn test_schedule_equipment_and_removal() {
        let parsed = parse_keywords("move friday to saturday; I don't have a barbell; remove the curls");
        let requests: Vec<_> = parsed.items.iter().map(|i| i.request.clone()).collect();

        assert_eq!(
            requests,
            vec![
                ChangeRequest::ChangeSchedule { from_day: "friday".into(), to_day: "saturday".into() },
                ChangeRequest::EquipmentLimitation { equipment: "barbell".into() },
                ChangeRequest::RemoveExercise { exercise: "curls".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_llm_parse_uses_completion() {
        let client = Arc::new(ScriptedCompletionClient::new().then_json(json!({
            "items": [{"request": {"type": "remove_exercise", "exercise": "Plank"}, "sourceText": "no planks"}]
        })));
        let parser = LlmFeedbackParser::new(client.clone(), RetryPolicy::none());

        let outcome = parser.parse("no planks please", &sample_plan(), &[]).await.unwrap();

        assert!(outcome.warnings.is_empty());
        assert_eq!(
            outcome.parsed.items[0].request,
            ChangeRequest::RemoveExercise { exercise: "Plank".into() }
        );
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_with_warning() {
        let client = Arc::new(ScriptedCompletionClient::new().then_text("Sorry, I can't."));
        let parser = LlmFeedbackParser::new(client, RetryPolicy::none());

        let outcome = parser
            .parse("add more leg exercises", &sample_plan(), &[])
            .await
            .unwrap();

        assert_eq!(outcome.parsed.items.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("keyword rules"));
    }
}
