//! The research agent.

use super::{
    CONTENT_RESEARCH_SUMMARY, MIN_CONFIDENCE, STEP_GATHER_INSIGHTS, STEP_MEMORY, STEP_PLAN_QUERIES,
    STEP_SYNTHESIS, STEP_VALIDATE_INSIGHTS,
};
use crate::agents::{log_fatal, Agent, AgentBase, AgentRequirements};
use crate::config::AgentConfig;
use crate::errors::{AgentError, CoachError, ErrorCode};
use crate::memory::MemoryMetadata;
use crate::observability::LogLevel;
use crate::pipeline::{CancellationToken, PipelineTrace, StageIssue};
use crate::ports::{AgentPorts, ChatMessage};
use crate::utils::to_content;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

const DEFAULT_MAX_QUERIES: usize = 3;
const QUERY_LIMIT: usize = 10;

fn default_max_queries() -> usize {
    DEFAULT_MAX_QUERIES
}

/// A research request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    /// Who asked.
    pub user_id: String,
    /// Subject, e.g. `creatine and recovery`.
    pub topic: String,
    /// Specific questions to cover.
    #[serde(default)]
    pub questions: Vec<String>,
    /// Upper bound on completion calls spent gathering.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
}

impl ResearchRequest {
    /// Creates a request for `topic` with no extra questions.
    #[must_use]
    pub fn new(user_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            topic: topic.into(),
            questions: Vec::new(),
            max_queries: DEFAULT_MAX_QUERIES,
        }
    }
}

/// One claim found while researching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// The claim.
    pub claim: String,
    /// Citation or origin.
    #[serde(default)]
    pub source: Option<String>,
    /// Confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
}

impl Insight {
    fn is_trustworthy(&self) -> bool {
        !self.claim.trim().is_empty()
            && self.source.as_deref().is_some_and(|s| !s.trim().is_empty())
            && self.confidence >= MIN_CONFIDENCE
    }
}

/// Final summary of a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synthesis {
    /// Prose summary.
    pub summary: String,
    /// Actionable recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Per-invocation state of the research pipeline.
#[derive(Debug, Clone)]
pub struct ResearchState {
    /// The request.
    pub input: ResearchRequest,
    /// Queries sent to the completion service.
    pub queries: Option<Vec<String>>,
    /// Every insight gathered.
    pub raw_insights: Option<Vec<Insight>>,
    /// Insights the summary is built from.
    pub insights: Option<Vec<Insight>>,
    /// The summary.
    pub synthesis: Option<Synthesis>,
    /// Errors, warnings and reasoning.
    pub trace: PipelineTrace,
}

impl ResearchState {
    fn new(input: ResearchRequest) -> Self {
        Self {
            input,
            queries: None,
            raw_insights: None,
            insights: None,
            synthesis: None,
            trace: PipelineTrace::new(),
        }
    }
}

/// Result of a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutput {
    /// The topic researched.
    pub topic: String,
    /// Summary text.
    pub summary: String,
    /// Recommendations.
    pub recommendations: Vec<String>,
    /// Insights backing the summary.
    pub insights: Vec<Insight>,
    /// Queries that were run.
    pub queries: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Reasoning lines.
    pub reasoning: Vec<String>,
    /// Non-critical stage issues.
    pub errors: Vec<StageIssue>,
}

#[derive(Debug, Deserialize)]
struct InsightsResponse {
    insights: Vec<Insight>,
}

/// Builds the query list: the topic, then each distinct question.
///
/// Blank entries and case-insensitive duplicates are skipped; the list is
/// cut to `max_queries`.
#[must_use]
pub fn plan_queries(topic: &str, questions: &[String], max_queries: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(topic)
        .chain(questions.iter().map(String::as_str))
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .filter(|query| seen.insert(query.to_lowercase()))
        .take(max_queries)
        .map(str::to_string)
        .collect()
}

/// Researches a topic with parallel completion calls and a final synthesis.
#[derive(Debug)]
pub struct ResearchAgent {
    base: AgentBase,
}

impl ResearchAgent {
    /// Agent name used in logs and memory metadata.
    pub const NAME: &'static str = "research";

    /// Creates the agent.
    pub fn new(ports: AgentPorts, config: AgentConfig) -> Result<Self, CoachError> {
        let base = AgentBase::new(Self::NAME, ports, AgentRequirements::completion_only(), config)?;
        Ok(Self { base })
    }

    async fn run(&self, state: &mut ResearchState, cancel: &CancellationToken) -> Result<(), CoachError> {
        let runner = self.base.runner(cancel);

        runner.check_cancelled(STEP_PLAN_QUERIES)?;
        let queries = runner.guard(STEP_PLAN_QUERIES, self.queries_for(&state.input))?;
        state.trace.reason(format!("Planned {} query(ies)", queries.len()));
        state.trace.complete(STEP_PLAN_QUERIES);
        let queries = &*state.queries.insert(queries);

        let raw = runner
            .critical(
                STEP_GATHER_INSIGHTS,
                ErrorCode::ExternalService,
                self.gather(&state.input.topic, queries),
            )
            .await?;
        state.trace.complete(STEP_GATHER_INSIGHTS);
        let raw = &*state.raw_insights.insert(raw);

        let validated = runner
            .non_critical(STEP_VALIDATE_INSIGHTS, async { validate_insights(raw) })
            .await;
        let insights = match validated {
            Ok(kept) => {
                let dropped = raw.len() - kept.len();
                if dropped > 0 {
                    state.trace.reason(format!(
                        "Dropped {dropped} insight(s) without a source or below confidence {MIN_CONFIDENCE}"
                    ));
                }
                state.trace.complete(STEP_VALIDATE_INSIGHTS);
                kept
            }
            Err(err) => {
                state.trace.warn(format!("Insight validation failed: {}", err.message()));
                state.trace.record_issue(StageIssue::non_critical(
                    STEP_VALIDATE_INSIGHTS,
                    err.message(),
                    err.code().unwrap_or(ErrorCode::Validation),
                ));
                raw.clone()
            }
        };
        let insights = &*state.insights.insert(insights);

        let synthesis = runner
            .critical(STEP_SYNTHESIS, ErrorCode::ExternalService, self.synthesize(&state.input, insights))
            .await?;
        state.trace.complete(STEP_SYNTHESIS);
        let synthesis = &*state.synthesis.insert(synthesis);

        runner.check_cancelled(STEP_MEMORY)?;
        let stored = async {
            let content = json!({
                "topic": state.input.topic,
                "summary": synthesis.summary,
                "recommendations": synthesis.recommendations,
                "insights": to_content(insights)?,
            });
            let metadata = MemoryMetadata::agent_output(state.input.user_id.as_str(), CONTENT_RESEARCH_SUMMARY)
                .with_tags(["research".to_string(), state.input.topic.trim().to_lowercase()]);
            self.base.store_memory(content, metadata).await
        }
        .await;
        state.trace.absorb("Memory storage failed (research summary)", stored);
        Ok(())
    }

    fn queries_for(&self, input: &ResearchRequest) -> Result<Vec<String>, CoachError> {
        self.base.validate(
            input.topic.as_str(),
            |topic: &str| !topic.trim().is_empty(),
            "Research topic must not be empty",
        )?;
        if input.max_queries == 0 || input.max_queries > QUERY_LIMIT {
            return Err(AgentError::validation(format!("Max queries must be between 1 and {QUERY_LIMIT}"))
                .with_detail("maxQueries", input.max_queries)
                .into());
        }
        Ok(plan_queries(&input.topic, &input.questions, input.max_queries))
    }

    async fn gather(&self, topic: &str, queries: &[String]) -> Result<Vec<Insight>, CoachError> {
        let calls = queries.iter().map(|query| async move {
            let messages = [
                ChatMessage::system(
                    "You are a sports-science researcher. Reply with JSON {\"insights\": \
                     [{\"claim\", \"source\", \"confidence\"}]} citing a source for every claim.",
                ),
                ChatMessage::user(format!("Topic: {topic}. Question: {query}")),
            ];
            let response: InsightsResponse = self.base.complete_json(&messages, &["insights"]).await?;
            Ok::<_, CoachError>(response.insights)
        });
        let insights: Vec<Insight> = try_join_all(calls).await?.into_iter().flatten().collect();
        if insights.is_empty() {
            return Err(AgentError::processing("Research returned no insights")
                .with_detail("queries", queries.len())
                .into());
        }
        tracing::debug!(count = insights.len(), "Gathered insights");
        Ok(insights)
    }

    async fn synthesize(&self, input: &ResearchRequest, insights: &[Insight]) -> Result<Synthesis, CoachError> {
        let evidence = insights
            .iter()
            .map(|i| format!("- {} ({}, confidence {:.2})", i.claim, i.source.as_deref().unwrap_or("unsourced"), i.confidence))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = [
            ChatMessage::system(
                "Summarize the evidence for a coaching client. Reply with JSON {\"summary\", \"recommendations\"}.",
            ),
            ChatMessage::user(format!("Topic: {}\nEvidence:\n{evidence}", input.topic)),
        ];
        let synthesis: Synthesis = self.base.complete_json(&messages, &["summary"]).await?;
        if synthesis.summary.trim().is_empty() {
            return Err(AgentError::processing("Synthesis returned an empty summary").into());
        }
        Ok(synthesis)
    }
}

/// Keeps sourced insights at or above [`MIN_CONFIDENCE`].
///
/// Fails when nothing survives, so the caller can fall back to the raw set.
fn validate_insights(raw: &[Insight]) -> Result<Vec<Insight>, CoachError> {
    let kept: Vec<Insight> = raw.iter().filter(|i| i.is_trustworthy()).cloned().collect();
    if kept.is_empty() {
        return Err(AgentError::validation(format!(
            "No insight has a source and confidence of at least {MIN_CONFIDENCE}"
        ))
        .with_detail("gathered", raw.len())
        .into());
    }
    Ok(kept)
}

#[async_trait]
impl Agent for ResearchAgent {
    type Input = ResearchRequest;
    type Output = ResearchOutput;

    fn base(&self) -> &AgentBase {
        &self.base
    }

    async fn process_with_cancellation(
        &self,
        input: ResearchRequest,
        cancel: &CancellationToken,
    ) -> Result<ResearchOutput, CoachError> {
        let mut state = ResearchState::new(input);
        self.base.log(
            LogLevel::Info,
            "Starting research",
            Some(json!({ "userId": state.input.user_id, "topic": state.input.topic })),
        );

        if let Err(err) = self.run(&mut state, cancel).await {
            state.trace.record_fatal(&err);
            log_fatal(&self.base, &err);
            return Err(err);
        }

        let ResearchState {
            input,
            queries,
            insights,
            synthesis,
            trace,
            ..
        } = state;
        let synthesis = synthesis.ok_or_else(|| AgentError::processing("Research finished without a synthesis"))?;
        Ok(ResearchOutput {
            topic: input.topic,
            summary: synthesis.summary,
            recommendations: synthesis.recommendations,
            insights: insights.unwrap_or_default(),
            queries: queries.unwrap_or_default(),
            warnings: trace.warnings,
            reasoning: trace.reasoning,
            errors: trace.errors,
        })
    }
}
