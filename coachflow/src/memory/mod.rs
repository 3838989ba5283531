//! Long-term memory of agent outputs and reasoning.
//!
//! Records are written once per successful pipeline run and read back by
//! metadata filter, most recent first. From the pipeline's point of view
//! every memory operation is best-effort.

mod store;

pub use store::InMemoryMemoryStore;

use crate::errors::{AgentError, CoachError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Kind of memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// An artifact an agent produced.
    AgentOutput,
    /// Reasoning and explanations behind an artifact.
    AgentMetadata,
    /// Feedback written by the user.
    UserFeedback,
}

/// Metadata supplied when storing a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    /// Owner of the record.
    pub user_id: String,
    /// Record kind.
    pub memory_type: MemoryType,
    /// Free-form content label such as `adjusted_plan`.
    pub content_type: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`; the store default applies when absent.
    #[serde(default)]
    pub importance: Option<f32>,
    /// Plan or session the record belongs to.
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Agent that wrote the record.
    #[serde(default)]
    pub agent: Option<String>,
}

impl MemoryMetadata {
    fn of_type(memory_type: MemoryType, user_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            memory_type,
            content_type: content_type.into(),
            tags: Vec::new(),
            importance: None,
            plan_id: None,
            agent: None,
        }
    }

    /// Metadata for an agent-produced artifact.
    #[must_use]
    pub fn agent_output(user_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::of_type(MemoryType::AgentOutput, user_id, content_type)
    }

    /// Metadata for reasoning and explanations.
    #[must_use]
    pub fn agent_metadata(user_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::of_type(MemoryType::AgentMetadata, user_id, content_type)
    }

    /// Metadata for user feedback.
    #[must_use]
    pub fn user_feedback(user_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::of_type(MemoryType::UserFeedback, user_id, content_type)
    }

    /// Adds tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the importance, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance.clamp(0.0, 1.0));
        self
    }

    /// Links the record to a plan.
    #[must_use]
    pub fn with_plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    /// Records the writing agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// A stored memory. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Record id.
    pub id: Uuid,
    /// Owner.
    pub user_id: String,
    /// Record kind.
    pub memory_type: MemoryType,
    /// Content label.
    pub content_type: String,
    /// Stored artifact.
    pub content: Value,
    /// Search tags.
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f32,
    /// Linked plan.
    pub plan_id: Option<String>,
    /// Writing agent.
    pub agent: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Filter for retrieving memories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    /// Owner.
    pub user_id: String,
    /// Required kind.
    pub memory_type: Option<MemoryType>,
    /// Required content label.
    pub content_type: Option<String>,
    /// Tags that must all be present.
    pub tags: Vec<String>,
    /// Required plan link.
    pub plan_id: Option<String>,
    /// Maximum records.
    pub limit: Option<usize>,
}

impl MemoryQuery {
    /// Creates a query for all of a user's records.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Restricts the kind.
    #[must_use]
    pub fn of_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Restricts the content label.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Requires a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Restricts the plan link.
    #[must_use]
    pub fn plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    /// Limits the result.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `record` satisfies every filter.
    #[must_use]
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        record.user_id == self.user_id
            && self.memory_type.map_or(true, |t| record.memory_type == t)
            && self
                .content_type
                .as_ref()
                .map_or(true, |c| &record.content_type == c)
            && self.plan_id.as_ref().map_or(true, |p| record.plan_id.as_ref() == Some(p))
            && self.tags.iter().all(|tag| record.tags.contains(tag))
    }
}

/// Memory store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The store could not be reached.
    #[error("Memory store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the operation.
    #[error("Memory operation rejected: {0}")]
    Rejected(String),
}

impl From<MemoryError> for CoachError {
    fn from(err: MemoryError) -> Self {
        AgentError::memory_system(err.to_string()).into()
    }
}

/// A long-term memory store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Stores `content` with `metadata` and returns the created record.
    async fn store_memory(
        &self,
        content: Value,
        metadata: MemoryMetadata,
    ) -> Result<MemoryRecord, MemoryError>;

    /// Returns matching records, most recent first.
    async fn retrieve_memories(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError>;
}
