//! In-process memory store.

use super::{MemoryError, MemoryMetadata, MemoryQuery, MemoryRecord, MemoryStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

/// Memory store backed by a vector in process memory.
#[derive(Debug)]
pub struct InMemoryMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
    default_importance: f32,
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::with_default_importance(0.5)
    }
}

impl InMemoryMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that assigns `importance` when metadata omits it.
    #[must_use]
    pub fn with_default_importance(importance: f32) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            default_importance: importance.clamp(0.0, 1.0),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns a snapshot of every record in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn store_memory(
        &self,
        content: Value,
        metadata: MemoryMetadata,
    ) -> Result<MemoryRecord, MemoryError> {
        if metadata.user_id.is_empty() {
            return Err(MemoryError::Rejected("user id is required".to_string()));
        }

        let record = MemoryRecord {
            id: Uuid::new_v4(),
            user_id: metadata.user_id,
            memory_type: metadata.memory_type,
            content_type: metadata.content_type,
            content,
            tags: metadata.tags,
            importance: metadata.importance.unwrap_or(self.default_importance),
            plan_id: metadata.plan_id,
            agent: metadata.agent,
            created_at: Utc::now(),
        };
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn retrieve_memories(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
        // Newest insertions first; the stable sort keeps that order for equal timestamps.
        let mut found: Vec<MemoryRecord> = self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}
