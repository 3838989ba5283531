//! Scripted and failing collaborators.

use crate::memory::{MemoryError, MemoryMetadata, MemoryQuery, MemoryRecord, MemoryStore};
use crate::ports::{
    ChatMessage, Completion, CompletionClient, CompletionError, CompletionOptions, Datastore,
    DatastoreError, DatastoreResponse, EmbeddingOptions, InMemoryDatastore, SelectQuery,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;

/// A completion client that replays a fixed script of responses.
///
/// Each call pops the next scripted result; an exhausted script yields a
/// malformed-response error.
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Result<Completion, CompletionError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletionClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text response.
    #[must_use]
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(Completion::Text {
            content: text.into(),
        }));
        self
    }

    /// Appends a text response holding `value` as JSON.
    #[must_use]
    pub fn then_json(self, value: Value) -> Self {
        self.then_text(value.to_string())
    }

    /// Appends a failure.
    #[must_use]
    pub fn then_error(self, error: CompletionError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Number of completion calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// The messages of every call, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    /// Scripted responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion, CompletionError> {
        self.requests.lock().push(messages.to_vec());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Malformed("no scripted completion left".into())))
    }

    async fn embed(
        &self,
        input: &[String],
        _options: &EmbeddingOptions,
    ) -> Result<Vec<Vec<f32>>, CompletionError> {
        Ok(input.iter().map(|text| vec![text.len() as f32, 0.0, 1.0]).collect())
    }
}

/// A memory store whose every operation fails.
#[derive(Debug, Clone)]
pub struct FailingMemoryStore {
    message: String,
}

impl FailingMemoryStore {
    /// Creates a store failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl MemoryStore for FailingMemoryStore {
    async fn store_memory(
        &self,
        _content: Value,
        _metadata: MemoryMetadata,
    ) -> Result<MemoryRecord, MemoryError> {
        Err(MemoryError::Unavailable(self.message.clone()))
    }

    async fn retrieve_memories(&self, _query: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
        Err(MemoryError::Unavailable(self.message.clone()))
    }
}

/// A datastore that fails writes, or everything.
#[derive(Debug)]
pub struct FailingDatastore {
    reads: Option<InMemoryDatastore>,
    message: String,
}

impl FailingDatastore {
    /// Fails every operation with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            reads: None,
            message: message.into(),
        }
    }

    /// Serves selects from `reads` and fails inserts and updates.
    #[must_use]
    pub fn failing_writes(reads: InMemoryDatastore, message: impl Into<String>) -> Self {
        Self {
            reads: Some(reads),
            message: message.into(),
        }
    }

    fn failure(&self) -> DatastoreResponse {
        DatastoreResponse::failed(DatastoreError::new(self.message.clone()))
    }
}

#[async_trait]
impl Datastore for FailingDatastore {
    async fn select(&self, table: &str, query: &SelectQuery) -> DatastoreResponse {
        match &self.reads {
            Some(reads) => reads.select(table, query).await,
            None => self.failure(),
        }
    }

    async fn insert(&self, _table: &str, _row: Value) -> DatastoreResponse {
        self.failure()
    }

    async fn update(
        &self,
        _table: &str,
        _id: &str,
        _patch: Value,
        _expected_version: Option<u64>,
    ) -> DatastoreResponse {
        self.failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_client_replays_in_order() {
        let client = ScriptedCompletionClient::new()
            .then_text("one")
            .then_error(CompletionError::Transport("reset".into()));
        let options = CompletionOptions::default();

        let first = client.complete(&[ChatMessage::user("a")], &options).await.unwrap();
        assert_eq!(first.into_text(), "one");
        assert!(client.complete(&[], &options).await.is_err());
        assert!(matches!(
            client.complete(&[], &options).await,
            Err(CompletionError::Malformed(_))
        ));
        assert_eq!(client.calls(), 3);
        assert_eq!(client.requests()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_failing_datastore_serves_reads() {
        let reads = InMemoryDatastore::new().with_rows("profiles", vec![serde_json::json!({"id": "u1"})]);
        let store = FailingDatastore::failing_writes(reads, "disk full");

        let found = store.select("profiles", &SelectQuery::new().eq("id", "u1")).await;
        assert!(found.error.is_none());
        let inserted = store.insert("plans", serde_json::json!({})).await;
        assert_eq!(inserted.error.unwrap().message, "disk full");
    }
}
