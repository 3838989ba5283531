//! Injected capabilities for agents.
//!
//! Agents only see the traits defined here; [`AgentPorts`] bundles the
//! implementations a controller hands to an agent constructor.

mod completion;
mod datastore;
#[cfg(feature = "openai")]
mod openai;

pub use completion::{
    is_transient_completion_error, ChatMessage, Completion, CompletionClient, CompletionError,
    CompletionOptions, EmbeddingOptions, Role,
};
pub use datastore::{
    Datastore, DatastoreError, DatastoreResponse, InMemoryDatastore, OrderDirection, SelectQuery,
    VERSION_CONFLICT,
};
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;

use crate::memory::MemoryStore;
use crate::observability::Logger;
use std::sync::Arc;

/// Collaborators injected into an agent.
#[derive(Clone, Default)]
pub struct AgentPorts {
    /// Completion service.
    pub completion: Option<Arc<dyn CompletionClient>>,
    /// Datastore.
    pub datastore: Option<Arc<dyn Datastore>>,
    /// Long-term memory.
    pub memory: Option<Arc<dyn MemoryStore>>,
    /// Log sink.
    pub logger: Option<Arc<dyn Logger>>,
}

impl std::fmt::Debug for AgentPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPorts")
            .field("has_completion", &self.completion.is_some())
            .field("has_datastore", &self.datastore.is_some())
            .field("has_memory", &self.memory.is_some())
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

impl AgentPorts {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the completion client.
    #[must_use]
    pub fn with_completion(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.completion = Some(client);
        self
    }

    /// Sets the datastore.
    #[must_use]
    pub fn with_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Sets the memory store.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Sets the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }
}
