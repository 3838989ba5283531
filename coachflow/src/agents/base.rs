//! Shared collaborators and helpers for every agent.

use crate::config::AgentConfig;
use crate::errors::{AgentError, CoachError};
use crate::memory::{MemoryMetadata, MemoryQuery, MemoryRecord, MemoryStore};
use crate::observability::{LogLevel, Logger, TracingLogger};
use crate::pipeline::{retry_with_backoff, CancellationToken, RetryPolicy, StageRunner};
use crate::ports::{
    is_transient_completion_error, AgentPorts, ChatMessage, Completion, CompletionClient,
    CompletionOptions, Datastore,
};
use crate::utils::parse_llm_json;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Which collaborators an agent cannot run without.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentRequirements {
    /// The agent reads or writes the datastore.
    pub data_backed: bool,
}

impl AgentRequirements {
    /// Requirements of an agent that only needs the completion service.
    #[must_use]
    pub fn completion_only() -> Self {
        Self { data_backed: false }
    }

    /// Requirements of an agent that also needs the datastore.
    #[must_use]
    pub fn data_backed() -> Self {
        Self { data_backed: true }
    }
}

/// State and helpers common to all agents.
///
/// Construction fails if a required collaborator is missing, so a
/// successfully built agent never discovers a missing dependency mid-run.
pub struct AgentBase {
    name: String,
    completion: Arc<dyn CompletionClient>,
    datastore: Option<Arc<dyn Datastore>>,
    memory: Option<Arc<dyn MemoryStore>>,
    logger: Arc<dyn Logger>,
    config: AgentConfig,
}

impl std::fmt::Debug for AgentBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBase")
            .field("name", &self.name)
            .field("has_datastore", &self.datastore.is_some())
            .field("has_memory", &self.memory.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentBase {
    /// Builds the base, checking required collaborators.
    pub fn new(
        name: impl Into<String>,
        ports: AgentPorts,
        requirements: AgentRequirements,
        config: AgentConfig,
    ) -> Result<Self, CoachError> {
        let name = name.into();

        let Some(completion) = ports.completion else {
            return Err(AgentError::configuration(format!(
                "{name} agent requires a completion client"
            ))
            .with_detail("agent", name.as_str())
            .with_detail("missing", "completion")
            .into());
        };
        if requirements.data_backed && ports.datastore.is_none() {
            return Err(AgentError::configuration(format!("{name} agent requires a datastore"))
                .with_detail("agent", name.as_str())
                .with_detail("missing", "datastore")
                .into());
        }

        let logger = ports
            .logger
            .unwrap_or_else(|| Arc::new(TracingLogger) as Arc<dyn Logger>);

        Ok(Self {
            name,
            completion,
            datastore: ports.datastore,
            memory: ports.memory,
            logger,
            config,
        })
    }

    /// Agent name used in logs and memory metadata.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The completion client.
    #[must_use]
    pub fn completion(&self) -> &Arc<dyn CompletionClient> {
        &self.completion
    }

    /// The datastore, if injected.
    #[must_use]
    pub fn datastore(&self) -> Option<&Arc<dyn Datastore>> {
        self.datastore.as_ref()
    }

    /// The datastore, or a configuration error.
    pub fn require_datastore(&self) -> Result<&dyn Datastore, CoachError> {
        self.datastore.as_deref().ok_or_else(|| {
            AgentError::configuration(format!("{} agent requires a datastore", self.name))
                .with_detail("missing", "datastore")
                .into()
        })
    }

    /// The injected logger.
    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// Fails with a validation error when `predicate(value)` is false.
    pub fn validate<T, F>(&self, value: &T, predicate: F, message: &str) -> Result<(), CoachError>
    where
        T: ?Sized,
        F: FnOnce(&T) -> bool,
    {
        if predicate(value) {
            Ok(())
        } else {
            Err(AgentError::validation(message).with_detail("agent", self.name.as_str()).into())
        }
    }

    /// Logs through the injected logger.
    pub fn log(&self, level: LogLevel, message: &str, meta: Option<Value>) {
        self.logger.log(level, &self.name, message, meta.as_ref());
    }

    fn memory_store(&self) -> Option<&dyn MemoryStore> {
        if self.config.memory.enabled {
            self.memory.as_deref()
        } else {
            None
        }
    }

    /// Stores a memory; resolves to `None` when no store is available.
    pub async fn store_memory(
        &self,
        content: Value,
        metadata: MemoryMetadata,
    ) -> Result<Option<MemoryRecord>, CoachError> {
        let Some(store) = self.memory_store() else {
            return Ok(None);
        };

        let mut metadata = metadata;
        if metadata.agent.is_none() {
            metadata.agent = Some(self.name.clone());
        }
        if metadata.importance.is_none() {
            metadata.importance = Some(self.config.memory.default_importance);
        }

        let record = store.store_memory(content, metadata).await?;
        tracing::debug!(agent = %self.name, memory_id = %record.id, "Stored memory");
        Ok(Some(record))
    }

    /// Retrieves memories; resolves empty when no store is available.
    pub async fn retrieve_memories(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>, CoachError> {
        match self.memory_store() {
            Some(store) => Ok(store.retrieve_memories(query).await?),
            None => Ok(Vec::new()),
        }
    }

    /// The agent's retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// Runs `operation` under the agent's retry policy.
    pub async fn retry_with_backoff<T, E, F, Fut, P>(&self, operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E, u32) -> Result<bool, E>,
        E: Display,
    {
        retry_with_backoff(&self.config.retry, operation, should_retry).await
    }

    /// Calls the completion service, retrying transient failures.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, CoachError> {
        complete_with_retry(self.completion.as_ref(), &self.config.retry, messages, options).await
    }

    /// Calls the completion service and returns the text.
    pub async fn complete_text(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, CoachError> {
        Ok(self.complete(messages, options).await?.into_text())
    }

    /// Calls the completion service in JSON mode and decodes the result.
    ///
    /// Output that is not JSON, lacks a `required` key or does not decode
    /// into `T` is a processing error.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        required: &[&str],
    ) -> Result<T, CoachError> {
        complete_json_with_retry(self.completion.as_ref(), &self.config.retry, messages, required).await
    }

    /// Creates a stage runner for one invocation.
    #[must_use]
    pub fn runner<'a>(&'a self, cancel: &'a CancellationToken) -> StageRunner<'a> {
        StageRunner::new(&self.name, self.logger.as_ref(), cancel)
    }
}

/// Completion call with transient-failure retry, usable outside an agent.
pub async fn complete_with_retry(
    client: &dyn CompletionClient,
    policy: &RetryPolicy,
    messages: &[ChatMessage],
    options: &CompletionOptions,
) -> Result<Completion, CoachError> {
    retry_with_backoff(
        policy,
        |_| client.complete(messages, options),
        is_transient_completion_error,
    )
    .await
    .map_err(CoachError::from)
}

/// JSON completion call with transient-failure retry.
pub async fn complete_json_with_retry<T: DeserializeOwned>(
    client: &dyn CompletionClient,
    policy: &RetryPolicy,
    messages: &[ChatMessage],
    required: &[&str],
) -> Result<T, CoachError> {
    let text = complete_with_retry(client, policy, messages, &CompletionOptions::json())
        .await?
        .into_text();
    Ok(parse_llm_json(&text, required)?)
}
