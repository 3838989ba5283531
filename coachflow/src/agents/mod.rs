//! Agents and the contract they share.
//!
//! Every agent wraps an [`AgentBase`] and implements [`Agent`]. A call to
//! [`Agent::process`] creates a fresh pipeline state, runs the agent's
//! stages in order through a [`StageRunner`](crate::pipeline::StageRunner),
//! and either returns the formatted output or the error that halted the run.

mod base;
pub mod nutrition;
pub mod plan_adjustment;
pub mod research;
pub mod workout;

pub use base::{complete_json_with_retry, complete_with_retry, AgentBase, AgentRequirements};

use crate::errors::{format_error_response, CoachError, ErrorResponse};
use crate::pipeline::CancellationToken;
use async_trait::async_trait;
use serde::Serialize;

/// Result object returned by [`Agent::safe_process`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome<T> {
    /// Whether processing succeeded.
    pub success: bool,
    /// Output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Client-safe error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl<T> ProcessOutcome<T> {
    /// A successful outcome.
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(error: ErrorResponse) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// The entry point controllers call.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Request type.
    type Input: Send + 'static;
    /// Output type.
    type Output: Send + 'static;

    /// Shared collaborators and helpers.
    fn base(&self) -> &AgentBase;

    /// Runs the pipeline, stopping before the next stage once `cancel` fires.
    async fn process_with_cancellation(
        &self,
        input: Self::Input,
        cancel: &CancellationToken,
    ) -> Result<Self::Output, CoachError>;

    /// Runs the pipeline to completion.
    async fn process(&self, input: Self::Input) -> Result<Self::Output, CoachError> {
        let cancel = CancellationToken::new();
        self.process_with_cancellation(input, &cancel).await
    }

    /// Runs the pipeline and never fails.
    ///
    /// Errors are formatted for the agent's environment.
    async fn safe_process(&self, input: Self::Input) -> ProcessOutcome<Self::Output> {
        match self.process(input).await {
            Ok(output) => ProcessOutcome::success(output),
            Err(err) => {
                let environment = self.base().config().environment;
                ProcessOutcome::failure(format_error_response(&err, environment))
            }
        }
    }
}

/// Logs a fatal pipeline error through the agent's logger.
pub(crate) fn log_fatal(base: &AgentBase, error: &CoachError) {
    base.log(
        crate::observability::LogLevel::Error,
        &format!("Pipeline failed: {}", error.message()),
        error.details(),
    );
}
