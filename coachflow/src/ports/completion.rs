//! Completion-service capability.

use crate::errors::{AgentError, CoachError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions.
    System,
    /// End-user content.
    User,
    /// Model output.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call completion options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Temperature override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Max tokens override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the service for a JSON object.
    #[serde(default)]
    pub json_mode: bool,
}

impl CompletionOptions {
    /// Options requesting a JSON object response.
    #[must_use]
    pub fn json() -> Self {
        Self {
            json_mode: true,
            ..Self::default()
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Per-call embedding options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingOptions {
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// What the completion service returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Completion {
    /// Plain text.
    Text {
        /// The text.
        content: String,
    },
    /// A tool call with JSON arguments.
    ToolCall {
        /// Tool name.
        name: String,
        /// Parsed arguments.
        arguments: Value,
    },
}

impl Completion {
    /// Creates a text completion.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Returns the text, rendering a tool call's arguments as JSON.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text { content } => content,
            Self::ToolCall { arguments, .. } => arguments.to_string(),
        }
    }
}

/// Failure of a completion or embedding call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The service answered with a non-success status.
    #[error("Completion service returned {status}: {message}")]
    Upstream {
        /// HTTP status.
        status: u16,
        /// Response body or reason.
        message: String,
    },
    /// The response could not be interpreted.
    #[error("Malformed completion response: {0}")]
    Malformed(String),
    /// The request never produced a response.
    #[error("Completion transport failure: {0}")]
    Transport(String),
    /// The client could not be built from its settings.
    #[error("Completion client misconfigured: {0}")]
    Configuration(String),
}

impl CompletionError {
    /// Returns the upstream HTTP status, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Malformed(_) | Self::Transport(_) | Self::Configuration(_) => None,
        }
    }

    /// Returns true for failures worth retrying.
    ///
    /// Transport failures and upstream 408, 429 and 5xx are transient.
    /// Malformed responses and other 4xx are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Upstream { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Malformed(_) | Self::Configuration(_) => false,
        }
    }
}

/// Retry predicate for completion calls.
pub fn is_transient_completion_error(
    error: &CompletionError,
    _attempt: u32,
) -> Result<bool, CompletionError> {
    Ok(error.is_transient())
}

impl From<CompletionError> for CoachError {
    fn from(err: CompletionError) -> Self {
        if let CompletionError::Configuration(message) = &err {
            return AgentError::configuration(err.to_string())
                .with_detail("reason", message.as_str())
                .into();
        }
        let mut agent = AgentError::external_service(err.to_string());
        if let Some(status) = err.status() {
            agent = agent.with_detail("status", status);
        }
        agent.with_detail("retryable", err.is_transient()).into()
    }
}

/// An LLM completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generates a completion for the conversation.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, CompletionError>;

    /// Embeds each input string.
    async fn embed(
        &self,
        input: &[String],
        options: &EmbeddingOptions,
    ) -> Result<Vec<Vec<f32>>, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_transient_classification() {
        assert!(CompletionError::Transport("reset".into()).is_transient());
        assert!(CompletionError::Upstream { status: 429, message: String::new() }.is_transient());
        assert!(CompletionError::Upstream { status: 503, message: String::new() }.is_transient());
        assert!(CompletionError::Upstream { status: 408, message: String::new() }.is_transient());
        assert!(!CompletionError::Upstream { status: 400, message: String::new() }.is_transient());
        assert!(!CompletionError::Upstream { status: 401, message: String::new() }.is_transient());
        assert!(!CompletionError::Malformed("no choices".into()).is_transient());
        assert!(!CompletionError::Configuration("bad timeout".into()).is_transient());
    }

    #[test]
    fn test_into_coach_error_keeps_status() {
        let err: CoachError = CompletionError::Upstream {
            status: 503,
            message: "overloaded".into(),
        }
        .into();

        assert_eq!(err.code(), Some(ErrorCode::ExternalService));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.details().unwrap()["status"], json!(503));
    }

    #[test]
    fn test_completion_into_text() {
        assert_eq!(Completion::text("hi").into_text(), "hi");
        let call = Completion::ToolCall {
            name: "plan".into(),
            arguments: json!({"days": 3}),
        };
        assert_eq!(call.into_text(), r#"{"days":3}"#);
    }
}
