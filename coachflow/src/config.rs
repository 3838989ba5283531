//! Agent configuration.
//!
//! Every field has a serde default so partial configuration files
//! deserialize cleanly. [`AgentConfig::from_env`] layers `COACHFLOW_*`
//! environment variables over the defaults.

use crate::errors::{AgentError, CoachError};
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// The configuration key.
        key: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<ConfigError> for CoachError {
    fn from(err: ConfigError) -> Self {
        let key = match &err {
            ConfigError::InvalidValue { key, .. } => key.clone(),
        };
        AgentError::configuration(err.to_string())
            .with_detail("key", key)
            .into()
    }
}

/// Deployment environment; controls how much error detail leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Full diagnostics in error responses.
    Development,
    /// Test runs.
    Test,
    /// Non-operational errors are masked.
    #[default]
    Production,
}

impl Environment {
    /// Returns true in production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns true in development.
    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Settings for the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// Chat model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout() -> f64 {
    60.0
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl CompletionSettings {
    /// Gets the timeout as a Duration.
    ///
    /// Fails for negative, non-finite or out-of-range values.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.timeout_seconds).map_err(|e| ConfigError::InvalidValue {
            key: "timeout_seconds".to_string(),
            value: self.timeout_seconds.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Settings for long-term memory integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    /// Whether agents read and write memories at all.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    /// How many past records to pull into context.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
    /// Importance assigned to records that do not set one.
    #[serde(default = "default_importance")]
    pub default_importance: f32,
}

fn default_memory_enabled() -> bool {
    true
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_importance() -> f32 {
    0.5
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            retrieval_limit: default_retrieval_limit(),
            default_importance: default_importance(),
        }
    }
}

/// Configuration shared by every agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,
    /// Retry policy for completion-service calls.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Completion-service settings.
    #[serde(default)]
    pub completion: CompletionSettings,
    /// Memory settings.
    #[serde(default)]
    pub memory: MemorySettings,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl AgentConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the completion model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.completion.model = model.into();
        self
    }

    /// Enables or disables memory integration.
    #[must_use]
    pub fn with_memory_enabled(mut self, enabled: bool) -> Self {
        self.memory.enabled = enabled;
        self
    }

    /// Loads configuration from `COACHFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = parse_var::<Environment, _>(&lookup, "COACHFLOW_ENV")? {
            config.environment = env;
        }
        if let Some(format) = parse_var::<LogFormat, _>(&lookup, "COACHFLOW_LOG_FORMAT")? {
            config.log_format = format;
        }
        if let Some(model) = lookup("COACHFLOW_MODEL") {
            config.completion.model = model;
        }
        if let Some(url) = lookup("COACHFLOW_COMPLETION_BASE_URL") {
            config.completion.base_url = url;
        }
        if let Some(seconds) = parse_var::<f64, _>(&lookup, "COACHFLOW_COMPLETION_TIMEOUT_SECONDS")? {
            Duration::try_from_secs_f64(seconds).map_err(|e| ConfigError::InvalidValue {
                key: "COACHFLOW_COMPLETION_TIMEOUT_SECONDS".to_string(),
                value: seconds.to_string(),
                reason: e.to_string(),
            })?;
            config.completion.timeout_seconds = seconds;
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, "COACHFLOW_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(delay) = parse_var::<u64, _>(&lookup, "COACHFLOW_INITIAL_DELAY_MS")? {
            config.retry.initial_delay_ms = delay;
        }
        if let Some(factor) = parse_var::<f64, _>(&lookup, "COACHFLOW_BACKOFF_FACTOR")? {
            if factor < 1.0 {
                return Err(ConfigError::InvalidValue {
                    key: "COACHFLOW_BACKOFF_FACTOR".to_string(),
                    value: factor.to_string(),
                    reason: "backoff factor must be at least 1.0".to_string(),
                });
            }
            config.retry.backoff_factor = factor;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert!((config.retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(config.memory.enabled);
        assert_eq!(config.completion.model, "gpt-4o-mini");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = AgentConfig::from_lookup(lookup_from(&[
            ("COACHFLOW_ENV", "dev"),
            ("COACHFLOW_MAX_RETRIES", "5"),
            ("COACHFLOW_INITIAL_DELAY_MS", "250"),
            ("COACHFLOW_MODEL", "coach-large"),
            ("COACHFLOW_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.completion.model, "coach-large");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = AgentConfig::from_lookup(lookup_from(&[("COACHFLOW_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("COACHFLOW_MAX_RETRIES"));

        let err = AgentConfig::from_lookup(lookup_from(&[("COACHFLOW_BACKOFF_FACTOR", "0.5")]))
            .unwrap_err();
        let coach: CoachError = err.into();
        assert_eq!(coach.code(), Some(ErrorCode::Configuration));
    }

    #[test]
    fn test_completion_timeout_must_be_a_valid_duration() {
        let config = AgentConfig::from_lookup(lookup_from(&[("COACHFLOW_COMPLETION_TIMEOUT_SECONDS", "2.5")]))
            .unwrap();
        assert_eq!(config.completion.timeout().unwrap(), Duration::from_millis(2500));

        for raw in ["-1", "NaN", "inf"] {
            let err = AgentConfig::from_lookup(lookup_from(&[("COACHFLOW_COMPLETION_TIMEOUT_SECONDS", raw)]))
                .unwrap_err();
            assert!(err.to_string().contains("COACHFLOW_COMPLETION_TIMEOUT_SECONDS"), "{raw}: {err}");
        }

        let settings = CompletionSettings {
            timeout_seconds: f64::NAN,
            ..CompletionSettings::default()
        };
        assert!(settings.timeout().is_err());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"environment": "test", "retry": {"max_retries": 1}}"#).unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.memory.retrieval_limit, 5);
    }
}
