//! Logger collaborator injected into agents.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Degraded but continuing.
    Warn,
    /// Failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Sink for agent log lines.
///
/// Implementations must never fail; a logger that cannot write drops the
/// entry.
pub trait Logger: Send + Sync {
    /// Records one entry.
    fn log(&self, level: LogLevel, agent: &str, message: &str, meta: Option<&Value>);
}

/// Logger that forwards to the `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, agent: &str, message: &str, meta: Option<&Value>) {
        match level {
            LogLevel::Debug => tracing::debug!(agent, meta = ?meta, "{}", message),
            LogLevel::Info => tracing::info!(agent, meta = ?meta, "{}", message),
            LogLevel::Warn => tracing::warn!(agent, meta = ?meta, "{}", message),
            LogLevel::Error => tracing::error!(agent, meta = ?meta, "{}", message),
        }
    }
}

/// A recorded log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Agent that logged.
    pub agent: String,
    /// Message text.
    pub message: String,
    /// Structured metadata.
    pub meta: Option<Value>,
}

/// A collecting logger for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    entries: RwLock<Vec<LogEntry>>,
}

impl CollectingLogger {
    /// Creates an empty collecting logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected entries.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().clone()
    }

    /// Returns entries at the given level.
    #[must_use]
    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Returns true if any entry's message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.read().iter().any(|e| e.message.contains(needle))
    }

    /// Clears collected entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Logger for CollectingLogger {
    fn log(&self, level: LogLevel, agent: &str, message: &str, meta: Option<&Value>) {
        self.entries.write().push(LogEntry {
            level,
            agent: agent.to_string(),
            message: message.to_string(),
            meta: meta.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collecting_logger() {
        let logger = CollectingLogger::new();
        logger.log(LogLevel::Info, "nutrition", "Stage started", None);
        logger.log(LogLevel::Warn, "nutrition", "Memory retrieval failed", Some(&json!({"k": 1})));

        assert_eq!(logger.entries().len(), 2);
        assert_eq!(logger.at_level(LogLevel::Warn).len(), 1);
        assert!(logger.contains("retrieval"));

        logger.clear();
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn test_tracing_logger_does_not_panic() {
        TracingLogger.log(LogLevel::Error, "research", "boom", None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Error);
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }
}
