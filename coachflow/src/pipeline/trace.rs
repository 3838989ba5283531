//! Per-invocation trace of stage outcomes.

use crate::errors::{CoachError, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured failure recorded against a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageIssue {
    /// Step the issue was raised in.
    pub step: String,
    /// Human-readable message.
    pub message: String,
    /// Failure classification.
    pub code: ErrorCode,
    /// Whether the issue halted the pipeline.
    pub critical: bool,
    /// Optional structured context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl StageIssue {
    /// Creates a non-critical issue.
    #[must_use]
    pub fn non_critical(step: impl Into<String>, message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            code,
            critical: false,
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Errors, warnings and reasoning accumulated by one pipeline run.
///
/// Every field only grows during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrace {
    /// Structured issues, critical and non-critical.
    pub errors: Vec<StageIssue>,
    /// Non-critical failures, as `"<label>: <message>"` lines.
    pub warnings: Vec<String>,
    /// Human-readable reasoning steps.
    pub reasoning: Vec<String>,
    /// Steps that finished successfully, in order.
    pub completed_stages: Vec<String>,
}

impl PipelineTrace {
    /// Creates an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a step as complete.
    pub fn complete(&mut self, step: &str) {
        self.completed_stages.push(step.to_string());
    }

    /// Returns whether a step completed.
    #[must_use]
    pub fn is_complete(&self, step: &str) -> bool {
        self.completed_stages.iter().any(|s| s == step)
    }

    /// Appends a reasoning line.
    pub fn reason(&mut self, line: impl Into<String>) {
        self.reasoning.push(line.into());
    }

    /// Appends a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(warning = %warning, "Pipeline warning");
        self.warnings.push(warning);
    }

    /// Records a structured issue.
    pub fn record_issue(&mut self, issue: StageIssue) {
        self.errors.push(issue);
    }

    /// Records the error that halted the pipeline.
    pub fn record_fatal(&mut self, error: &CoachError) {
        self.errors.push(StageIssue {
            step: error.step().unwrap_or("process").to_string(),
            message: error.message(),
            code: error.code().unwrap_or(ErrorCode::Processing),
            critical: true,
            details: error.details(),
        });
    }

    /// Returns true if a critical issue was recorded.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(|e| e.critical)
    }

    /// Returns the first critical issue, if any.
    #[must_use]
    pub fn fatal(&self) -> Option<&StageIssue> {
        self.errors.iter().find(|e| e.critical)
    }

    /// Folds a non-critical result into the trace.
    ///
    /// On failure the message lands in `warnings` as `"<label>: <message>"`
    /// and `None` is returned.
    pub fn absorb<T>(&mut self, label: &str, result: Result<T, CoachError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.warn(format!("{label}: {}", err.message()));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;

    #[test]
    fn test_absorb_ok_and_err() {
        let mut trace = PipelineTrace::new();

        let kept = trace.absorb("Memory retrieval failed", Ok::<_, CoachError>(3));
        assert_eq!(kept, Some(3));

        let dropped: Option<i32> = trace.absorb(
            "Memory retrieval failed",
            Err(AgentError::memory_system("store offline").into()),
        );
        assert!(dropped.is_none());
        assert_eq!(trace.warnings, vec!["Memory retrieval failed: store offline"]);
        assert!(trace.errors.is_empty());
    }

    #[test]
    fn test_record_fatal_uses_step_and_code() {
        let mut trace = PipelineTrace::new();
        let err: CoachError = AgentError::processing("boom").with_step("consideration").into();

        trace.record_fatal(&err);

        assert!(trace.has_fatal());
        let fatal = trace.fatal().unwrap();
        assert_eq!(fatal.step, "consideration");
        assert_eq!(fatal.code, ErrorCode::Processing);
    }

    #[test]
    fn test_non_critical_issue_is_not_fatal() {
        let mut trace = PipelineTrace::new();
        trace.record_issue(StageIssue::non_critical("reflection", "stale", ErrorCode::Validation));
        trace.complete("reflection");

        assert!(!trace.has_fatal());
        assert!(trace.is_complete("reflection"));
        assert!(!trace.is_complete("adjustment"));
    }
}
