//! Stage execution with cancellation, timing and error wrapping.

use super::CancellationToken;
use crate::errors::{AgentError, CoachError, ErrorCode};
use crate::observability::{LogLevel, Logger, SpanTimer};
use serde_json::json;
use std::future::Future;
use tracing::Instrument;

/// Runs the stages of one pipeline invocation.
pub struct StageRunner<'a> {
    agent: &'a str,
    logger: &'a dyn Logger,
    cancel: &'a CancellationToken,
}

impl std::fmt::Debug for StageRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("agent", &self.agent)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<'a> StageRunner<'a> {
    /// Creates a runner for `agent`.
    #[must_use]
    pub fn new(agent: &'a str, logger: &'a dyn Logger, cancel: &'a CancellationToken) -> Self {
        Self {
            agent,
            logger,
            cancel,
        }
    }

    /// Fails if cancellation was requested before `step`.
    pub fn check_cancelled(&self, step: &str) -> Result<(), CoachError> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        let reason = self.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
        self.logger.log(
            LogLevel::Warn,
            self.agent,
            &format!("Pipeline cancelled before {step}"),
            Some(&json!({ "reason": reason })),
        );
        Err(AgentError::processing(format!("Pipeline cancelled before {step}: {reason}"))
            .with_step(step)
            .with_detail("cancelled", true)
            .into())
    }

    /// Runs a stage whose failure halts the pipeline.
    ///
    /// Errors come back wrapped with `code` and `step`; see
    /// [`wrap_stage_error`].
    pub async fn critical<T, Fut>(
        &self,
        step: &'static str,
        code: ErrorCode,
        stage: Fut,
    ) -> Result<T, CoachError>
    where
        Fut: Future<Output = Result<T, CoachError>>,
    {
        self.check_cancelled(step)?;
        match self.execute(step, stage).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let wrapped = wrap_stage_error(step, code, err);
                self.logger.log(
                    LogLevel::Error,
                    self.agent,
                    &format!("Stage {step} failed: {}", wrapped.message()),
                    wrapped.details().as_ref(),
                );
                Err(wrapped)
            }
        }
    }

    /// Tags a rejection the stage raised itself with `step`.
    ///
    /// Precondition checks and lookups that come back empty go through here
    /// instead of [`critical`](Self::critical), so the error keeps its own
    /// code and message. Cancellation is not checked.
    pub fn guard<T>(&self, step: &'static str, check: Result<T, CoachError>) -> Result<T, CoachError> {
        check.map_err(|err| {
            let tagged: CoachError = match err {
                CoachError::Agent(agent) => agent.with_step(step).into(),
                other => wrap_stage_error(step, ErrorCode::Validation, other),
            };
            self.logger.log(
                LogLevel::Error,
                self.agent,
                &format!("Stage {step} rejected: {}", tagged.message()),
                tagged.details().as_ref(),
            );
            tagged
        })
    }

    /// Runs a stage whose failure the caller folds into warnings.
    ///
    /// The error is returned unwrapped so its message reaches the warning
    /// verbatim. Cancellation still fails the call.
    pub async fn non_critical<T, Fut>(&self, step: &'static str, stage: Fut) -> Result<T, CoachError>
    where
        Fut: Future<Output = Result<T, CoachError>>,
    {
        self.check_cancelled(step)?;
        let result = self.execute(step, stage).await;
        if let Err(err) = &result {
            self.logger.log(
                LogLevel::Warn,
                self.agent,
                &format!("Non-critical stage {step} failed: {}", err.message()),
                None,
            );
        }
        result
    }

    async fn execute<T, Fut>(&self, step: &'static str, stage: Fut) -> Result<T, CoachError>
    where
        Fut: Future<Output = Result<T, CoachError>>,
    {
        let timer = SpanTimer::start(step);
        self.logger
            .log(LogLevel::Debug, self.agent, &format!("Stage {step} started"), None);

        let span = tracing::info_span!("stage", agent = self.agent, step);
        let result = stage.instrument(span).await;

        let duration_ms = timer.finish();
        if result.is_ok() {
            self.logger.log(
                LogLevel::Info,
                self.agent,
                &format!("Stage {step} completed"),
                Some(&json!({ "duration_ms": duration_ms })),
            );
        }
        result
    }
}

/// Wraps a fatal stage failure.
///
/// The result always carries the stage's declared `code` and the `step`
/// detail, whatever the inner error's code, and keeps `error` as its cause.
#[must_use]
pub fn wrap_stage_error(step: &str, code: ErrorCode, error: CoachError) -> CoachError {
    AgentError::new(format!("{step} failed: {}", error.message()), code)
        .with_step(step)
        .caused_by(error)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::CollectingLogger;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_critical_success_logs_completion() {
        let logger = CollectingLogger::new();
        let cancel = CancellationToken::new();
        let runner = StageRunner::new("workout", &logger, &cancel);

        let value = runner
            .critical("planGeneration", ErrorCode::Processing, async { Ok(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(logger.contains("Stage planGeneration completed"));
    }

    #[tokio::test]
    async fn test_critical_failure_is_wrapped() {
        let logger = CollectingLogger::new();
        let cancel = CancellationToken::new();
        let runner = StageRunner::new("nutrition", &logger, &cancel);

        let err = runner
            .critical::<(), _>("generateExplanation", ErrorCode::ExternalService, async {
                Err(anyhow::anyhow!("socket closed").into())
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::ExternalService));
        assert_eq!(err.step(), Some("generateExplanation"));
        assert_eq!(err.original_error().unwrap().message(), "socket closed");
        assert_eq!(logger.at_level(LogLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_inner_validation_error_takes_stage_code() {
        let logger = CollectingLogger::new();
        let cancel = CancellationToken::new();
        let runner = StageRunner::new("plan_adjustment", &logger, &cancel);

        let err = runner
            .critical::<(), _>("initialUnderstanding", ErrorCode::Processing, async {
                Err(AgentError::validation("ambiguous feedback").into())
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Processing));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "initialUnderstanding failed: ambiguous feedback");
        assert_eq!(err.step(), Some("initialUnderstanding"));
        assert_eq!(err.original_error().unwrap().code(), Some(ErrorCode::Validation));
    }

    #[test]
    fn test_guard_keeps_own_code_and_tags_step() {
        let logger = CollectingLogger::new();
        let cancel = CancellationToken::new();
        let runner = StageRunner::new("nutrition", &logger, &cancel);

        let err = runner
            .guard::<()>("fetchUserData", Err(AgentError::resource("User profile not found").into()))
            .unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Resource));
        assert_eq!(err.message(), "User profile not found");
        assert_eq!(err.step(), Some("fetchUserData"));
        assert_eq!(logger.at_level(LogLevel::Error).len(), 1);
        assert_eq!(runner.guard("fetchUserData", Ok(3)).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_runner_skips_stage() {
        let logger = CollectingLogger::new();
        let cancel = CancellationToken::new();
        cancel.cancel("client went away");
        let runner = StageRunner::new("research", &logger, &cancel);

        let mut ran = false;
        let err = runner
            .critical("synthesis", ErrorCode::Processing, async {
                ran = true;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(!ran);
        assert_eq!(err.step(), Some("synthesis"));
        let details = err.details().unwrap();
        assert_eq!(details["cancelled"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_non_critical_returns_raw_error() {
        let logger = CollectingLogger::new();
        let cancel = CancellationToken::new();
        let runner = StageRunner::new("research", &logger, &cancel);

        let err = runner
            .non_critical::<(), _>("validateInsights", async {
                Err(AgentError::validation("no sources").into())
            })
            .await
            .unwrap_err();

        assert_eq!(err.message(), "no sources");
        assert!(err.step().is_none());
        assert_eq!(logger.at_level(LogLevel::Warn).len(), 1);
    }
}
