//! Cancellation token checked between pipeline stages.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

/// A token for cooperative cancellation.
///
/// Clones share state, so a controller can keep one clone and hand the other
/// to a running pipeline. Cancellation is idempotent; the first reason wins.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .state
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.state.reason.write() = Some(reason.into());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.reason.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel("client disconnected");
        token.cancel("timeout");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("client disconnected".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let handle = token.clone();

        handle.cancel("stop");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_runner_stops_after_cancel() {
        use crate::errors::ErrorCode;
        use crate::observability::CollectingLogger;
        use crate::pipeline::StageRunner;
        use tokio_test::{assert_err, assert_ok, block_on};

        let logger = CollectingLogger::new();
        let token = CancellationToken::new();
        let runner = StageRunner::new("research", &logger, &token);

        assert_ok!(block_on(runner.critical("planQueries", ErrorCode::Validation, async { Ok(()) })));
        token.cancel("shutdown");
        let err = assert_err!(block_on(runner.non_critical("synthesis", async { Ok(()) })));

        assert_eq!(err.step(), Some("synthesis"));
        assert!(logger.contains("Pipeline cancelled before synthesis"));
    }
}
