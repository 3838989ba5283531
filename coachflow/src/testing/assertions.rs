//! Assertions for agent errors and outcomes.

use crate::agents::ProcessOutcome;
use crate::errors::{CoachError, ErrorCode};

/// Asserts that the error carries `expected` as its agent code.
pub fn assert_error_code(error: &CoachError, expected: ErrorCode) {
    assert_eq!(
        error.code(),
        Some(expected),
        "Expected code {expected:?}, got {:?} ({})",
        error.code(),
        error.message()
    );
}

/// Asserts that the error was raised by stage `step` with code `expected`.
pub fn assert_failed_at(error: &CoachError, step: &str, expected: ErrorCode) {
    assert_error_code(error, expected);
    assert_eq!(
        error.step(),
        Some(step),
        "Expected failure at step '{step}', got {:?}",
        error.step()
    );
}

/// Asserts that a safe-process outcome succeeded.
pub fn assert_outcome_succeeded<T: std::fmt::Debug>(outcome: &ProcessOutcome<T>) {
    assert!(
        outcome.success && outcome.data.is_some(),
        "Expected success, got error: {:?}",
        outcome.error
    );
}

/// Asserts that a safe-process outcome failed with the given wire code.
pub fn assert_outcome_failed<T: std::fmt::Debug>(outcome: &ProcessOutcome<T>, error_code: &str) {
    assert!(!outcome.success, "Expected failure, got data: {:?}", outcome.data);
    let code = outcome.error.as_ref().and_then(|e| e.error_code.as_deref());
    assert_eq!(code, Some(error_code), "Unexpected error: {:?}", outcome.error);
}
