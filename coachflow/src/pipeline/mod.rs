//! Pipeline building blocks shared by every agent.
//!
//! - [`RetryPolicy`] and [`retry_with_backoff`] for completion calls
//! - [`StageRunner`] for ordered, cancellable stage execution
//! - [`PipelineTrace`] for the errors, warnings and reasoning of one run

mod cancellation;
mod retry;
mod runner;
mod trace;

pub use cancellation::CancellationToken;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use runner::{wrap_stage_error, StageRunner};
pub use trace::{PipelineTrace, StageIssue};
