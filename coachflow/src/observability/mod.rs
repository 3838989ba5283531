//! Observability utilities.

mod logger;
mod tracing;

pub use logger::{CollectingLogger, LogEntry, LogLevel, Logger, TracingLogger};
pub use tracing::{init_tracing, SpanTimer};
