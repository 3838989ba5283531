//! # Coachflow
//!
//! Staged agent pipelines for a fitness-coaching backend.
//!
//! Each agent turns one user request into a validated artifact by running a
//! fixed sequence of stages, calling an LLM completion service where it
//! needs judgement:
//!
//! - **Plan adjustment**: free-text feedback to a revised workout plan
//! - **Nutrition**: a stored profile to calorie and macro targets
//! - **Workout generation**: preferences to a new weekly plan
//! - **Research**: a topic to a sourced summary
//!
//! Every agent shares the same discipline. A critical stage failure halts
//! the run with a structured [`CoachError`](errors::CoachError) tagged with
//! the failing step; a non-critical failure becomes a warning. Completion
//! calls retry transient failures with exponential backoff, and successful
//! runs leave a best-effort record in long-term memory.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coachflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = AgentConfig::from_env()?;
//! let ports = AgentPorts::new()
//!     .with_completion(Arc::new(OpenAiClient::from_env(config.completion.clone())?))
//!     .with_memory(Arc::new(InMemoryMemoryStore::new()));
//! let agent = PlanAdjustmentAgent::new(ports, config)?;
//!
//! let outcome = agent.safe_process(AdjustmentInput { plan, feedback, user_profile }).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod config;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::nutrition::{NutritionAgent, NutritionOutput, NutritionRequest};
    pub use crate::agents::plan_adjustment::{AdjustmentInput, AdjustmentOutput, PlanAdjustmentAgent};
    pub use crate::agents::research::{ResearchAgent, ResearchOutput, ResearchRequest};
    pub use crate::agents::workout::{WorkoutAgent, WorkoutOutput, WorkoutRequest};
    pub use crate::agents::{Agent, AgentBase, AgentRequirements, ProcessOutcome};
    pub use crate::config::{AgentConfig, Environment};
    pub use crate::domain::{NutritionGoal, NutritionPlan, UserProfile, WorkoutPlan};
    pub use crate::errors::{
        format_error_response, AgentError, ApiError, CoachError, ErrorCode, ErrorResponse,
    };
    pub use crate::memory::{InMemoryMemoryStore, MemoryMetadata, MemoryQuery, MemoryStore};
    pub use crate::observability::{init_tracing, LogLevel, Logger};
    pub use crate::pipeline::{retry_with_backoff, CancellationToken, RetryPolicy};
    pub use crate::ports::{AgentPorts, CompletionClient, Datastore, InMemoryDatastore};
    #[cfg(feature = "openai")]
    pub use crate::ports::OpenAiClient;
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
