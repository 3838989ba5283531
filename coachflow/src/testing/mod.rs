//! Testing utilities for coachflow agents.
//!
//! This module provides:
//! - Scripted completion clients and failing collaborators
//! - Profile and plan fixtures
//! - Assertions for agent errors and outcomes

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_error_code, assert_failed_at, assert_outcome_failed, assert_outcome_succeeded};
pub use fixtures::{sample_plan, sample_profile, SAMPLE_PLAN_ID, SAMPLE_USER_ID};
pub use mocks::{FailingDatastore, FailingMemoryStore, ScriptedCompletionClient};
