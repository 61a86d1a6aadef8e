//! Shared test utilities for linkedagent integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated engine with its own credential file
//! - Builders for settings and URL lists

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
