//! Shared test utilities for agent-reconciler integration tests.
//!
//! This module provides:
//! - `FakeHost`, an in-memory `AgentHost` that records every call
//! - `TestHarness` with a temporary charm directory and rule templates
//! - Builders for relation snapshots

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{Failure, FakeHost, TestHarness};
