//! Shared test utilities for convtrack integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an engine to a manual clock and an event recorder
//! - Builder patterns for creating engine configurations programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
