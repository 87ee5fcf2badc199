//! Shared test utilities for invex integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a job manager to a real SQLite history and feed
//! - Builders for PDFs, images and scripted extraction clients

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
