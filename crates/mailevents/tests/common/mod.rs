//! Shared test utilities for mailevents integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a processor to an in-memory database, a scripted
//!   fake mailbox and a recording event service
//! - Builders for mailbox messages and configurations

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FakeMailbox, RecordingEventService, TestHarness};
