//! Common test utilities and helpers for integration tests.
//!
//! This module provides shared functionality across all integration tests:
//! - Test fixtures (stores, definitions, config directories)
//! - Event recording and custom assertions
//! - Test tasks with controllable timing and lifecycle hooks

pub mod assertions;
pub mod fixtures;
pub mod test_tasks;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use test_tasks::*;
