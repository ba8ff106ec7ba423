//! State management for processes.
//!
//! This module provides:
//! - Process state machine rules and persisted transitions
//! - ProcessManager for registering definitions and tracking instances

pub mod manager;
pub mod process;

pub use manager::ProcessManager;
