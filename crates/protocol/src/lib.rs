//! # pk-protocol
//!
//! Core protocol definitions and data models for process-kit.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (TOML config, YAML process definitions)
//! - Persisted process records and their partial updates
//! - The event surface published by running processes
//!
//! ## Modules
//!
//! - [`config_models`]: Global configuration from config.toml
//! - [`definition_models`]: Process definitions and their steps
//! - [`process_models`]: Persisted process records, states and status
//! - [`ipc`]: Events published by running processes
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other process-kit crates

pub mod config_models;
pub mod definition_models;
pub mod ipc;
pub mod process_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use definition_models::*;
pub use ipc::*;
pub use process_models::*;
