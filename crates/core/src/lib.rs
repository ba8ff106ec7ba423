//! # pk-core
//!
//! Process execution engine for process-kit.
//!
//! This crate provides:
//! - A publish/subscribe primitive used for process and task events
//! - Persistence of process records (in memory or in sqlite)
//! - The task lifecycle protocol and built-in step kinds
//! - The process execution engine and its state machine
//! - A registry that creates and tracks process instances
//! - Configuration loading from the `.process-kit/` directory
//!
//! ## Modules
//!
//! - [`events`]: Event emitter
//! - [`store`]: Persistence contract and backends
//! - [`task`]: Task trait, task context and step shapes
//! - [`engine`]: Process execution engine
//! - [`state`]: State machine rules and the process registry
//! - [`builtin`]: Step kinds usable from configuration
//! - [`config`]: Configuration loading and management

pub mod builtin;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod state;
pub mod store;
pub mod task;

pub use engine::{EngineConfig, Process, ProcessDefinition, RunHandle, RunOutcome};
pub use error::{ProcessError, ProcessResult};
pub use events::{EventEmitter, SubscriptionId};
pub use state::ProcessManager;
pub use store::{ListQuery, MemoryStore, ProcessStore, StoreError, StoreResult, UpdateOutcome};
pub use task::{Capabilities, Step, StepContext, Task, TaskContext, TaskError};
