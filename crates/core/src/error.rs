//! Errors surfaced by processes and the registry.

use crate::state::process::Operation;
use crate::store::StoreError;
use crate::task::TaskError;
use pk_protocol::process_models::ProcessState;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ProcessError {
    /// A control operation was called in a state that does not allow it.
    #[error("You can {operation} a process only with state {}, it is \"{actual}\"", .operation.allowed_display())]
    InvalidState {
        operation: Operation,
        actual: ProcessState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A step kind in a process definition could not be resolved.
    #[error("Unknown task shape \"{kind}\" in process \"{process}\"")]
    UnknownTaskShape { process: String, kind: String },

    /// A configured step is missing a parameter or has one of the wrong type.
    #[error("Invalid parameters for step \"{kind}\": {reason}")]
    InvalidStep { kind: String, reason: String },

    /// A step failed.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// No definition is registered under this name.
    #[error("Unknown process type \"{0}\"")]
    UnknownProcess(String),

    /// A restored record belongs to another definition.
    #[error("Process {id} is of type \"{found}\", not \"{expected}\"")]
    TypeMismatch {
        id: Uuid,
        expected: String,
        found: String,
    },

    /// The registry holds no active process with this id.
    #[error("Process {0} is not active")]
    NotActive(Uuid),

    /// `run` was called while the run loop was already going.
    #[error("Process {0} is already running")]
    AlreadyRunning(Uuid),

    /// The run loop panicked or was aborted.
    #[error("Run loop aborted: {0}")]
    Aborted(String),
}

/// Type alias for Result with ProcessError.
pub type ProcessResult<T> = Result<T, ProcessError>;
