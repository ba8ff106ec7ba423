//! Process state machine.
//!
//! Legal moves:
//!
//! ```text
//! start -> in-progress -> (pause <-> in-progress) -> done | cancel | error
//! ```
//!
//! The functions here validate a control operation against the current state
//! and persist transitions. State checks happen inside the store's conditional
//! update, never on a separately read record. They never emit events; the
//! engine does that once a transition has been written.

use crate::error::{ProcessError, ProcessResult};
use crate::store::{ProcessStore, StoreResult, UpdateOutcome};
use pk_protocol::process_models::{ProcessRecord, ProcessState, RecordPatch};
use std::fmt;
use uuid::Uuid;

/// A control operation requested from outside the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pause,
    Resume,
    Cancel,
}

impl Operation {
    /// States from which this operation is legal.
    pub fn allowed_from(self) -> &'static [ProcessState] {
        match self {
            Operation::Pause => &[ProcessState::InProgress],
            Operation::Resume => &[ProcessState::Pause],
            Operation::Cancel => &[
                ProcessState::Start,
                ProcessState::InProgress,
                ProcessState::Pause,
            ],
        }
    }

    /// The state this operation moves the process to.
    pub fn target(self) -> ProcessState {
        match self {
            Operation::Pause => ProcessState::Pause,
            Operation::Resume => ProcessState::InProgress,
            Operation::Cancel => ProcessState::Cancel,
        }
    }

    pub(crate) fn allowed_display(self) -> String {
        self.allowed_from()
            .iter()
            .map(|state| format!("\"{state}\""))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Cancel => "cancel",
        })
    }
}

/// Reject `operation` unless `current` allows it.
pub fn check_transition(operation: Operation, current: ProcessState) -> ProcessResult<()> {
    if operation.allowed_from().contains(&current) {
        Ok(())
    } else {
        Err(ProcessError::InvalidState {
            operation,
            actual: current,
        })
    }
}

/// Validate `operation` against the stored record and persist its target
/// state.
pub async fn apply_operation(
    store: &dyn ProcessStore,
    id: Uuid,
    operation: Operation,
) -> ProcessResult<ProcessRecord> {
    match transition(store, id, operation.allowed_from(), operation.target()).await? {
        UpdateOutcome::Applied(record) => Ok(record),
        UpdateOutcome::Rejected(record) => Err(ProcessError::InvalidState {
            operation,
            actual: record.state,
        }),
    }
}

/// Move to `to` only if the stored state is one of `from`.
pub async fn transition(
    store: &dyn ProcessStore,
    id: Uuid,
    from: &[ProcessState],
    to: ProcessState,
) -> StoreResult<UpdateOutcome> {
    store.update_if(id, from, RecordPatch::state(to)).await
}

pub async fn set_state(
    store: &dyn ProcessStore,
    id: Uuid,
    state: ProcessState,
) -> StoreResult<ProcessRecord> {
    store.update(id, RecordPatch::state(state)).await
}

pub async fn set_step(store: &dyn ProcessStore, id: Uuid, step: usize) -> StoreResult<ProcessRecord> {
    store.update(id, RecordPatch::step(step)).await
}
