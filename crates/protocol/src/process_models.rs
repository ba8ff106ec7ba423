//! Persisted process state models.
//!
//! This module defines the record that backs every process instance, the
//! partial update applied to it, and the status view derived from it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

/// Process-scoped variables stored alongside a record.
pub type Vars = Map<String, Value>;

/// Represents the lifecycle state of a process.
///
/// The state progresses through these values during normal execution:
/// Start -> InProgress -> Done
///
/// Special states:
/// - Pause: execution is suspended at a step boundary until resumed
/// - Cancel: execution was cancelled by the user
/// - Error: a step failed; the process never resumes by itself
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    /// Record has been created but no step has run yet.
    Start,

    /// Process is actively executing its steps.
    InProgress,

    /// Process has been paused and waits for `resume`.
    Pause,

    /// Process has been cancelled.
    Cancel,

    /// A step failed.
    Error,

    /// Every step completed successfully.
    Done,
}

impl ProcessState {
    /// All states, in lifecycle order.
    pub const ALL: [ProcessState; 6] = [
        ProcessState::Start,
        ProcessState::InProgress,
        ProcessState::Pause,
        ProcessState::Cancel,
        ProcessState::Error,
        ProcessState::Done,
    ];

    /// Is this a terminal state (no further forward progress)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Done | ProcessState::Cancel | ProcessState::Error
        )
    }

    /// Can a process in this state be cancelled?
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            ProcessState::Start | ProcessState::InProgress | ProcessState::Pause
        )
    }

    /// The wire name of this state, as used by the event surface.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Start => "start",
            ProcessState::InProgress => "in-progress",
            ProcessState::Pause => "pause",
            ProcessState::Cancel => "cancel",
            ProcessState::Error => "error",
            ProcessState::Done => "done",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown process state: {s}"))
    }
}

/// The persisted record of a single process instance.
///
/// One record exists per process instance. The engine re-reads it before every
/// transition decision, so it is the single source of truth for `step` and
/// `state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ProcessRecord {
    /// Unique identifier of the process instance.
    ///
    /// Generated when the record is created and immutable afterwards.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Owner of the process, used for filtering listings.
    pub user_id: String,

    /// Name under which the process definition was registered.
    pub process_type: String,

    /// Zero-based index of the next step to run.
    ///
    /// Equals the number of steps once the process is done.
    pub step: usize,

    /// Current lifecycle state.
    pub state: ProcessState,

    /// Process-scoped variables. Updates are merged key by key.
    #[ts(type = "Record<string, unknown>")]
    pub vars: Vars,
}

impl ProcessRecord {
    /// Create a fresh record in the `Start` state at step 0.
    pub fn new(id: Uuid, user_id: impl Into<String>, process_type: impl Into<String>, vars: Vars) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            process_type: process_type.into(),
            step: 0,
            state: ProcessState::Start,
            vars,
        }
    }

    /// Apply a partial update in place.
    ///
    /// `step` and `state` are replaced when present; `vars` is shallow-merged
    /// so keys missing from the patch are kept.
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(step) = patch.step {
            self.step = step;
        }
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(vars) = patch.vars {
            for (key, value) in vars {
                self.vars.insert(key, value);
            }
        }
    }

    /// The status view of this record.
    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            process_type: self.process_type.clone(),
            step: self.step,
            state: self.state,
        }
    }
}

/// A partial update of a [`ProcessRecord`].
///
/// Absent fields are left untouched by the store.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ProcessState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "Record<string, unknown> | null")]
    pub vars: Option<Vars>,
}

impl RecordPatch {
    pub fn step(step: usize) -> Self {
        Self {
            step: Some(step),
            ..Self::default()
        }
    }

    pub fn state(state: ProcessState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn vars(vars: Vars) -> Self {
        Self {
            vars: Some(vars),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.step.is_none() && self.state.is_none() && self.vars.is_none()
    }
}

/// Snapshot of where a process stands, read fresh from the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ProcessStatus {
    /// Name of the registered process definition.
    pub process_type: String,

    /// Index of the next step to run.
    pub step: usize,

    /// Current lifecycle state.
    pub state: ProcessState,
}
