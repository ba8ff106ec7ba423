//! Event surface of a running process.
//!
//! Every process instance publishes its lifecycle through named events. The
//! names are the keys listeners subscribe to; [`ProcessEvent`] is the payload
//! delivered with them.
//!
//! | event         | payload                                  |
//! |---------------|------------------------------------------|
//! | `start`       | record                                   |
//! | `task/before` | record                                   |
//! | `task/<name>` | arguments emitted by the task            |
//! | `task`        | record (+ step index for task steps)     |
//! | `pause`       | record                                   |
//! | `resume`      | record                                   |
//! | `cancel`      | record                                   |
//! | `error`       | error message + record                   |
//! | `done`        | nothing                                  |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::process_models::ProcessRecord;

/// Arguments carried by an event emitted from inside a task.
pub type EventArgs = Vec<Value>;

/// Well-known event names.
pub mod names {
    pub const START: &str = "start";
    pub const TASK_BEFORE: &str = "task/before";
    pub const TASK: &str = "task";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const CANCEL: &str = "cancel";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";

    /// Prefix under which task-level events are rebroadcast.
    pub const TASK_PREFIX: &str = "task/";

    /// Subscription key that receives every event.
    pub const ANY: &str = "*";

    /// The process-level name of an event emitted by a task.
    pub fn task_event(name: &str) -> String {
        format!("{TASK_PREFIX}{name}")
    }
}

/// Payload of an event emitted by a process.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "task",
///   "payload": {
///     "record": { "id": "uuid-here", "step": 2, "state": "in-progress", ... },
///     "step": 1
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ProcessEvent {
    /// The first step is about to begin.
    Start { record: ProcessRecord },

    /// A step's task is about to execute.
    TaskBefore { record: ProcessRecord },

    /// A task emitted one of its own events.
    ///
    /// Published under `task/<name>` with the arguments unchanged.
    TaskEvent {
        name: String,
        #[ts(type = "Array<unknown>")]
        args: EventArgs,
    },

    /// A step completed successfully.
    ///
    /// `step` is the index of the completed step for task-shaped steps and
    /// `None` for function steps.
    Task {
        record: ProcessRecord,
        step: Option<usize>,
    },

    /// The process was paused.
    Pause { record: ProcessRecord },

    /// The process was resumed.
    Resume { record: ProcessRecord },

    /// The process was cancelled.
    Cancel { record: ProcessRecord },

    /// A step failed.
    Error { error: String, record: ProcessRecord },

    /// Every step completed.
    Done,
}

impl ProcessEvent {
    /// The name this event is published under.
    pub fn name(&self) -> String {
        match self {
            ProcessEvent::Start { .. } => names::START.to_string(),
            ProcessEvent::TaskBefore { .. } => names::TASK_BEFORE.to_string(),
            ProcessEvent::TaskEvent { name, .. } => names::task_event(name),
            ProcessEvent::Task { .. } => names::TASK.to_string(),
            ProcessEvent::Pause { .. } => names::PAUSE.to_string(),
            ProcessEvent::Resume { .. } => names::RESUME.to_string(),
            ProcessEvent::Cancel { .. } => names::CANCEL.to_string(),
            ProcessEvent::Error { .. } => names::ERROR.to_string(),
            ProcessEvent::Done => names::DONE.to_string(),
        }
    }

    /// The record snapshot carried by this event, if any.
    pub fn record(&self) -> Option<&ProcessRecord> {
        match self {
            ProcessEvent::Start { record }
            | ProcessEvent::TaskBefore { record }
            | ProcessEvent::Task { record, .. }
            | ProcessEvent::Pause { record }
            | ProcessEvent::Resume { record }
            | ProcessEvent::Cancel { record }
            | ProcessEvent::Error { record, .. } => Some(record),
            ProcessEvent::TaskEvent { .. } | ProcessEvent::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_models::Vars;
    use uuid::Uuid;

    #[test]
    fn test_event_names() {
        let record = ProcessRecord::new(Uuid::new_v4(), "aries", "wizard", Vars::new());

        assert_eq!(ProcessEvent::Start { record: record.clone() }.name(), "start");
        assert_eq!(
            ProcessEvent::TaskBefore { record: record.clone() }.name(),
            "task/before"
        );
        assert_eq!(
            ProcessEvent::TaskEvent {
                name: "progress".to_string(),
                args: vec![],
            }
            .name(),
            "task/progress"
        );
        assert_eq!(
            ProcessEvent::Error {
                error: "boom".to_string(),
                record,
            }
            .name(),
            "error"
        );
        assert_eq!(ProcessEvent::Done.name(), "done");
    }

    #[test]
    fn test_record_accessor() {
        let record = ProcessRecord::new(Uuid::new_v4(), "aries", "wizard", Vars::new());
        let event = ProcessEvent::Task {
            record: record.clone(),
            step: Some(0),
        };
        assert_eq!(event.record(), Some(&record));
        assert_eq!(ProcessEvent::Done.record(), None);
    }
}
