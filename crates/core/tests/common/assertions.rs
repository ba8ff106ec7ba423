//! Event recording and custom assertion helpers.

use parking_lot::Mutex;
use pk_core::engine::Process;
use pk_protocol::ipc::{names, ProcessEvent};
use std::sync::Arc;

/// Records every event a process publishes, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<(String, ProcessEvent)>>>,
}

#[allow(dead_code)]
impl EventLog {
    /// Subscribe a new log to every event of `process`.
    pub fn attach(process: &Process) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        process.events().on_any(move |name, event| {
            sink.lock().push((name.to_string(), event.clone()));
        });
        log
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn events(&self) -> Vec<ProcessEvent> {
        self.events.lock().iter().map(|(_, event)| event.clone()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|(n, _)| n == name).count()
    }

    /// The last event published under `name`.
    pub fn last(&self, name: &str) -> Option<ProcessEvent> {
        self.events
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, event)| event.clone())
    }
}

/// Assert that `task/before` and `task` strictly alternate, `steps` times each.
#[allow(dead_code)]
pub fn assert_alternating_steps(log: &EventLog, steps: usize) {
    let sequence: Vec<String> = log
        .names()
        .into_iter()
        .filter(|name| name == names::TASK_BEFORE || name == names::TASK)
        .collect();

    assert_eq!(
        sequence.len(),
        steps * 2,
        "Expected {steps} before/task pairs, got {sequence:?}"
    );
    for pair in sequence.chunks(2) {
        assert_eq!(pair[0], names::TASK_BEFORE, "Sequence out of order: {sequence:?}");
        assert_eq!(pair[1], names::TASK, "Sequence out of order: {sequence:?}");
    }
}

/// Assert that the log starts with `start` and ends with `done`, each once.
#[allow(dead_code)]
pub fn assert_started_and_done(log: &EventLog) {
    let names = log.names();
    assert_eq!(names.first().map(String::as_str), Some(names::START), "{names:?}");
    assert_eq!(names.last().map(String::as_str), Some(names::DONE), "{names:?}");
    assert_eq!(log.count(names::START), 1);
    assert_eq!(log.count(names::DONE), 1);
}
