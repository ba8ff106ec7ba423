//! Test tasks with controllable timing and lifecycle hooks.

use async_trait::async_trait;
use pk_core::task::{Capabilities, Step, Task, TaskContext, TaskError};
use pk_protocol::ipc::EventArgs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// A task that completes immediately.
#[allow(dead_code)]
pub fn ok_step(name: &str) -> Step {
    Step::task(name.to_string(), |_ctx| OkTask)
}

/// A task that fails with `message`.
#[allow(dead_code)]
pub fn failing_step(name: &str, message: &str) -> Step {
    let message = message.to_string();
    Step::task(name.to_string(), move |_ctx| FailingTask {
        message: message.clone(),
    })
}

/// A task that emits one event, then completes.
#[allow(dead_code)]
pub fn emitting_step(name: &str, event: &str, args: EventArgs) -> Step {
    let event = event.to_string();
    Step::task(name.to_string(), move |ctx| EmittingTask {
        ctx,
        event: event.clone(),
        args: args.clone(),
    })
}

pub struct OkTask;

#[async_trait]
impl Task for OkTask {
    async fn run(&self) -> Result<(), TaskError> {
        Ok(())
    }
}

pub struct FailingTask {
    message: String,
}

#[async_trait]
impl Task for FailingTask {
    async fn run(&self) -> Result<(), TaskError> {
        Err(TaskError::failed(self.message.clone()))
    }
}

pub struct EmittingTask {
    ctx: Arc<TaskContext>,
    event: String,
    args: EventArgs,
}

#[async_trait]
impl Task for EmittingTask {
    async fn run(&self) -> Result<(), TaskError> {
        self.ctx.emit(&self.event, self.args.clone());
        Ok(())
    }
}

/// Lets a test hold a task inside `run` until it opens the gate.
#[derive(Clone)]
pub struct Gate {
    entered: Arc<watch::Sender<usize>>,
    open: Arc<watch::Sender<bool>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            entered: Arc::new(watch::channel(0).0),
            open: Arc::new(watch::channel(false).0),
        }
    }
}

#[allow(dead_code)]
impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a task has entered the gate `times` times in total.
    pub async fn entered(&self, times: usize) {
        let mut rx = self.entered.subscribe();
        let _ = rx.wait_for(|count| *count >= times).await;
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    /// Count an entry, then block until the gate opens.
    pub async fn pass(&self) {
        self.entered.send_modify(|count| *count += 1);
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Counts how often each lifecycle hook was called.
#[derive(Clone, Default)]
pub struct HookCounts {
    pub pause: Arc<AtomicUsize>,
    pub resume: Arc<AtomicUsize>,
    pub cancel: Arc<AtomicUsize>,
    pub destroy: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl HookCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// A task that blocks on a [`Gate`] and reports its hooks.
///
/// With `fail_on_cancel`, the cancel hook makes `run` return an error as soon
/// as the gate opens.
pub struct GatedTask {
    gate: Gate,
    hooks: HookCounts,
    capabilities: Capabilities,
    fail_on_cancel: bool,
}

#[allow(dead_code)]
pub fn gated_step(name: &str, gate: &Gate, hooks: &HookCounts, capabilities: Capabilities) -> Step {
    gated_step_with(name, gate, hooks, capabilities, false)
}

#[allow(dead_code)]
pub fn gated_step_with(
    name: &str,
    gate: &Gate,
    hooks: &HookCounts,
    capabilities: Capabilities,
    fail_on_cancel: bool,
) -> Step {
    let gate = gate.clone();
    let hooks = hooks.clone();
    Step::task(name.to_string(), move |_ctx| GatedTask {
        gate: gate.clone(),
        hooks: hooks.clone(),
        capabilities,
        fail_on_cancel,
    })
}

#[async_trait]
impl Task for GatedTask {
    async fn run(&self) -> Result<(), TaskError> {
        self.gate.pass().await;
        if self.fail_on_cancel && self.hooks.cancel.load(Ordering::SeqCst) > 0 {
            return Err(TaskError::failed("cancelled"));
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn pause(&self) -> Result<(), TaskError> {
        self.hooks.pause.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), TaskError> {
        self.hooks.resume.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cancel(&self) -> Result<(), TaskError> {
        self.hooks.cancel.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) {
        self.hooks.destroy.fetch_add(1, Ordering::SeqCst);
    }
}
