//! Process execution engine.
//!
//! A [`Process`] advances one persisted record through the steps of its
//! [`ProcessDefinition`], one step at a time. The record is re-read before
//! every decision, so a pause or cancel written by anyone (this handle,
//! another handle on the same id, another OS process sharing a durable store)
//! is honoured at the next step boundary.
//!
//! # Run loop
//!
//! For every step `i`:
//! 1. re-read the record; wait while it is paused; stop on a terminal state
//! 2. move `start` to `in-progress` on the first step and emit `start`
//! 3. persist `step = i` (only while `in-progress`), pass the step through the definition's gateway and
//!    emit `task/before`
//! 4. execute it; on success persist `step = i + 1` and emit `task`, on
//!    failure persist `error` and emit `error`
//!
//! After the last step the same boundary check runs once more, then the
//! process is marked `done` and `done` is emitted.
//!
//! Every state change the loop makes is a conditional store update, so a
//! pause or cancel landing between the read and the write wins and the loop
//! re-reads instead of overwriting it.

use crate::error::{ProcessError, ProcessResult};
use crate::events::{EventEmitter, SubscriptionId};
use crate::state::process::{self as transitions, Operation};
use crate::store::{ProcessStore, UpdateOutcome};
use crate::task::{StepContext, StepFn, Task, TaskContext, TaskError, TaskFactory};
use async_trait::async_trait;
use parking_lot::Mutex;
use pk_protocol::config_models::DEFAULT_POLL_INTERVAL_MS;
use pk_protocol::ipc::{names, ProcessEvent};
use pk_protocol::process_models::{
    ProcessRecord, ProcessState, ProcessStatus, RecordPatch, Vars,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use crate::task::Step;

/// States a run loop may still move away from.
const LIVE_STATES: [ProcessState; 3] = [
    ProcessState::Start,
    ProcessState::InProgress,
    ProcessState::Pause,
];

const SETTLED: &str = "settled";

/// A named, ordered list of steps.
#[async_trait]
pub trait ProcessDefinition: Send + Sync {
    /// The process type recorded on every instance.
    fn name(&self) -> &str;

    fn steps(&self) -> Vec<Step>;

    /// Chance to replace a step right before it runs.
    ///
    /// Receives the record as persisted with `step` set to `index`.
    async fn gateway(
        &self,
        step: Step,
        _index: usize,
        _record: &ProcessRecord,
    ) -> Result<Step, TaskError> {
        Ok(step)
    }
}

/// Tunables shared by every process of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a paused run loop sleeps before re-reading its record when
    /// no wake-up arrives.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// How a run loop ended without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step completed and `done` was emitted.
    Done,

    /// The loop found the record in this terminal state and stopped.
    Halted(ProcessState),
}

/// Handle to a spawned run loop. Await it for the outcome.
#[derive(Debug)]
pub struct RunHandle {
    process_id: Uuid,
    handle: JoinHandle<ProcessResult<RunOutcome>>,
}

impl RunHandle {
    pub fn process_id(&self) -> Uuid {
        self.process_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for RunHandle {
    type Output = ProcessResult<RunOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(ProcessError::Aborted(e.to_string())),
        })
    }
}

/// The step currently executing.
struct CurrentStep {
    index: usize,
    task: Option<Weak<dyn Task>>,
}

/// Result of a boundary check or a step execution.
enum Flow {
    Continue,
    /// The record changed under the loop; decide again.
    Recheck,
    Halt(ProcessState),
}

/// One process instance bound to its persisted record.
pub struct Process {
    id: Uuid,
    definition: Arc<dyn ProcessDefinition>,
    steps: Vec<Step>,
    store: Arc<dyn ProcessStore>,
    events: EventEmitter<ProcessEvent>,
    settled: EventEmitter<ProcessState>,
    current: Mutex<Option<CurrentStep>>,
    wake: Notify,
    running: AtomicBool,
    config: EngineConfig,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("process_type", &self.definition.name())
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Process {
    /// Create a new record (state `start`, step 0) and bind a process to it.
    pub async fn create(
        definition: Arc<dyn ProcessDefinition>,
        store: Arc<dyn ProcessStore>,
        user_id: impl Into<String>,
        vars: Vars,
        config: EngineConfig,
    ) -> ProcessResult<Arc<Self>> {
        let record = ProcessRecord::new(store.generate_id(), user_id, definition.name(), vars);
        let record = store.create(record).await?;
        info!(process_id = %record.id, process_type = %record.process_type, "process created");
        Ok(Arc::new(Self::bind(record.id, definition, store, config)))
    }

    /// Bind a process to an existing record without touching it.
    pub async fn restore(
        definition: Arc<dyn ProcessDefinition>,
        store: Arc<dyn ProcessStore>,
        id: Uuid,
        config: EngineConfig,
    ) -> ProcessResult<Arc<Self>> {
        let record = store.get(id).await?;
        if record.process_type != definition.name() {
            return Err(ProcessError::TypeMismatch {
                id,
                expected: definition.name().to_string(),
                found: record.process_type,
            });
        }
        info!(
            process_id = %id,
            process_type = %record.process_type,
            step = record.step,
            state = %record.state,
            "process restored"
        );
        Ok(Arc::new(Self::bind(id, definition, store, config)))
    }

    fn bind(
        id: Uuid,
        definition: Arc<dyn ProcessDefinition>,
        store: Arc<dyn ProcessStore>,
        config: EngineConfig,
    ) -> Self {
        let steps = definition.steps();
        Self {
            id,
            definition,
            steps,
            store,
            events: EventEmitter::new(),
            settled: EventEmitter::new(),
            current: Mutex::new(None),
            wake: Notify::new(),
            running: AtomicBool::new(false),
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn process_type(&self) -> &str {
        self.definition.name()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The process-level event channel.
    pub fn events(&self) -> &EventEmitter<ProcessEvent> {
        &self.events
    }

    /// The persisted record.
    pub async fn record(&self) -> ProcessResult<ProcessRecord> {
        Ok(self.store.get(self.id).await?)
    }

    pub async fn status(&self) -> ProcessResult<ProcessStatus> {
        Ok(self.record().await?.status())
    }

    pub async fn vars(&self) -> ProcessResult<Vars> {
        Ok(self.record().await?.vars)
    }

    /// Index of the step executing right now, if any.
    pub fn current_step(&self) -> Option<usize> {
        self.current.lock().as_ref().map(|current| current.index)
    }

    /// Whether a run loop is active for this handle.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the run loop and return immediately.
    pub fn run(self: &Arc<Self>) -> RunHandle {
        let process = Arc::clone(self);
        RunHandle {
            process_id: self.id,
            handle: tokio::spawn(async move { process.run_loop().await }),
        }
    }

    /// Call `handler` with the persisted state whenever a run loop of this
    /// handle ends, including halts that emit no event.
    pub fn on_settled<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ProcessState) + Send + Sync + 'static,
    {
        self.settled.on(SETTLED, move |state| handler(*state))
    }

    /// Suspend the process at the next step boundary.
    ///
    /// The new state stands and `pause` is emitted even if the task's hook
    /// fails; the hook error is returned afterwards. The same holds for
    /// [`Self::resume`] and [`Self::cancel`].
    pub async fn pause(&self) -> ProcessResult<()> {
        let record = transitions::apply_operation(&*self.store, self.id, Operation::Pause).await?;
        info!(process_id = %self.id, step = record.step, "process paused");

        let hooked = self.call_hook(Operation::Pause).await;
        self.publish(ProcessEvent::Pause { record });
        hooked.map_err(ProcessError::from)
    }

    pub async fn resume(&self) -> ProcessResult<()> {
        let record = transitions::apply_operation(&*self.store, self.id, Operation::Resume).await?;
        info!(process_id = %self.id, step = record.step, "process resumed");

        let hooked = self.call_hook(Operation::Resume).await;
        self.wake.notify_one();
        self.publish(ProcessEvent::Resume { record });
        hooked.map_err(ProcessError::from)
    }

    /// Stop the process. No step starts afterwards; a step already running
    /// finishes unless its task honours the cancel hook.
    pub async fn cancel(&self) -> ProcessResult<()> {
        let record = transitions::apply_operation(&*self.store, self.id, Operation::Cancel).await?;
        info!(process_id = %self.id, step = record.step, "process cancelled");

        let hooked = self.call_hook(Operation::Cancel).await;
        self.wake.notify_one();
        self.publish(ProcessEvent::Cancel { record });
        hooked.map_err(ProcessError::from)
    }

    /// Forward `operation` to the in-flight task if it advertises the hook.
    async fn call_hook(&self, operation: Operation) -> Result<(), TaskError> {
        let Some(task) = self.current_task() else {
            return Ok(());
        };
        let capabilities = task.capabilities();
        let result = match operation {
            Operation::Pause if capabilities.pause => task.pause().await,
            Operation::Resume if capabilities.resume => task.resume().await,
            Operation::Cancel if capabilities.cancel => task.cancel().await,
            _ => Ok(()),
        };
        if let Err(error) = &result {
            warn!(process_id = %self.id, %operation, %error, "task hook failed");
        }
        result
    }

    fn current_task(&self) -> Option<Arc<dyn Task>> {
        self.current
            .lock()
            .as_ref()
            .and_then(|current| current.task.as_ref())
            .and_then(Weak::upgrade)
    }

    fn set_current(&self, index: usize, task: Option<Weak<dyn Task>>) {
        *self.current.lock() = Some(CurrentStep { index, task });
    }

    fn clear_current(&self) {
        self.current.lock().take();
    }

    fn publish(&self, event: ProcessEvent) {
        self.events.emit(&event.name(), event);
    }

    async fn run_loop(self: Arc<Self>) -> ProcessResult<RunOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ProcessError::AlreadyRunning(self.id));
        }

        let worker = {
            let process = Arc::clone(&self);
            tokio::spawn(async move { process.advance().await })
        };
        let result = match worker.await {
            Ok(result) => result,
            Err(error) => self.abort(error).await,
        };

        self.clear_current();
        self.running.store(false, Ordering::SeqCst);
        self.settle().await;
        result
    }

    async fn advance(&self) -> ProcessResult<RunOutcome> {
        let total = self.steps.len();
        let mut index = self.record().await?.step.min(total);

        while index < total {
            if let Flow::Halt(state) = self.boundary(index).await? {
                return Ok(RunOutcome::Halted(state));
            }
            match self.execute_step(index).await? {
                Flow::Continue => index += 1,
                Flow::Recheck => {}
                Flow::Halt(state) => return Ok(RunOutcome::Halted(state)),
            }
        }

        loop {
            if let Flow::Halt(state) = self.boundary(total).await? {
                return Ok(RunOutcome::Halted(state));
            }
            let outcome = transitions::transition(
                &*self.store,
                self.id,
                &[ProcessState::Start, ProcessState::InProgress],
                ProcessState::Done,
            )
            .await?;
            match outcome {
                UpdateOutcome::Applied(record) => {
                    info!(process_id = %self.id, step = record.step, "process done");
                    self.publish(ProcessEvent::Done);
                    return Ok(RunOutcome::Done);
                }
                UpdateOutcome::Rejected(record) => {
                    debug!(process_id = %self.id, state = %record.state, "state changed before done");
                }
            }
        }
    }

    /// Decide whether step `index` may begin.
    async fn boundary(&self, index: usize) -> ProcessResult<Flow> {
        loop {
            let record = self.record().await?;
            match record.state {
                ProcessState::Pause => {
                    debug!(process_id = %self.id, step = index, "paused, waiting");
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                state if state.is_terminal() => {
                    debug!(process_id = %self.id, step = index, state = %state, "halting");
                    return Ok(Flow::Halt(state));
                }
                ProcessState::Start if index < self.steps.len() => {
                    let outcome = transitions::transition(
                        &*self.store,
                        self.id,
                        &[ProcessState::Start],
                        ProcessState::InProgress,
                    )
                    .await?;
                    match outcome {
                        UpdateOutcome::Applied(record) => {
                            info!(process_id = %self.id, step = index, "process started");
                            self.publish(ProcessEvent::Start { record });
                            return Ok(Flow::Continue);
                        }
                        UpdateOutcome::Rejected(record) => {
                            debug!(process_id = %self.id, state = %record.state, "start superseded");
                        }
                    }
                }
                _ => return Ok(Flow::Continue),
            }
        }
    }

    async fn execute_step(&self, index: usize) -> ProcessResult<Flow> {
        let claimed = self
            .store
            .update_if(self.id, &[ProcessState::InProgress], RecordPatch::step(index))
            .await?;
        let record = match claimed {
            UpdateOutcome::Applied(record) => record,
            UpdateOutcome::Rejected(record) => {
                debug!(process_id = %self.id, step = index, state = %record.state, "step not claimed");
                return Ok(Flow::Recheck);
            }
        };

        let step = match self
            .definition
            .gateway(self.steps[index].clone(), index, &record)
            .await
        {
            Ok(step) => step,
            Err(error) => return self.fail(index, error).await,
        };

        debug!(process_id = %self.id, step = index, name = step.name(), "executing step");
        self.publish(ProcessEvent::TaskBefore { record });

        let outcome = match &step {
            Step::Task { factory, .. } => self.run_task(index, factory).await,
            Step::Function { func, .. } => self.run_function(index, func).await,
        };

        match outcome {
            Ok(()) => {
                let record = transitions::set_step(&*self.store, self.id, index + 1).await?;
                debug!(process_id = %self.id, step = index, "step completed");
                self.publish(ProcessEvent::Task {
                    record,
                    step: step.is_task().then_some(index),
                });
                Ok(Flow::Continue)
            }
            Err(error) => self.fail(index, error).await,
        }
    }

    async fn run_task(&self, index: usize, factory: &TaskFactory) -> Result<(), TaskError> {
        let ctx = Arc::new(TaskContext::new(self.id, index, Arc::clone(&self.store)));

        let events = self.events.clone();
        ctx.events().on_any(move |name, args| {
            let event = ProcessEvent::TaskEvent {
                name: name.to_string(),
                args: args.clone(),
            };
            events.emit(&names::task_event(name), event);
        });

        let task: Arc<dyn Task> = Arc::from(factory(Arc::clone(&ctx)));
        self.set_current(index, Some(Arc::downgrade(&task)));

        let result = task.run().await;

        self.clear_current();
        task.destroy();
        ctx.release();
        result
    }

    async fn run_function(&self, index: usize, func: &StepFn) -> Result<(), TaskError> {
        self.set_current(index, None);
        let result = func(StepContext {
            process_id: self.id,
            step: index,
            store: Arc::clone(&self.store),
        })
        .await;
        self.clear_current();
        result
    }

    /// Record a failed step.
    ///
    /// A failure of a step whose process was stopped meanwhile (usually a
    /// task honouring its cancel hook) leaves the record alone and emits
    /// nothing.
    async fn fail(&self, index: usize, error: TaskError) -> ProcessResult<Flow> {
        let outcome =
            transitions::transition(&*self.store, self.id, &LIVE_STATES, ProcessState::Error)
                .await?;
        match outcome {
            UpdateOutcome::Applied(record) => {
                warn!(process_id = %self.id, step = index, %error, "step failed");
                self.publish(ProcessEvent::Error {
                    error: error.to_string(),
                    record,
                });
                Err(ProcessError::Task(error))
            }
            UpdateOutcome::Rejected(record) => {
                info!(
                    process_id = %self.id,
                    step = index,
                    state = %record.state,
                    %error,
                    "step ended after the process was stopped"
                );
                Ok(Flow::Halt(record.state))
            }
        }
    }

    /// The run loop panicked or was aborted. Recorded like a step failure.
    async fn abort(&self, error: JoinError) -> ProcessResult<RunOutcome> {
        let message = match error.try_into_panic() {
            Ok(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                format!("step panicked: {detail}")
            }
            Err(error) => error.to_string(),
        };
        warn!(process_id = %self.id, error = %message, "run loop aborted");

        let outcome =
            transitions::transition(&*self.store, self.id, &LIVE_STATES, ProcessState::Error)
                .await?;
        if let UpdateOutcome::Applied(record) = outcome {
            self.publish(ProcessEvent::Error {
                error: message.clone(),
                record,
            });
        }
        Err(ProcessError::Aborted(message))
    }

    async fn settle(&self) {
        match self.store.get(self.id).await {
            Ok(record) => self.settled.emit(SETTLED, record.state),
            Err(error) => warn!(process_id = %self.id, %error, "cannot read final state"),
        }
    }
}
