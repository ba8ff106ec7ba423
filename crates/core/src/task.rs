//! Task lifecycle protocol.
//!
//! A process is a list of [`Step`]s. A step is either a full [`Task`], built
//! fresh for one step from its factory and able to react to pause, resume and
//! cancel, or a plain async function.
//!
//! Each task gets a [`TaskContext`] holding the process id, store access and
//! an emitter of its own. Events a task emits through its context are
//! rebroadcast by the engine under `task/<name>`.

use crate::events::EventEmitter;
use crate::store::{ProcessStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use pk_protocol::ipc::EventArgs;
use pk_protocol::process_models::{ProcessRecord, Vars};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a task or step function.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A lifecycle method was called that the task does not provide.
    #[error("Method \"{0}\" is not implemented")]
    NotImplemented(&'static str),

    /// The task failed with a message.
    #[error("{0}")]
    Failed(String),

    /// The task context was used after it was released.
    #[error("Task context has been destroyed")]
    Destroyed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/// Which optional lifecycle hooks a task provides.
///
/// The engine only calls a hook the task advertises here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub pause: bool,
    pub resume: bool,
    pub cancel: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        pause: false,
        resume: false,
        cancel: false,
    };

    pub const ALL: Capabilities = Capabilities {
        pause: true,
        resume: true,
        cancel: true,
    };
}

/// A unit of work run by the engine for exactly one step.
#[async_trait]
pub trait Task: Send + Sync {
    /// Perform the step. Returning an error fails the process.
    async fn run(&self) -> Result<(), TaskError> {
        Err(TaskError::NotImplemented("run"))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn pause(&self) -> Result<(), TaskError> {
        Err(TaskError::NotImplemented("pause"))
    }

    async fn resume(&self) -> Result<(), TaskError> {
        Err(TaskError::NotImplemented("resume"))
    }

    async fn cancel(&self) -> Result<(), TaskError> {
        Err(TaskError::NotImplemented("cancel"))
    }

    /// Release whatever `run` acquired. Called once after `run` returns.
    fn destroy(&self) {}
}

/// Everything a task may touch while it runs.
pub struct TaskContext {
    process_id: Uuid,
    step: usize,
    store: RwLock<Option<Arc<dyn ProcessStore>>>,
    events: EventEmitter<EventArgs>,
    released: AtomicBool,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("process_id", &self.process_id)
            .field("step", &self.step)
            .field("released", &self.is_released())
            .finish()
    }
}

impl TaskContext {
    pub fn new(process_id: Uuid, step: usize, store: Arc<dyn ProcessStore>) -> Self {
        Self {
            process_id,
            step,
            store: RwLock::new(Some(store)),
            events: EventEmitter::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn process_id(&self) -> Uuid {
        self.process_id
    }

    /// Index of the step this task runs for.
    pub fn step(&self) -> usize {
        self.step
    }

    /// The process store, or [`TaskError::Destroyed`] once released.
    pub fn store(&self) -> Result<Arc<dyn ProcessStore>, TaskError> {
        self.store.read().clone().ok_or(TaskError::Destroyed)
    }

    /// The persisted record of the owning process.
    pub async fn record(&self) -> Result<ProcessRecord, TaskError> {
        Ok(self.store()?.get(self.process_id).await?)
    }

    pub async fn vars(&self) -> Result<Vars, TaskError> {
        Ok(self.record().await?.vars)
    }

    /// Merge `vars` into the process variables.
    pub async fn update_vars(&self, vars: Vars) -> Result<ProcessRecord, TaskError> {
        Ok(self.store()?.update_vars(self.process_id, vars).await?)
    }

    /// The task's own event channel.
    pub fn events(&self) -> &EventEmitter<EventArgs> {
        &self.events
    }

    /// Emit a task-level event. Reaches nobody after release.
    pub fn emit(&self, name: &str, args: EventArgs) {
        if self.is_released() {
            return;
        }
        self.events.emit(name, args);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Drop the store reference and every subscription.
    ///
    /// Returns `false` if the context was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.store.write().take();
        self.events.stop_listening();
        true
    }
}

/// What a function step receives.
#[derive(Clone)]
pub struct StepContext {
    pub process_id: Uuid,
    pub step: usize,
    pub store: Arc<dyn ProcessStore>,
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("process_id", &self.process_id)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl StepContext {
    pub async fn vars(&self) -> Result<Vars, TaskError> {
        Ok(self.store.get(self.process_id).await?.vars)
    }

    pub async fn update_vars(&self, vars: Vars) -> Result<ProcessRecord, TaskError> {
        Ok(self.store.update_vars(self.process_id, vars).await?)
    }
}

pub type TaskFactory = Arc<dyn Fn(Arc<TaskContext>) -> Box<dyn Task> + Send + Sync>;
pub type StepFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
pub type StepFn = Arc<dyn Fn(StepContext) -> StepFuture + Send + Sync>;

/// One entry of a process's step list.
#[derive(Clone)]
pub enum Step {
    /// Built fresh from the factory for every run of this step.
    Task { name: String, factory: TaskFactory },

    /// Invoked directly. Has no event channel and no lifecycle hooks.
    Function { name: String, func: StepFn },
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Task { name, .. } => f.debug_tuple("Task").field(name).finish(),
            Step::Function { name, .. } => f.debug_tuple("Function").field(name).finish(),
        }
    }
}

impl Step {
    pub fn task<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Task + 'static,
        F: Fn(Arc<TaskContext>) -> T + Send + Sync + 'static,
    {
        Step::Task {
            name: name.into(),
            factory: Arc::new(move |ctx| Box::new(factory(ctx)) as Box<dyn Task>),
        }
    }

    pub fn function<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Step::Function {
            name: name.into(),
            func: Arc::new(move |ctx| Box::pin(func(ctx)) as StepFuture),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Task { name, .. } | Step::Function { name, .. } => name,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, Step::Task { .. })
    }
}
