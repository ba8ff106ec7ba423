//! Built-in step kinds for processes declared in configuration.
//!
//! | kind       | params                          | shape    |
//! |------------|---------------------------------|----------|
//! | `sleep`    | `ms`                            | task     |
//! | `set-vars` | `vars` (object)                 | function |
//! | `emit`     | `event`, `args` (optional list) | task     |
//! | `fail`     | `message` (optional)            | task     |

use crate::engine::ProcessDefinition;
use crate::error::{ProcessError, ProcessResult};
use crate::task::{Capabilities, Step, Task, TaskContext, TaskError};
use async_trait::async_trait;
use pk_protocol::definition_models::{ProcessDefinitionConfig, StepConfig};
use pk_protocol::ipc::EventArgs;
use pk_protocol::process_models::Vars;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub const SLEEP: &str = "sleep";
pub const SET_VARS: &str = "set-vars";
pub const EMIT: &str = "emit";
pub const FAIL: &str = "fail";

/// A process definition read from `.process-kit/processes/*.yaml`.
#[derive(Debug, Clone)]
pub struct ConfiguredProcess {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl ConfiguredProcess {
    /// Resolve every step of `config`.
    pub fn from_config(config: &ProcessDefinitionConfig) -> ProcessResult<Self> {
        let steps = config
            .steps
            .iter()
            .map(|step| {
                resolve_step(step).map_err(|e| match e {
                    ProcessError::UnknownTaskShape { kind, .. } => ProcessError::UnknownTaskShape {
                        process: config.name.clone(),
                        kind,
                    },
                    other => other,
                })
            })
            .collect::<ProcessResult<Vec<_>>>()?;

        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            steps,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl ProcessDefinition for ConfiguredProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn steps(&self) -> Vec<Step> {
        self.steps.clone()
    }
}

/// Turn one configured step into a runnable [`Step`].
pub fn resolve_step(config: &StepConfig) -> ProcessResult<Step> {
    match config.kind.as_str() {
        SLEEP => {
            let ms = config
                .param("ms")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid(config, "`ms` must be a non-negative integer"))?;
            let duration = Duration::from_millis(ms);
            Ok(Step::task(SLEEP, move |ctx| SleepTask::new(ctx, duration)))
        }
        SET_VARS => {
            let vars = match config.param("vars") {
                Some(Value::Object(vars)) => vars.clone(),
                _ => return Err(invalid(config, "`vars` must be a mapping")),
            };
            Ok(Step::function(SET_VARS, move |ctx| {
                let vars: Vars = vars.clone();
                async move { ctx.update_vars(vars).await.map(|_| ()) }
            }))
        }
        EMIT => {
            let event = config
                .param("event")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid(config, "`event` must be a string"))?
                .to_string();
            let args: EventArgs = match config.param("args") {
                None => Vec::new(),
                Some(Value::Array(args)) => args.clone(),
                Some(other) => vec![other.clone()],
            };
            Ok(Step::task(EMIT, move |ctx| EmitTask {
                ctx,
                event: event.clone(),
                args: args.clone(),
            }))
        }
        FAIL => {
            let message = match config.param("message") {
                None => "step failed".to_string(),
                Some(Value::String(message)) => message.clone(),
                Some(_) => return Err(invalid(config, "`message` must be a string")),
            };
            Ok(Step::task(FAIL, move |_ctx| FailTask {
                message: message.clone(),
            }))
        }
        other => Err(ProcessError::UnknownTaskShape {
            process: String::new(),
            kind: other.to_string(),
        }),
    }
}

fn invalid(config: &StepConfig, reason: &str) -> ProcessError {
    ProcessError::InvalidStep {
        kind: config.kind.clone(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Paused,
    Cancelled,
}

/// Sleeps for a fixed duration.
///
/// Pausing stops the clock, resuming restarts it with the time left, and
/// cancelling ends the step with an error. Emits `progress` with the elapsed
/// and total milliseconds whenever the clock stops, and once on completion.
pub struct SleepTask {
    ctx: Arc<TaskContext>,
    duration: Duration,
    control: watch::Sender<Control>,
}

impl SleepTask {
    pub fn new(ctx: Arc<TaskContext>, duration: Duration) -> Self {
        let (control, _) = watch::channel(Control::Running);
        Self {
            ctx,
            duration,
            control,
        }
    }

    fn progress(&self, remaining: Duration) {
        let total = self.duration.as_millis() as u64;
        let elapsed = self.duration.saturating_sub(remaining).as_millis() as u64;
        self.ctx.emit("progress", vec![json!(elapsed), json!(total)]);
    }
}

#[async_trait]
impl Task for SleepTask {
    async fn run(&self) -> Result<(), TaskError> {
        let mut control = self.control.subscribe();
        let mut remaining = self.duration;

        loop {
            let state = *control.borrow_and_update();
            match state {
                Control::Cancelled => return Err(TaskError::failed("sleep cancelled")),
                Control::Paused => {
                    control
                        .changed()
                        .await
                        .map_err(|e| TaskError::Other(e.into()))?;
                    continue;
                }
                Control::Running => {}
            }

            let started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => break,
                changed = control.changed() => {
                    changed.map_err(|e| TaskError::Other(e.into()))?;
                    remaining = remaining.saturating_sub(started.elapsed());
                    self.progress(remaining);
                }
            }
        }

        self.progress(Duration::ZERO);
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn pause(&self) -> Result<(), TaskError> {
        self.control.send_replace(Control::Paused);
        Ok(())
    }

    async fn resume(&self) -> Result<(), TaskError> {
        self.control.send_replace(Control::Running);
        Ok(())
    }

    async fn cancel(&self) -> Result<(), TaskError> {
        self.control.send_replace(Control::Cancelled);
        Ok(())
    }
}

/// Emits one event and completes.
pub struct EmitTask {
    ctx: Arc<TaskContext>,
    event: String,
    args: EventArgs,
}

#[async_trait]
impl Task for EmitTask {
    async fn run(&self) -> Result<(), TaskError> {
        self.ctx.emit(&self.event, self.args.clone());
        Ok(())
    }
}

/// Always fails with its message.
pub struct FailTask {
    message: String,
}

#[async_trait]
impl Task for FailTask {
    async fn run(&self) -> Result<(), TaskError> {
        Err(TaskError::failed(self.message.clone()))
    }
}
