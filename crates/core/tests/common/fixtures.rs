//! Test fixtures for creating stores, definitions and sample configurations.

use async_trait::async_trait;
use pk_core::engine::{EngineConfig, ProcessDefinition};
use pk_core::store::{ListQuery, MemoryStore, ProcessStore, StoreResult, UpdateOutcome};
use pk_core::task::{Step, TaskError};
use pk_protocol::process_models::{ProcessRecord, ProcessState, RecordPatch, Vars};
use uuid::Uuid;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const USER: &str = "aries";

/// A fresh in-memory store.
#[allow(dead_code)]
pub fn memory_store() -> Arc<dyn ProcessStore> {
    Arc::new(MemoryStore::new())
}

/// Engine settings with a short poll interval so paused loops react quickly.
#[allow(dead_code)]
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(10),
    }
}

/// Build a `Vars` map from a JSON object literal.
#[allow(dead_code)]
pub fn vars(value: Value) -> Vars {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A memory store that stalls every write moving a record to `in-progress`.
///
/// Widens the gap between the run loop reading `start` and its write landing.
#[allow(dead_code)]
pub struct SlowStartStore {
    inner: MemoryStore,
    delay: Duration,
}

#[allow(dead_code)]
impl SlowStartStore {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            delay,
        })
    }

    async fn stall(&self, patch: &RecordPatch) {
        if patch.state == Some(ProcessState::InProgress) {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ProcessStore for SlowStartStore {
    async fn create(&self, record: ProcessRecord) -> StoreResult<ProcessRecord> {
        self.inner.create(record).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<ProcessRecord> {
        self.inner.get(id).await
    }

    async fn update(&self, id: Uuid, patch: RecordPatch) -> StoreResult<ProcessRecord> {
        self.stall(&patch).await;
        self.inner.update(id, patch).await
    }

    async fn update_if(
        &self,
        id: Uuid,
        expected: &[ProcessState],
        patch: RecordPatch,
    ) -> StoreResult<UpdateOutcome> {
        self.stall(&patch).await;
        self.inner.update_if(id, expected, patch).await
    }

    async fn remove(&self, id: Uuid) -> StoreResult<ProcessRecord> {
        self.inner.remove(id).await
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ProcessRecord>> {
        self.inner.list(query).await
    }
}

/// A definition with a fixed list of steps.
#[allow(dead_code)]
pub struct StaticProcess {
    pub name: String,
    pub steps: Vec<Step>,
}

#[allow(dead_code)]
impl StaticProcess {
    pub fn new(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            steps,
        })
    }
}

#[async_trait]
impl ProcessDefinition for StaticProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn steps(&self) -> Vec<Step> {
        self.steps.clone()
    }
}

/// A definition whose gateway swaps step `index` for `replacement`.
#[allow(dead_code)]
pub struct GatewayProcess {
    pub inner: Arc<StaticProcess>,
    pub index: usize,
    pub replacement: Step,
}

#[async_trait]
impl ProcessDefinition for GatewayProcess {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn steps(&self) -> Vec<Step> {
        self.inner.steps()
    }

    async fn gateway(
        &self,
        step: Step,
        index: usize,
        _record: &ProcessRecord,
    ) -> Result<Step, TaskError> {
        if index == self.index {
            Ok(self.replacement.clone())
        } else {
            Ok(step)
        }
    }
}

/// Create a temporary project directory with `.process-kit` configuration.
///
/// The project declares a `wizard` process with four built-in steps and a
/// `broken` process whose second step fails.
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_project(backend: &str) -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path();

    std::fs::create_dir_all(root.join(".process-kit/processes"))?;

    let config_toml = format!(
        r#"user-id = "{USER}"
poll-interval-ms = 10

[store]
backend = "{backend}"
path = ".process-kit/processes.db"
"#
    );
    std::fs::write(root.join(".process-kit/config.toml"), config_toml)?;

    let wizard_yaml = r#"
name: wizard
description: "Four step wizard"
steps:
  - kind: set-vars
    vars:
      stage: profile
  - kind: sleep
    ms: 5
  - kind: emit
    event: synced
    args: ["profile", 2]
  - kind: set-vars
    vars:
      stage: done
"#;
    std::fs::write(root.join(".process-kit/processes/wizard.yaml"), wizard_yaml)?;

    let broken_yaml = r#"
name: broken
steps:
  - kind: sleep
    ms: 1
  - kind: fail
    message: "Custom error"
"#;
    std::fs::write(root.join(".process-kit/processes/broken.yml"), broken_yaml)?;

    Ok(temp_dir)
}
