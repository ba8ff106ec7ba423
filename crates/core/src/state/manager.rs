//! Process registry.
//!
//! The ProcessManager maps process type names to their definitions, creates
//! or restores instances, and keeps track of the ones that are still active.
//! An instance is dropped from the registry as soon as it emits `cancel`,
//! `error` or `done`, or when its run loop stops on a terminal state.

use crate::engine::{EngineConfig, Process, ProcessDefinition};
use crate::error::{ProcessError, ProcessResult};
use crate::store::{ListQuery, ProcessStore};
use parking_lot::RwLock;
use pk_protocol::ipc::names;
use pk_protocol::process_models::{ProcessRecord, ProcessStatus, Vars};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

type ActiveMap = RwLock<HashMap<Uuid, Arc<Process>>>;

/// Registry of process definitions and active instances.
pub struct ProcessManager {
    user_id: String,
    store: Arc<dyn ProcessStore>,
    config: EngineConfig,

    /// Definitions by process type name.
    definitions: RwLock<BTreeMap<String, Arc<dyn ProcessDefinition>>>,

    /// Instances that have not reached a terminal state.
    active: Arc<ActiveMap>,
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("user_id", &self.user_id)
            .field("definitions", &self.registered())
            .field("active", &self.active.read().len())
            .finish_non_exhaustive()
    }
}

impl ProcessManager {
    /// Create a registry whose processes belong to `user_id`.
    pub fn new(user_id: impl Into<String>, store: Arc<dyn ProcessStore>, config: EngineConfig) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            config,
            definitions: RwLock::new(BTreeMap::new()),
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> &Arc<dyn ProcessStore> {
        &self.store
    }

    /// Register `definition` under its own name, replacing any previous one.
    pub fn register(&self, definition: Arc<dyn ProcessDefinition>) {
        let name = definition.name().to_string();
        if self
            .definitions
            .write()
            .insert(name.clone(), definition)
            .is_some()
        {
            debug!(process_type = %name, "definition replaced");
        } else {
            debug!(process_type = %name, "definition registered");
        }
    }

    /// Names of every registered definition, sorted.
    pub fn registered(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    pub fn definition(&self, name: &str) -> ProcessResult<Arc<dyn ProcessDefinition>> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessError::UnknownProcess(name.to_string()))
    }

    /// Build a process of type `name`.
    ///
    /// With `restore_id` the existing record is loaded instead of a new one
    /// being created. Records already in a terminal state are returned but
    /// not tracked as active.
    pub async fn create(
        &self,
        name: &str,
        vars: Vars,
        restore_id: Option<Uuid>,
    ) -> ProcessResult<Arc<Process>> {
        let definition = self.definition(name)?;
        let process = match restore_id {
            Some(id) => {
                Process::restore(definition, Arc::clone(&self.store), id, self.config).await?
            }
            None => {
                Process::create(definition, Arc::clone(&self.store), &self.user_id, vars, self.config)
                    .await?
            }
        };

        let record = process.record().await?;
        if !record.state.is_terminal() {
            self.track(&process);
        }
        Ok(process)
    }

    /// Restore the process stored under `id`, looking its type up in the
    /// record.
    pub async fn restore(&self, id: Uuid) -> ProcessResult<Arc<Process>> {
        let record = self.store.get(id).await?;
        self.create(&record.process_type, Vars::new(), Some(id)).await
    }

    fn track(&self, process: &Arc<Process>) {
        let id = process.id();
        self.active.write().insert(id, Arc::clone(process));

        for event in [names::CANCEL, names::ERROR, names::DONE] {
            let active: Weak<ActiveMap> = Arc::downgrade(&self.active);
            process.events().on(event, move |_| deregister(&active, id));
        }

        // A cancel written through another handle stops the loop without an
        // event on this one.
        let active: Weak<ActiveMap> = Arc::downgrade(&self.active);
        process.on_settled(move |state| {
            if state.is_terminal() {
                deregister(&active, id);
            }
        });
    }

    /// Status of an active process.
    pub async fn status(&self, id: Uuid) -> ProcessResult<ProcessStatus> {
        self.get(id)?.status().await
    }

    /// An active process by id.
    pub fn get(&self, id: Uuid) -> ProcessResult<Arc<Process>> {
        self.active
            .read()
            .get(&id)
            .cloned()
            .ok_or(ProcessError::NotActive(id))
    }

    /// Every active process.
    pub fn list(&self) -> Vec<Arc<Process>> {
        self.active.read().values().cloned().collect()
    }

    /// Active processes accepted by `filter`.
    pub fn list_filtered<F>(&self, filter: F) -> Vec<Arc<Process>>
    where
        F: Fn(&Process) -> bool,
    {
        self.active
            .read()
            .values()
            .filter(|process| filter(process))
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Persisted records owned by this registry's user.
    pub async fn records(&self, query: ListQuery) -> ProcessResult<Vec<ProcessRecord>> {
        let query = ListQuery {
            user_id: Some(self.user_id.clone()),
            ..query
        };
        Ok(self.store.list(&query).await?)
    }
}

fn deregister(active: &Weak<ActiveMap>, id: Uuid) {
    if let Some(active) = active.upgrade() {
        if active.write().remove(&id).is_some() {
            info!(process_id = %id, "process deregistered");
        }
    }
}
