//! Persistence of process records.
//!
//! Every backend implements [`ProcessStore`]. The engine only ever talks to the
//! trait object, so backends are swappable at construction time:
//! - [`MemoryStore`]: records live in memory (tests, one-shot runs)
//! - [`SqliteStore`]: records live in an embedded database file and survive
//!   a restart (feature `sqlite`)

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use pk_protocol::config_models::{StoreBackend, StoreConfig};
use pk_protocol::process_models::{ProcessRecord, ProcessState, RecordPatch, Vars};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Errors raised by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists with the given id.
    #[error("Process record {0} not found")]
    NotFound(Uuid),

    /// A record with the given id already exists.
    #[error("Process record {0} already exists")]
    AlreadyExists(Uuid),

    /// The backend cannot be reached or is not compiled in.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("Corrupt process record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Failed to encode process vars: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Type alias for Result with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Filter applied by [`ProcessStore::list`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub state: Option<ProcessState>,
    pub process_type: Option<String>,
}

impl ListQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: ProcessState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_process_type(mut self, process_type: impl Into<String>) -> Self {
        self.process_type = Some(process_type.into());
        self
    }

    pub fn matches(&self, record: &ProcessRecord) -> bool {
        self.user_id.as_ref().map_or(true, |u| *u == record.user_id)
            && self.state.map_or(true, |s| s == record.state)
            && self
                .process_type
                .as_ref()
                .map_or(true, |p| *p == record.process_type)
    }
}

/// Result of [`ProcessStore::update_if`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The stored state was expected and the patch was written.
    Applied(ProcessRecord),

    /// The stored state was something else. Holds the untouched record.
    Rejected(ProcessRecord),
}

/// Storage contract for process records.
///
/// Implementations must apply [`RecordPatch`] atomically per record: `step`
/// and `state` are replaced, `vars` is merged key by key.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// A fresh, unique process id.
    fn generate_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// Persist a new record. A nil id is replaced by [`Self::generate_id`].
    async fn create(&self, record: ProcessRecord) -> StoreResult<ProcessRecord>;

    async fn get(&self, id: Uuid) -> StoreResult<ProcessRecord>;

    /// Merge `patch` into the stored record and return the result.
    async fn update(&self, id: Uuid, patch: RecordPatch) -> StoreResult<ProcessRecord>;

    /// Merge `patch` only if the stored state is one of `expected`.
    ///
    /// The state check and the write are one atomic step.
    async fn update_if(
        &self,
        id: Uuid,
        expected: &[ProcessState],
        patch: RecordPatch,
    ) -> StoreResult<UpdateOutcome>;

    /// Delete a record, returning what was stored.
    async fn remove(&self, id: Uuid) -> StoreResult<ProcessRecord>;

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ProcessRecord>>;

    /// Merge `vars` into the stored variables.
    async fn update_vars(&self, id: Uuid, vars: Vars) -> StoreResult<ProcessRecord> {
        self.update(id, RecordPatch::vars(vars)).await
    }
}

/// Open the backend described by `config`.
///
/// Relative sqlite paths are resolved against `root`.
pub fn open_store(root: &Path, config: &StoreConfig) -> StoreResult<Arc<dyn ProcessStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let path = root.join(&config.path);
            Ok(Arc::new(SqliteStore::open(path)?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => {
            let _ = root;
            Err(StoreError::Unavailable(
                "pk-core was built without the `sqlite` feature".to_string(),
            ))
        }
    }
}
