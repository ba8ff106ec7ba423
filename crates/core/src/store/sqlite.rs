//! Durable process store backed by an embedded sqlite database.
//!
//! The connection is shared behind a mutex and every query runs on the
//! blocking thread pool. Updates run inside an immediate transaction so a
//! second OS process writing to the same file cannot interleave with the
//! read-merge-write of a patch.

use super::{ListQuery, ProcessStore, StoreError, StoreResult, UpdateOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use pk_protocol::process_models::{ProcessRecord, ProcessState, RecordPatch, Vars};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS processes (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL,
    process_type TEXT NOT NULL,
    step         INTEGER NOT NULL,
    state        TEXT NOT NULL,
    vars         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS processes_user_id ON processes (user_id);
";

const SELECT_COLUMNS: &str = "SELECT id, user_id, process_type, step, state, vars FROM processes";

/// Row as stored, before decoding.
struct RawRecord {
    id: String,
    user_id: String,
    process_type: String,
    step: i64,
    state: String,
    vars: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            process_type: row.get(2)?,
            step: row.get(3)?,
            state: row.get(4)?,
            vars: row.get(5)?,
        })
    }

    fn decode(self) -> StoreResult<ProcessRecord> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = Uuid::parse_str(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let step = usize::try_from(self.step).map_err(|e| corrupt(e.to_string()))?;
        let state: ProcessState = self.state.parse().map_err(corrupt)?;
        let vars: Vars = serde_json::from_str(&self.vars).map_err(|e| corrupt(e.to_string()))?;

        Ok(ProcessRecord {
            id,
            user_id: self.user_id,
            process_type: self.process_type,
            step,
            state,
            vars,
        })
    }
}

fn step_column(step: usize) -> StoreResult<i64> {
    i64::try_from(step).map_err(|e| StoreError::Unavailable(format!("step out of range: {e}")))
}

fn select_one(conn: &Connection, id: Uuid) -> StoreResult<Option<ProcessRecord>> {
    let raw = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            RawRecord::from_row,
        )
        .optional()?;
    raw.map(RawRecord::decode).transpose()
}

/// Stores records in a sqlite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (and create if needed) the database at `path`.
    ///
    /// Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        tracing::debug!(path = %path.display(), "opened sqlite process store");
        Self::init(conn)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite worker failed: {e}")))?
    }
}

#[async_trait]
impl ProcessStore for SqliteStore {
    async fn create(&self, mut record: ProcessRecord) -> StoreResult<ProcessRecord> {
        if record.id.is_nil() {
            record.id = self.generate_id();
        }

        self.with_conn(move |conn| {
            let vars = serde_json::to_string(&record.vars)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO processes (id, user_id, process_type, step, state, vars)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.user_id,
                    record.process_type,
                    step_column(record.step)?,
                    record.state.as_str(),
                    vars,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(record.id));
            }
            Ok(record)
        })
        .await
    }

    async fn get(&self, id: Uuid) -> StoreResult<ProcessRecord> {
        self.with_conn(move |conn| select_one(conn, id)?.ok_or(StoreError::NotFound(id)))
            .await
    }

    async fn update(&self, id: Uuid, patch: RecordPatch) -> StoreResult<ProcessRecord> {
        let outcome = self.update_if(id, &ProcessState::ALL, patch).await?;
        match outcome {
            UpdateOutcome::Applied(record) | UpdateOutcome::Rejected(record) => Ok(record),
        }
    }

    async fn update_if(
        &self,
        id: Uuid,
        expected: &[ProcessState],
        patch: RecordPatch,
    ) -> StoreResult<UpdateOutcome> {
        let expected = expected.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = select_one(&tx, id)?.ok_or(StoreError::NotFound(id))?;
            if !expected.contains(&record.state) {
                return Ok(UpdateOutcome::Rejected(record));
            }
            record.apply(patch);

            tx.execute(
                "UPDATE processes SET step = ?2, state = ?3, vars = ?4 WHERE id = ?1",
                params![
                    id.to_string(),
                    step_column(record.step)?,
                    record.state.as_str(),
                    serde_json::to_string(&record.vars)?,
                ],
            )?;
            tx.commit()?;
            Ok(UpdateOutcome::Applied(record))
        })
        .await
    }

    async fn remove(&self, id: Uuid) -> StoreResult<ProcessRecord> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let record = select_one(&tx, id)?.ok_or(StoreError::NotFound(id))?;
            tx.execute("DELETE FROM processes WHERE id = ?1", params![id.to_string()])?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ProcessRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE (?1 IS NULL OR user_id = ?1) ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![query.user_id], RawRecord::from_row)?;

            let mut records = Vec::new();
            for row in rows {
                let record = row?.decode()?;
                if query.matches(&record) {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }
}
