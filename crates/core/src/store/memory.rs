//! In-memory process store.

use super::{ListQuery, ProcessStore, StoreError, StoreResult, UpdateOutcome};
use async_trait::async_trait;
use pk_protocol::process_models::{ProcessRecord, ProcessState, RecordPatch};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keeps records in a map guarded by an async lock.
///
/// Every operation holds the lock for its whole read-modify-write, so patches
/// applied to the same record never interleave.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Uuid, ProcessRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    async fn create(&self, mut record: ProcessRecord) -> StoreResult<ProcessRecord> {
        if record.id.is_nil() {
            record.id = self.generate_id();
        }

        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id, record.clone());
        tracing::trace!(process_id = %record.id, "record created");
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> StoreResult<ProcessRecord> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: Uuid, patch: RecordPatch) -> StoreResult<ProcessRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.apply(patch);
        Ok(record.clone())
    }

    async fn update_if(
        &self,
        id: Uuid,
        expected: &[ProcessState],
        patch: RecordPatch,
    ) -> StoreResult<UpdateOutcome> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !expected.contains(&record.state) {
            return Ok(UpdateOutcome::Rejected(record.clone()));
        }
        record.apply(patch);
        Ok(UpdateOutcome::Applied(record.clone()))
    }

    async fn remove(&self, id: Uuid) -> StoreResult<ProcessRecord> {
        self.records
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ProcessRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}
