//! In-memory record store.
//!
//! Suitable for tests and dry runs; contents are lost on exit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{merge_outcome, MergeOutcome, RecordStore, StoreCounts, StoreError};
use crate::models::{Record, StoredRecord};

#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<String, StoredRecord>>>,
    writes: Arc<RwLock<usize>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upserts that changed stored data.
    pub async fn write_count(&self) -> usize {
        *self.writes.read().await
    }

    pub async fn snapshot(&self) -> HashMap<String, StoredRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn keys(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn upsert(&self, record: &Record, complete: bool) -> Result<MergeOutcome, StoreError> {
        // One write lock covers the check and the write.
        let mut records = self.records.write().await;
        let outcome = merge_outcome(records.get(&record.key), record, complete);
        if outcome.wrote() {
            records.insert(
                record.key.clone(),
                StoredRecord {
                    key: record.key.clone(),
                    fields: record.fields.clone(),
                    complete,
                    updated_at: Utc::now(),
                },
            );
            *self.writes.write().await += 1;
        }
        Ok(outcome)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let records = self.records.read().await;
        Ok(StoreCounts {
            total: records.len() as u64,
            complete: records.values().filter(|r| r.complete).count() as u64,
        })
    }
}
