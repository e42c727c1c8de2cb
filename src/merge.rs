//! Merging successful fetches into the data store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::models::Record;
use crate::repository::{MergeOutcome, RecordStore, StoreError};

/// One line of the incomplete-records log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteEntry {
    pub key: String,
    pub fields: std::collections::BTreeMap<String, String>,
    pub missing: Vec<String>,
    pub logged_at: DateTime<Utc>,
}

/// Append-only JSON Lines log of records that were missing required fields.
#[derive(Debug, Clone)]
pub struct IncompleteLog {
    path: PathBuf,
}

impl IncompleteLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &Record, missing: &[&str]) -> std::io::Result<()> {
        let entry = IncompleteEntry {
            key: record.key.clone(),
            fields: record.fields.clone(),
            missing: missing.iter().map(|s| s.to_string()).collect(),
            logged_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Read every entry. Malformed lines are skipped.
    pub async fn entries(&self) -> std::io::Result<Vec<IncompleteEntry>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

/// Result of merging one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
    pub complete: bool,
}

/// Computes completeness at merge time and applies the conditional upsert.
pub struct MergeStore {
    store: Arc<dyn RecordStore>,
    required_fields: Vec<String>,
    incomplete_log: Option<IncompleteLog>,
}

impl MergeStore {
    pub fn new(
        store: Arc<dyn RecordStore>,
        required_fields: Vec<String>,
        incomplete_log: Option<IncompleteLog>,
    ) -> Self {
        Self {
            store,
            required_fields,
            incomplete_log,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Merge a successful fetch. A store failure is returned and is fatal
    /// to the run; a side-log failure is only logged.
    pub async fn merge(&self, record: &Record) -> Result<MergeResult, StoreError> {
        let missing = record.missing_fields(&self.required_fields);
        let complete = missing.is_empty();

        let outcome = self.store.upsert(record, complete).await?;
        debug!(
            target = %record.key,
            complete,
            outcome = outcome.as_str(),
            "Merged record"
        );

        if !complete {
            if let Some(ref log) = self.incomplete_log {
                if let Err(e) = log.append(record, &missing).await {
                    warn!(
                        "Failed to append {} to incomplete log {}: {}",
                        record.key,
                        log.path().display(),
                        e
                    );
                }
            }
        }

        Ok(MergeResult { outcome, complete })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRecordStore;
    use tempfile::tempdir;

    fn required() -> Vec<String> {
        vec!["chinese_name".to_string(), "family".to_string()]
    }

    #[tokio::test]
    async fn test_incomplete_record_is_logged() {
        let dir = tempdir().unwrap();
        let log = IncompleteLog::new(dir.path().join("incomplete_records.jsonl"));
        let store = Arc::new(InMemoryRecordStore::new());
        let merge = MergeStore::new(store.clone(), required(), Some(log.clone()));

        let partial = Record::new("Abies alba").with_field("chinese_name", "冷杉");
        let result = merge.merge(&partial).await.unwrap();
        assert!(!result.complete);
        assert_eq!(result.outcome, MergeOutcome::Inserted);

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "Abies alba");
        assert_eq!(entries[0].missing, vec!["family".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_record_not_logged() {
        let dir = tempdir().unwrap();
        let log = IncompleteLog::new(dir.path().join("incomplete_records.jsonl"));
        let merge = MergeStore::new(
            Arc::new(InMemoryRecordStore::new()),
            required(),
            Some(log.clone()),
        );

        let full = Record::new("Abies alba")
            .with_field("chinese_name", "冷杉")
            .with_field("family", "Pinaceae");
        assert!(merge.merge(&full).await.unwrap().complete);
        assert!(log.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_side_log_failure_does_not_fail_merge() {
        let dir = tempdir().unwrap();
        // A directory where the log file should be
        let blocked = dir.path().join("log");
        std::fs::create_dir(&blocked).unwrap();
        let merge = MergeStore::new(
            Arc::new(InMemoryRecordStore::new()),
            required(),
            Some(IncompleteLog::new(blocked)),
        );

        let partial = Record::new("Abies alba");
        assert!(merge.merge(&partial).await.is_ok());
    }
}
