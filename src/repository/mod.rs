//! Keyed record storage.
//!
//! The dominance rule (never replace a complete record with an incomplete
//! one) is enforced inside each store's upsert so concurrent writers on the
//! same key cannot violate it.

mod diesel_records;
mod memory;
pub mod migrations;
pub mod pool;
pub mod util;

pub use diesel_records::DieselRecordStore;
pub use memory::InMemoryRecordStore;
pub use migrations::run_migrations;
pub use pool::{DbError, SqlitePool};
pub use util::parse_datetime;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::models::{Record, StoredRecord};

/// Data store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("stored fields for `{key}` are not valid JSON: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to encode fields for `{key}`: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    /// An incomplete record was refused in favour of a stored complete one.
    KeptComplete,
    /// The stored record already had these exact fields and completeness.
    Unchanged,
}

impl MergeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::KeptComplete => "kept_complete",
            Self::Unchanged => "unchanged",
        }
    }

    pub fn wrote(&self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

/// Stored record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub total: u64,
    pub complete: u64,
}

/// Durable keyed store with point lookup and an atomic conditional upsert.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError>;

    async fn keys(&self) -> Result<HashSet<String>, StoreError>;

    /// Insert or replace `record` under the dominance rule. Zero or one
    /// write per call.
    async fn upsert(&self, record: &Record, complete: bool) -> Result<MergeOutcome, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}

/// Classify an upsert that was refused or applied, given what was stored
/// before it.
pub(crate) fn merge_outcome(
    existing: Option<&StoredRecord>,
    record: &Record,
    complete: bool,
) -> MergeOutcome {
    match existing {
        None => MergeOutcome::Inserted,
        Some(stored) if stored.fields == record.fields && stored.complete == complete => {
            MergeOutcome::Unchanged
        }
        Some(stored) if !crate::models::supersedes(stored.complete, complete) => {
            MergeOutcome::KeptComplete
        }
        Some(_) => MergeOutcome::Updated,
    }
}
