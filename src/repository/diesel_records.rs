//! Diesel-backed record store.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use diesel_async::RunQueryDsl;

use super::pool::SqlitePool;
use super::util::parse_datetime;
use super::{merge_outcome, MergeOutcome, RecordStore, StoreCounts, StoreError};
use crate::models::{Record, StoredRecord};
use crate::schema::records;

/// Conditional upsert. The WHERE clause is the dominance rule plus an
/// identical-content check, so a refused or redundant write changes no rows.
const UPSERT_SQL: &str = r#"
    INSERT INTO records (key, fields, complete, updated_at) VALUES (?, ?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        fields = excluded.fields,
        complete = excluded.complete,
        updated_at = excluded.updated_at
    WHERE (records.complete = 0 OR excluded.complete = 1)
      AND (records.fields != excluded.fields OR records.complete != excluded.complete)
"#;

/// Record row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordRow {
    pub key: String,
    pub fields: String,
    pub complete: i32,
    pub updated_at: String,
}

impl TryFrom<RecordRow> for StoredRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let fields: BTreeMap<String, String> =
            serde_json::from_str(&row.fields).map_err(|source| StoreError::Corrupt {
                key: row.key.clone(),
                source,
            })?;
        Ok(StoredRecord {
            key: row.key,
            fields,
            complete: row.complete != 0,
            updated_at: parse_datetime(&row.updated_at),
        })
    }
}

/// SQLite record store.
#[derive(Clone)]
pub struct DieselRecordStore {
    pool: SqlitePool,
}

impl DieselRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for DieselRecordStore {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row = records::table
            .find(key)
            .select(RecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(StoredRecord::try_from).transpose()
    }

    async fn keys(&self) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let keys: Vec<String> = records::table
            .select(records::key)
            .load(&mut conn)
            .await?;
        Ok(keys.into_iter().collect())
    }

    async fn upsert(&self, record: &Record, complete: bool) -> Result<MergeOutcome, StoreError> {
        let fields = serde_json::to_string(&record.fields).map_err(|source| StoreError::Encode {
            key: record.key.clone(),
            source,
        })?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.pool.get().await?;

        // Read only to label the outcome; the write below decides on its own.
        let existing = records::table
            .find(&record.key)
            .select(RecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(StoredRecord::try_from)
            .transpose()?;

        let affected = diesel::sql_query(UPSERT_SQL)
            .bind::<Text, _>(&record.key)
            .bind::<Text, _>(&fields)
            .bind::<Integer, _>(complete as i32)
            .bind::<Text, _>(&now)
            .execute(&mut conn)
            .await?;

        Ok(match (affected, existing.as_ref()) {
            (0, stored) => match merge_outcome(stored, record, complete) {
                MergeOutcome::KeptComplete => MergeOutcome::KeptComplete,
                _ => MergeOutcome::Unchanged,
            },
            (_, None) => MergeOutcome::Inserted,
            (_, Some(_)) => MergeOutcome::Updated,
        })
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let total: i64 = records::table
            .select(count_star())
            .first(&mut conn)
            .await?;
        let complete: i64 = records::table
            .filter(records::complete.eq(1))
            .select(count_star())
            .first(&mut conn)
            .await?;
        Ok(StoreCounts {
            total: total as u64,
            complete: complete as u64,
        })
    }
}
