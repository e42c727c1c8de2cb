//! Durable per-partition crawl progress.

use std::collections::BTreeSet;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a target within one state partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Pending,
    Completed,
    Failed,
}

/// Completed and failed target sets for one partition.
///
/// The two sets are kept disjoint by every mutator; a target in neither is
/// pending. This is the document persisted after every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlState {
    #[serde(default)]
    completed: BTreeSet<String>,
    #[serde(default)]
    failed: BTreeSet<String>,
    /// When the most recent batch finished.
    #[serde(
        default,
        alias = "last_batch_time",
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_batch_at: Option<DateTime<Utc>>,
    /// Number of batches cut short by a soft block.
    #[serde(default)]
    pub soft_block_aborts: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Epoch(f64),
}

/// Accepts RFC 3339, a naive ISO timestamp in local time, or epoch seconds.
/// A string in none of those forms reads as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<RawTimestamp> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| match raw {
        RawTimestamp::Text(text) => parse_timestamp(&text),
        RawTimestamp::Epoch(secs) => DateTime::from_timestamp_millis((secs * 1000.0) as i64),
    }))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn failed(&self) -> &BTreeSet<String> {
        &self.failed
    }

    pub fn status(&self, target: &str) -> TargetStatus {
        if self.completed.contains(target) {
            TargetStatus::Completed
        } else if self.failed.contains(target) {
            TargetStatus::Failed
        } else {
            TargetStatus::Pending
        }
    }

    pub fn is_pending(&self, target: &str) -> bool {
        self.status(target) == TargetStatus::Pending
    }

    /// Mark a target completed, removing it from the failed set.
    pub fn mark_completed(&mut self, target: &str) {
        self.failed.remove(target);
        self.completed.insert(target.to_string());
    }

    /// Mark a target failed, removing it from the completed set.
    pub fn mark_failed(&mut self, target: &str) {
        self.completed.remove(target);
        self.failed.insert(target.to_string());
    }

    /// Return failed targets to pending.
    pub fn clear_failed(&mut self) -> usize {
        let cleared = self.failed.len();
        self.failed.clear();
        cleared
    }

    pub fn record_soft_block_abort(&mut self) {
        self.soft_block_aborts += 1;
    }

    /// Pending targets in the order given.
    pub fn pending<'a>(&self, targets: &'a [String]) -> Vec<&'a str> {
        targets
            .iter()
            .map(|t| t.as_str())
            .filter(|t| self.is_pending(t))
            .collect()
    }

    /// Count of the given targets currently in the failed set.
    pub fn failed_among(&self, targets: &[String]) -> usize {
        targets.iter().filter(|t| self.failed.contains(*t)).count()
    }

    pub fn is_consistent(&self) -> bool {
        self.completed.is_disjoint(&self.failed)
    }

    /// Restore disjointness in a document written by hand or by an older
    /// tool. Completed wins. Returns the targets removed from `failed`.
    pub fn normalize(&mut self) -> Vec<String> {
        let overlap: Vec<String> = self.completed.intersection(&self.failed).cloned().collect();
        for target in &overlap {
            self.failed.remove(target);
        }
        overlap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_marks_keep_sets_disjoint() {
        let mut state = CrawlState::new();
        state.mark_failed("A");
        state.mark_completed("A");
        assert_eq!(state.status("A"), TargetStatus::Completed);
        assert!(state.failed().is_empty());

        state.mark_failed("A");
        assert_eq!(state.status("A"), TargetStatus::Failed);
        assert!(state.completed().is_empty());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_pending_preserves_target_order() {
        let mut state = CrawlState::new();
        state.mark_completed("A");
        state.mark_failed("B");
        let all = targets(&["D", "A", "C", "B"]);
        assert_eq!(state.pending(&all), vec!["D", "C"]);
    }

    #[test]
    fn test_normalize_prefers_completed() {
        let mut state: CrawlState =
            serde_json::from_str(r#"{"completed":["A","B"],"failed":["B","C"]}"#).unwrap();
        assert!(!state.is_consistent());
        assert_eq!(state.normalize(), vec!["B".to_string()]);
        assert!(state.is_consistent());
        assert_eq!(state.status("C"), TargetStatus::Failed);
    }

    #[test]
    fn test_missing_metadata_fields_default() {
        let state: CrawlState = serde_json::from_str(r#"{"completed":["A"]}"#).unwrap();
        assert_eq!(state.soft_block_aborts, 0);
        assert!(state.last_batch_at.is_none());
        assert!(state.failed().is_empty());
    }

    #[test]
    fn test_naive_last_batch_time_is_local() {
        let state: CrawlState = serde_json::from_str(
            r#"{"completed":[],"failed":[],"last_batch_time":"2024-06-10T14:03:27.123456"}"#,
        )
        .unwrap();
        let naive =
            NaiveDateTime::parse_from_str("2024-06-10T14:03:27.123456", "%Y-%m-%dT%H:%M:%S%.f")
                .unwrap();
        let expected = Local.from_local_datetime(&naive).earliest().unwrap();
        assert_eq!(state.last_batch_at, Some(expected.with_timezone(&Utc)));
    }

    #[test]
    fn test_last_batch_at_round_trips_and_tolerates_junk() {
        let mut state = CrawlState::new();
        state.last_batch_at = DateTime::from_timestamp(1_718_000_000, 0);
        let json = serde_json::to_string(&state).unwrap();
        let back: CrawlState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_batch_at, state.last_batch_at);

        let epoch: CrawlState = serde_json::from_str(r#"{"last_batch_time":1718000000}"#).unwrap();
        assert_eq!(epoch.last_batch_at, DateTime::from_timestamp(1_718_000_000, 0));

        let junk: CrawlState = serde_json::from_str(r#"{"last_batch_time":"yesterday"}"#).unwrap();
        assert!(junk.last_batch_at.is_none());
    }
}
