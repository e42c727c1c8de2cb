//! Harvested records and their stored form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record extracted for one target.
///
/// Field names are defined by the extractor. A field only counts toward
/// completeness when its value is non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value, treating blank values as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Required fields that are missing or blank.
    pub fn missing_fields<'a, S: AsRef<str>>(&self, required: &'a [S]) -> Vec<&'a str> {
        required
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| self.field(name).is_none())
            .collect()
    }

    /// Whether every required field is present and non-empty.
    pub fn is_complete<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.missing_fields(required).is_empty()
    }
}

/// The best record seen so far for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub fields: BTreeMap<String, String>,
    pub complete: bool,
    pub updated_at: DateTime<Utc>,
}

/// Completeness dominance: an incoming record replaces the stored one
/// unless the stored record is complete and the incoming one is not.
pub fn supersedes(existing_complete: bool, incoming_complete: bool) -> bool {
    !existing_complete || incoming_complete
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: &[&str] = &["chinese_name", "family", "genus", "description"];

    fn rosa() -> Record {
        Record::new("Rosa chinensis")
            .with_field("chinese_name", "月季花")
            .with_field("family", "蔷薇科 Rosaceae")
            .with_field("genus", "蔷薇属 Rosa")
            .with_field("description", "直立灌木")
    }

    #[test]
    fn test_complete_when_all_required_present() {
        assert!(rosa().is_complete(REQUIRED));
    }

    #[test]
    fn test_blank_field_counts_as_missing() {
        let record = rosa().with_field("genus", "   ");
        assert!(!record.is_complete(REQUIRED));
        assert_eq!(record.missing_fields(REQUIRED), vec!["genus"]);
        assert_eq!(record.field("genus"), None);
    }

    #[test]
    fn test_no_required_fields_is_always_complete() {
        let empty: &[&str] = &[];
        assert!(Record::new("Abies alba").is_complete(empty));
    }

    #[test]
    fn test_supersedes_truth_table() {
        assert!(supersedes(false, false));
        assert!(supersedes(false, true));
        assert!(supersedes(true, true));
        assert!(!supersedes(true, false));
    }
}
