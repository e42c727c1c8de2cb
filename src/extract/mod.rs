//! Turning fetched page content into records.

mod selector;

pub use selector::{ExtractorConfig, FieldRule, SelectorExtractor};

use crate::models::Record;

/// Why content could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("page marker `{0}` not found")]
    MissingMarker(String),
    #[error("no fields could be extracted")]
    Empty,
    #[error("{0}")]
    Invalid(String),
}

/// A CSS selector in the extractor configuration did not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector `{selector}` for {context}: {message}")]
pub struct InvalidSelector {
    pub selector: String,
    pub context: String,
    pub message: String,
}

/// Site-specific extraction: page content in, record or parse failure out.
pub trait RecordExtractor: Send + Sync {
    fn extract(&self, target: &str, content: &str) -> Result<Record, ParseFailure>;
}
