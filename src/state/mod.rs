//! Durable crawl state storage.

mod json_file;
mod memory;

pub use json_file::JsonStateFile;
pub use memory::MemoryStateStore;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::models::CrawlState;

/// Crawl state errors. Any of these is fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read crawl state {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("crawl state {} is not valid JSON: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write crawl state {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode crawl state: {0}")]
    Encode(serde_json::Error),
}

/// Load and save one crawl state partition.
#[async_trait]
pub trait CrawlStateStore: Send + Sync {
    /// Load the state, or an empty one if nothing was saved yet.
    async fn load(&self) -> Result<CrawlState, StateError>;

    /// Replace the saved state atomically.
    async fn save(&self, state: &CrawlState) -> Result<(), StateError>;

    fn describe(&self) -> String;
}
