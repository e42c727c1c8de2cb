//! JSON state file with atomic replace.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{CrawlStateStore, StateError};
use crate::models::CrawlState;

/// Crawl state kept in a small JSON document.
///
/// Saves write a temporary file in the same directory and rename it over
/// the target, so a crash leaves either the old or the new document.
#[derive(Debug, Clone)]
pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl CrawlStateStore for JsonStateFile {
    async fn load(&self) -> Result<CrawlState, StateError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No crawl state at {}, starting empty", self.path.display());
                return Ok(CrawlState::new());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut state: CrawlState =
            serde_json::from_str(&contents).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let overlap = state.normalize();
        if !overlap.is_empty() {
            warn!(
                "{} targets were both completed and failed in {}; keeping them completed",
                overlap.len(),
                self.path.display()
            );
        }
        Ok(state)
    }

    async fn save(&self, state: &CrawlState) -> Result<(), StateError> {
        let contents = serde_json::to_vec_pretty(state).map_err(StateError::Encode)?;
        let path = self.path.clone();
        // fsync and rename block, so keep them off the runtime threads
        tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e)))
            .map_err(|source| StateError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
