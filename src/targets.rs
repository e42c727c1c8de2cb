//! Target name sources.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// `[targets]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// Directory whose immediate subdirectory names are the targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Text file with one target per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("failed to read targets from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no target source configured (use --targets-dir, --targets-file or [targets])")]
    NotConfigured,
}

/// Where the ordered list of targets comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// Subdirectory names, sorted. Hidden entries are skipped.
    Directory(PathBuf),
    /// One target per line; blank lines and `#` comments are skipped.
    File(PathBuf),
    List(Vec<String>),
}

impl TargetSource {
    /// Load targets, dropping duplicates while keeping first-seen order.
    pub fn load(&self) -> Result<Vec<String>, TargetError> {
        let raw = match self {
            Self::Directory(path) => read_directory(path)?,
            Self::File(path) => read_file(path)?,
            Self::List(items) => items.clone(),
        };
        Ok(dedup(raw))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Directory(path) => format!("directory {}", path.display()),
            Self::File(path) => format!("file {}", path.display()),
            Self::List(items) => format!("{} listed targets", items.len()),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TargetError + '_ {
    move |source| TargetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_directory(path: &Path) -> Result<Vec<String>, TargetError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_error(path))? {
        let entry = entry.map_err(io_error(path))?;
        if !entry.file_type().map_err(io_error(path))?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name.starts_with('.') => continue,
            Ok(name) => names.push(name),
            Err(raw) => warn!("Skipping non-UTF-8 directory name {:?}", raw),
        }
    }
    names.sort();
    debug!("Found {} target directories in {}", names.len(), path.display());
    Ok(names)
}

fn read_file(path: &Path) -> Result<Vec<String>, TargetError> {
    let contents = std::fs::read_to_string(path).map_err(io_error(path))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn dedup(targets: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(targets.len());
    targets
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
