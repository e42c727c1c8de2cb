//! Configuration management using the prefer crate for file discovery.

mod harvest;
pub mod presets;
mod source;

pub use harvest::{DelayRange, FactorRange, HarvestConfig, SoftBlockPolicy, DEFAULT_BATCH_SIZE};
pub use source::{BackendKind, BrowserSettings, SourceConfig, TARGET_PLACEHOLDER};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extract::ExtractorConfig;
use crate::identity::default_user_agents;
use crate::targets::{TargetSource, TargetsConfig};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "harvest.db";

/// Default forward-pass crawl state filename.
pub const DEFAULT_STATE_FILENAME: &str = "crawl_state.json";

/// Default recovery-pass crawl state filename.
pub const DEFAULT_RECOVERY_STATE_FILENAME: &str = "recovery_state.json";

/// Default incomplete-records side log filename.
pub const DEFAULT_INCOMPLETE_LOG_FILENAME: &str = "incomplete_records.jsonl";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {format} config {}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Forward-pass state file (defaults inside `data_dir`).
    pub state_file: Option<PathBuf>,
    /// Recovery-pass state file (defaults inside `data_dir`).
    pub recovery_state_file: Option<PathBuf>,
    /// Incomplete-records side log (defaults inside `data_dir`).
    pub incomplete_log: Option<PathBuf>,
    /// HTTP request timeout in seconds.
    pub request_timeout: u64,
    /// Where target names come from.
    pub targets: Option<TargetSource>,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: data dir -> home dir -> current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taxaharvest");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            state_file: None,
            recovery_state_file: None,
            incomplete_log: None,
            request_timeout: 30,
            targets: None,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_STATE_FILENAME))
    }

    pub fn recovery_state_path(&self) -> PathBuf {
        self.recovery_state_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_RECOVERY_STATE_FILENAME))
    }

    pub fn incomplete_log_path(&self) -> PathBuf {
        self.incomplete_log
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_INCOMPLETE_LOG_FILENAME))
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Forward-pass state file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
    /// Recovery-pass state file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_state_file: Option<String>,
    /// Incomplete-records side log path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_log: Option<String>,
    /// HTTP request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default = "presets::extractor")]
    pub extractor: ExtractorConfig,
    /// Fields that must be non-empty for a record to count as complete.
    #[serde(default = "presets::required_fields")]
    pub required_fields: Vec<String>,
    /// Identity pool, one user agent per entry.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: None,
            state_file: None,
            recovery_state_file: None,
            incomplete_log: None,
            request_timeout: None,
            harvest: HarvestConfig::default(),
            source: SourceConfig::default(),
            extractor: presets::extractor(),
            required_fields: presets::required_fields(),
            user_agents: default_user_agents(),
            targets: TargetsConfig::default(),
            browser: BrowserSettings::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer for file discovery.
    /// Missing config files fall back to defaults; unreadable ones are errors.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("taxaharvest").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    Self::load_from_path(path).await
                } else {
                    Ok(Self::default())
                }
            }
            Err(e) => {
                tracing::debug!("No config file discovered ({}), using defaults", e);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref state_file) = self.state_file {
            settings.state_file = Some(self.resolve_path(state_file, base_dir));
        }
        if let Some(ref recovery) = self.recovery_state_file {
            settings.recovery_state_file = Some(self.resolve_path(recovery, base_dir));
        }
        if let Some(ref log) = self.incomplete_log {
            settings.incomplete_log = Some(self.resolve_path(log, base_dir));
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ref dir) = self.targets.directory {
            settings.targets = Some(TargetSource::Directory(self.resolve_path(dir, base_dir)));
        } else if let Some(ref file) = self.targets.file {
            settings.targets = Some(TargetSource::File(self.resolve_path(file, base_dir)));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.harvest.validate()?;
        self.source.validate()?;
        if self.targets.directory.is_some() && self.targets.file.is_some() {
            return Err(ConfigError::Invalid(
                "targets.directory and targets.file are mutually exclusive".to_string(),
            ));
        }
        if self.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "user_agents must list at least one user agent".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for loading settings.
#[derive(Debug, Default)]
pub struct LoadOptions {
    /// Explicit config file path (skips discovery).
    pub config_path: Option<PathBuf>,
    /// Resolve relative paths from the current directory instead of the
    /// config file location.
    pub use_cwd: bool,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Load settings and config.
///
/// Precedence, lowest first: defaults, config file, `HARVEST_DATA_DIR`,
/// the `data_dir` option, `DATABASE_URL`.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await?,
    };
    config.validate()?;

    let mut settings = Settings::default();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd.clone()
    } else {
        config.base_dir().unwrap_or_else(|| cwd.clone())
    };

    config.apply_to_settings(&mut settings, &base_dir);

    if let Ok(dir) = std::env::var("HARVEST_DATA_DIR") {
        if !dir.is_empty() {
            settings.data_dir = config.resolve_path(&dir, &cwd);
        }
    }
    if let Some(dir) = options.data_dir {
        settings.data_dir = dir;
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.is_empty() {
            settings.database_url = Some(url);
        }
    }

    Ok((settings, config))
}
