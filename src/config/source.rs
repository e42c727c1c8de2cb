//! Where and how targets are fetched.

use serde::{Deserialize, Serialize};

use super::{presets, ConfigError};

/// Placeholder replaced by the URL-encoded target name.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Fetch backend used by the page fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Plain HTTP client.
    Http,
    /// Headless Chrome over CDP.
    Browser,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "browser") {
            Self::Browser
        } else {
            Self::Http
        }
    }
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Page URL with a `{target}` placeholder.
    #[serde(default = "presets::url_template")]
    pub url_template: String,
    #[serde(default)]
    pub backend: BackendKind,
    /// Body phrases meaning the target does not exist.
    #[serde(default = "presets::not_found_phrases")]
    pub not_found_phrases: Vec<String>,
    /// Body phrases meaning the client is rate limited or blocked.
    #[serde(default = "presets::block_phrases")]
    pub block_phrases: Vec<String>,
    #[serde(default = "presets::block_statuses")]
    pub block_statuses: Vec<u16>,
    #[serde(default = "presets::not_found_statuses")]
    pub not_found_statuses: Vec<u16>,
    /// Start every batch with a fresh fetch session.
    #[serde(default = "default_true")]
    pub fresh_session_per_batch: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template: presets::url_template(),
            backend: BackendKind::default(),
            not_found_phrases: presets::not_found_phrases(),
            block_phrases: presets::block_phrases(),
            block_statuses: presets::block_statuses(),
            not_found_statuses: presets::not_found_statuses(),
            fresh_session_per_batch: true,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url_template.contains(TARGET_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "source.url_template must contain {}",
                TARGET_PLACEHOLDER
            )));
        }
        let sample = self.url_template.replace(TARGET_PLACEHOLDER, "sample");
        url::Url::parse(&sample).map_err(|e| {
            ConfigError::Invalid(format!(
                "source.url_template `{}` is not a valid URL: {}",
                self.url_template, e
            ))
        })?;
        Ok(())
    }
}

fn default_settle_ms() -> u64 {
    500
}

/// `[browser]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Chrome binary; searched for when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,
    /// Wait for this selector after navigation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_selector: Option<String>,
    /// Extra wait after the page reports ready, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            chrome_args: Vec::new(),
            ready_selector: None,
            settle_ms: default_settle_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_is_valid() {
        assert!(SourceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let config = SourceConfig {
            url_template: "https://example.org/info".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_template_must_be_url() {
        let config = SourceConfig {
            url_template: "not a url {target}".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
