//! Fetching one target and classifying the result.
//!
//! Every network, timeout, block and parse failure is converted into an
//! [`Outcome`] here; nothing below this boundary reaches the scheduler as
//! an error.

mod browser;
mod classify;
mod http;

pub use browser::BrowserBackend;
pub use classify::Classifier;
pub use http::HttpBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{BackendKind, Config, SourceConfig, TARGET_PLACEHOLDER};
use crate::extract::{InvalidSelector, RecordExtractor, SelectorExtractor};
use crate::identity::Identity;
use crate::models::Outcome;

/// A loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    pub final_url: String,
    pub content: String,
    /// Messages from `alert`/`confirm`/`prompt` dialogs raised by the page.
    pub alerts: Vec<String>,
}

/// Backend-level failures.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    /// The fetch session itself is broken and must be recreated.
    #[error("session error: {0}")]
    Session(String),
}

impl BackendError {
    pub fn needs_reset(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Session(_))
    }
}

/// Loads pages for a given identity. Browser and plain HTTP backends are
/// interchangeable behind this trait.
#[async_trait]
pub trait PageBackend: Send {
    async fn load(&mut self, url: &str, identity: &Identity) -> Result<Page, BackendError>;

    /// Drop the current session; the next load starts a fresh one.
    async fn reset(&mut self) {}

    /// Release all resources.
    async fn close(&mut self) {
        self.reset().await;
    }

    fn name(&self) -> &'static str;
}

/// One fetch-and-extract attempt per call.
#[async_trait]
pub trait Fetcher: Send {
    async fn fetch(&mut self, target: &str, identity: &Identity) -> Outcome;

    /// Called before each batch with that batch's identity.
    async fn begin_batch(&mut self, _identity: &Identity) {}

    /// Release the fetch session. Called on every exit path of a run.
    async fn shutdown(&mut self) {}
}

/// Render a URL template for a target.
pub fn render_url(template: &str, target: &str) -> String {
    template.replace(TARGET_PLACEHOLDER, &urlencoding::encode(target))
}

/// [`Fetcher`] built from a page backend, a classifier and an extractor.
pub struct PageFetcher<B: PageBackend> {
    backend: B,
    url_template: String,
    classifier: Classifier,
    extractor: Arc<dyn RecordExtractor>,
    attempt_timeout: Duration,
    fresh_session_per_batch: bool,
}

impl<B: PageBackend> PageFetcher<B> {
    pub fn new(
        backend: B,
        source: &SourceConfig,
        extractor: Arc<dyn RecordExtractor>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            url_template: source.url_template.clone(),
            classifier: Classifier::new(source),
            extractor,
            attempt_timeout,
            fresh_session_per_batch: source.fresh_session_per_batch,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: PageBackend> Fetcher for PageFetcher<B> {
    async fn fetch(&mut self, target: &str, identity: &Identity) -> Outcome {
        let url = render_url(&self.url_template, target);
        debug!("Fetching {} via {}", url, self.backend.name());

        let loaded =
            match tokio::time::timeout(self.attempt_timeout, self.backend.load(&url, identity))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.attempt_timeout)),
            };

        let page = match loaded {
            Ok(page) => page,
            Err(e) => {
                if e.needs_reset() {
                    warn!("Recreating {} session after: {}", self.backend.name(), e);
                    self.backend.reset().await;
                }
                return Outcome::TransientError(e.to_string());
            }
        };

        if let Some(outcome) = self.classifier.classify(&page) {
            return outcome;
        }

        match self.extractor.extract(target, &page.content) {
            Ok(record) => Outcome::Success(record),
            Err(e) => Outcome::FatalError(format!("parse failure: {}", e)),
        }
    }

    async fn begin_batch(&mut self, _identity: &Identity) {
        if self.fresh_session_per_batch {
            self.backend.reset().await;
        }
    }

    async fn shutdown(&mut self) {
        self.backend.close().await;
    }
}

/// Build the configured fetcher.
pub fn build_fetcher(
    config: &Config,
    request_timeout: Duration,
) -> Result<Box<dyn Fetcher>, InvalidSelector> {
    let extractor: Arc<dyn RecordExtractor> = Arc::new(SelectorExtractor::new(&config.extractor)?);
    let attempt_timeout = config.harvest.attempt_timeout();

    Ok(match config.source.backend {
        BackendKind::Http => Box::new(PageFetcher::new(
            HttpBackend::new(request_timeout),
            &config.source,
            extractor,
            attempt_timeout,
        )),
        BackendKind::Browser => Box::new(PageFetcher::new(
            BrowserBackend::new(config.browser.clone()),
            &config.source,
            extractor,
            attempt_timeout,
        )),
    })
}
