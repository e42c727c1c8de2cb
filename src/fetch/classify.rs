//! Page classification into outcomes.

use crate::config::SourceConfig;
use crate::models::Outcome;

use super::Page;

/// Decides whether a loaded page is a block, a miss or a record page.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    not_found_phrases: Vec<String>,
    block_phrases: Vec<String>,
    block_statuses: Vec<u16>,
    not_found_statuses: Vec<u16>,
}

impl Classifier {
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            not_found_phrases: source.not_found_phrases.clone(),
            block_phrases: source.block_phrases.clone(),
            block_statuses: source.block_statuses.clone(),
            not_found_statuses: source.not_found_statuses.clone(),
        }
    }

    /// Outcome for pages that should not reach the extractor, or `None`
    /// when the content looks like a record page.
    ///
    /// Block signals are checked before not-found signals: a quota page
    /// must never be mistaken for a missing target.
    pub fn classify(&self, page: &Page) -> Option<Outcome> {
        if let Some(alert) = page.alerts.first() {
            return Some(Outcome::SoftBlocked(format!("page alert: {}", alert)));
        }
        if self.block_statuses.contains(&page.status) {
            return Some(Outcome::SoftBlocked(format!("HTTP {}", page.status)));
        }
        if let Some(phrase) = self
            .block_phrases
            .iter()
            .find(|p| page.content.contains(p.as_str()))
        {
            return Some(Outcome::SoftBlocked(format!("block phrase `{}`", phrase)));
        }
        if self.not_found_statuses.contains(&page.status)
            || self
                .not_found_phrases
                .iter()
                .any(|p| page.content.contains(p.as_str()))
        {
            return Some(Outcome::NotFound);
        }
        if page.status >= 500 {
            return Some(Outcome::TransientError(format!("HTTP {}", page.status)));
        }
        if page.status >= 400 {
            return Some(Outcome::FatalError(format!("HTTP {}", page.status)));
        }
        None
    }
}
