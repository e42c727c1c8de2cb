//! In-memory crawl state store that keeps every saved snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CrawlStateStore, StateError};
use crate::models::CrawlState;

#[derive(Debug, Default)]
struct Inner {
    current: CrawlState,
    history: Vec<CrawlState>,
    /// Saves allowed before every further save fails.
    fail_after: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CrawlState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: state,
                ..Default::default()
            })),
        }
    }

    /// Make saves fail once `saves` more have succeeded.
    pub async fn fail_after(&self, saves: usize) {
        let mut inner = self.inner.lock().await;
        inner.fail_after = Some(inner.history.len() + saves);
    }

    pub async fn current(&self) -> CrawlState {
        self.inner.lock().await.current.clone()
    }

    /// Every state passed to `save`, in order.
    pub async fn history(&self) -> Vec<CrawlState> {
        self.inner.lock().await.history.clone()
    }
}

#[async_trait]
impl CrawlStateStore for MemoryStateStore {
    async fn load(&self) -> Result<CrawlState, StateError> {
        Ok(self.inner.lock().await.current.clone())
    }

    async fn save(&self, state: &CrawlState) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_after.is_some_and(|limit| inner.history.len() >= limit) {
            return Err(StateError::Write {
                path: "<memory>".into(),
                source: std::io::Error::other("simulated write failure"),
            });
        }
        inner.current = state.clone();
        inner.history.push(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
