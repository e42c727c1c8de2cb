//! Plain HTTP page backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{BackendError, Page, PageBackend};
use crate::identity::Identity;

/// reqwest-based backend. One client (and cookie jar) per identity.
pub struct HttpBackend {
    timeout: Duration,
    client: Option<(String, Client)>,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: None,
        }
    }

    fn client_for(&mut self, identity: &Identity) -> Result<Client, BackendError> {
        if let Some((ua, client)) = &self.client {
            if *ua == identity.user_agent {
                return Ok(client.clone());
            }
        }

        debug!("Creating HTTP client for new identity");
        let client = Client::builder()
            .user_agent(identity.user_agent.clone())
            .timeout(self.timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| BackendError::Session(format!("failed to build HTTP client: {}", e)))?;
        self.client = Some((identity.user_agent.clone(), client.clone()));
        Ok(client)
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::Network(e.to_string())
    }
}

#[async_trait]
impl PageBackend for HttpBackend {
    async fn load(&mut self, url: &str, identity: &Identity) -> Result<Page, BackendError> {
        let client = self.client_for(identity)?;
        let timeout = self.timeout;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        Ok(Page {
            status,
            final_url,
            content,
            alerts: Vec::new(),
        })
    }

    async fn reset(&mut self) {
        self.client = None;
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
