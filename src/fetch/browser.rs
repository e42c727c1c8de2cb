//! Headless Chrome page backend.
//!
//! Uses chromiumoxide (CDP). Dialogs raised by the page are trapped before
//! any page script runs, so rate-limit popups surface as soft blocks
//! instead of hanging the session.

#[cfg(not(feature = "browser"))]
use crate::config::BrowserSettings;

#[cfg(feature = "browser")]
mod imp {
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
    use chromiumoxide::cdp::browser_protocol::page::{
        AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
    };
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    use crate::config::BrowserSettings;
    use crate::fetch::{BackendError, Page as LoadedPage, PageBackend};
    use crate::identity::Identity;

    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    const CHROME_COMMANDS: &[&str] = &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ];

    /// Installed on every new document before page scripts run.
    const DIALOG_TRAP_SCRIPT: &str = r#"
        (() => {
            window.__harvestAlerts = [];
            const trap = (fallback) => (message) => {
                window.__harvestAlerts.push(String(message === undefined ? '' : message));
                return fallback;
            };
            window.alert = trap(undefined);
            window.confirm = trap(false);
            window.prompt = trap(null);
        })();
    "#;

    const READ_ALERTS_SCRIPT: &str = "JSON.stringify(window.__harvestAlerts || [])";

    const STATUS_SCRIPT: &str = r#"
        (() => {
            const nav = performance.getEntriesByType('navigation')[0];
            return nav && nav.responseStatus ? nav.responseStatus : 0;
        })()
    "#;

    const WAIT_FOR_READY_SCRIPT: &str = r#"
        new Promise((resolve) => {
            if (document.readyState === 'complete' || document.readyState === 'interactive') {
                resolve(document.readyState);
            } else {
                document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                setTimeout(() => resolve('timeout'), 10000);
            }
        })
    "#;

    fn session_error(context: &str) -> impl FnOnce(chromiumoxide::error::CdpError) -> BackendError + '_ {
        move |e| BackendError::Session(format!("{}: {}", context, e))
    }

    /// Browser-based page backend.
    pub struct BrowserBackend {
        settings: BrowserSettings,
        browser: Option<Browser>,
        handler: Option<JoinHandle<()>>,
    }

    impl BrowserBackend {
        pub fn new(settings: BrowserSettings) -> Self {
            Self {
                settings,
                browser: None,
                handler: None,
            }
        }

        fn find_chrome(&self) -> Result<PathBuf, BackendError> {
            if let Some(ref path) = self.settings.chrome_path {
                let expanded = shellexpand::tilde(path);
                return Ok(PathBuf::from(expanded.as_ref()));
            }

            for path in CHROME_PATHS {
                let p = std::path::Path::new(path);
                if p.exists() {
                    info!("Found Chrome at: {}", path);
                    return Ok(p.to_path_buf());
                }
            }

            for cmd in CHROME_COMMANDS {
                if let Ok(path) = which::which(cmd) {
                    info!("Found Chrome in PATH: {}", path.display());
                    return Ok(path);
                }
            }

            Err(BackendError::Session(
                "Chrome/Chromium not found; install it or set browser.chrome_path".to_string(),
            ))
        }

        async fn ensure_browser(&mut self) -> Result<&Browser, BackendError> {
            if self.browser.is_none() {
                info!("Launching browser (headless={})", self.settings.headless);
                let chrome_path = self.find_chrome()?;

                let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
                // with_head means NOT headless
                if !self.settings.headless {
                    builder = builder.with_head();
                }
                builder = builder
                    .arg("--disable-blink-features=AutomationControlled")
                    .arg("--disable-infobars")
                    .arg("--disable-dev-shm-usage")
                    .arg("--no-first-run")
                    .arg("--no-default-browser-check")
                    .arg("--no-sandbox")
                    .arg("--disable-gpu");
                for arg in &self.settings.chrome_args {
                    builder = builder.arg(arg);
                }

                let config = builder
                    .build()
                    .map_err(|e| BackendError::Session(format!("invalid browser config: {}", e)))?;
                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(session_error("failed to launch browser"))?;

                self.handler = Some(tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if event.is_err() {
                            break;
                        }
                    }
                }));
                self.browser = Some(browser);
            }

            self.browser
                .as_ref()
                .ok_or_else(|| BackendError::Session("browser not initialized".to_string()))
        }

        /// Page cleanup handled by caller.
        async fn load_inner(
            &self,
            page: &Page,
            url: &str,
            identity: &Identity,
        ) -> Result<LoadedPage, BackendError> {
            page.execute(SetUserAgentOverrideParams::new(identity.user_agent.clone()))
                .await
                .map_err(session_error("failed to set user agent"))?;
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(DIALOG_TRAP_SCRIPT))
                .await
                .map_err(session_error("failed to install dialog trap"))?;

            let nav_params = NavigateParams::builder()
                .url(url)
                .build()
                .map_err(|e| BackendError::Network(format!("invalid URL {}: {}", url, e)))?;
            let navigation = page
                .execute(nav_params)
                .await
                .map_err(session_error("navigation failed"))?;
            if let Some(ref error_text) = navigation.result.error_text {
                return Err(BackendError::Network(format!("{}: {}", url, error_text)));
            }

            if let Err(e) = page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()).await {
                debug!("Could not check ready state: {}", e);
            }
            if self.settings.settle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.settle_ms)).await;
            }
            if let Some(ref selector) = self.settings.ready_selector {
                if let Err(e) = page.find_element(selector.as_str()).await {
                    debug!("Ready selector {} not found: {}", selector, e);
                }
            }

            let alerts = match page.evaluate(READ_ALERTS_SCRIPT.to_string()).await {
                Ok(result) => {
                    let raw: String = result.into_value().unwrap_or_else(|_| "[]".to_string());
                    serde_json::from_str::<Vec<String>>(&raw).unwrap_or_default()
                }
                Err(e) => {
                    warn!("Could not read trapped dialogs: {}", e);
                    Vec::new()
                }
            };
            let status = match page.evaluate(STATUS_SCRIPT.to_string()).await {
                Ok(result) => result.into_value::<u16>().ok().filter(|s| *s > 0).unwrap_or(200),
                Err(_) => 200,
            };

            let final_url = page
                .url()
                .await
                .map_err(session_error("failed to read page URL"))?
                .map(|u| u.to_string())
                .unwrap_or_else(|| url.to_string());
            let content = page
                .content()
                .await
                .map_err(session_error("failed to read page content"))?;

            Ok(LoadedPage {
                status,
                final_url,
                content,
                alerts,
            })
        }
    }

    #[async_trait]
    impl PageBackend for BrowserBackend {
        async fn load(
            &mut self,
            url: &str,
            identity: &Identity,
        ) -> Result<LoadedPage, BackendError> {
            let browser = self.ensure_browser().await?;
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(session_error("failed to open page"))?;

            // Use inner function to ensure page is always closed
            let result = self.load_inner(&page, url, identity).await;
            let _ = page.close().await;
            result
        }

        async fn reset(&mut self) {
            if let Some(mut browser) = self.browser.take() {
                debug!("Closing browser session");
                if let Err(e) = browser.close().await {
                    debug!("Browser close failed: {}", e);
                }
                let _ = browser.wait().await;
            }
            if let Some(handler) = self.handler.take() {
                handler.abort();
            }
        }

        fn name(&self) -> &'static str {
            "browser"
        }
    }
}

#[cfg(feature = "browser")]
pub use imp::BrowserBackend;

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserBackend {
    #[allow(dead_code)]
    settings: BrowserSettings,
}

#[cfg(not(feature = "browser"))]
impl BrowserBackend {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl super::PageBackend for BrowserBackend {
    async fn load(
        &mut self,
        _url: &str,
        _identity: &crate::identity::Identity,
    ) -> Result<super::Page, super::BackendError> {
        Err(super::BackendError::Session(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
