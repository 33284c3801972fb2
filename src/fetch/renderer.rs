use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::RenderError;

/// Produces the fully rendered document for a URL
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;

    /// Drop any held browser. The next render starts a fresh one.
    async fn release(&self);
}

/// Headless Chrome renderer.
///
/// The browser is launched on first use and reused until `release` is
/// called or the renderer is dropped.
pub struct ChromeRenderer {
    browser: Mutex<Option<Browser>>,
    settle: Duration,
}

impl ChromeRenderer {
    pub fn new(settle: Duration) -> Self {
        Self {
            browser: Mutex::new(None),
            settle,
        }
    }

    fn browser(&self) -> Result<Browser, RenderError> {
        let mut slot = self
            .browser
            .lock()
            .map_err(|_| RenderError::Launch("browser slot poisoned".to_string()))?;

        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        info!("Launching headless Chrome...");
        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        let browser = Browser::new(options).map_err(|e| RenderError::Launch(e.to_string()))?;

        *slot = Some(browser.clone());
        Ok(browser)
    }

    fn render_blocking(browser: &Browser, url: &str, settle: Duration) -> Result<String, RenderError> {
        let page_err = |e: anyhow::Error| RenderError::Page {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let tab = browser.new_tab().map_err(page_err)?;
        tab.navigate_to(url).map_err(page_err)?;
        tab.wait_until_navigated().map_err(page_err)?;

        // Let client-side pricing widgets finish
        thread::sleep(settle);

        let html = tab.get_content().map_err(page_err)?;
        if let Err(e) = tab.close(true) {
            debug!(url = %url, error = %e, "Failed to close tab");
        }

        Ok(html)
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let browser = self.browser()?;
        let settle = self.settle;
        let target = url.to_string();

        let result = tokio::task::spawn_blocking(move || {
            Self::render_blocking(&browser, &target, settle)
        })
        .await
        .map_err(|e| RenderError::Page {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if result.is_err() {
            // A wedged browser is usually not worth keeping
            self.release().await;
        }
        result
    }

    async fn release(&self) {
        match self.browser.lock() {
            Ok(mut slot) => {
                if slot.take().is_some() {
                    info!("Headless Chrome released");
                }
            }
            Err(_) => warn!("Browser slot poisoned; nothing released"),
        }
    }
}
