//! Page fetching under bot detection: retried static requests with optional
//! escalation to a headless browser

mod renderer;
mod retry;
mod transport;

pub use renderer::{ChromeRenderer, Renderer};
pub use retry::{RetryPolicy, is_bot_block};
pub use transport::{HttpTransport, RawPage, Transport};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, warn};

use crate::error::{FetchError, RenderError};

/// Markers of interstitial and challenge pages served instead of content
const BLOCK_MARKERS: &[&str] = &[
    "captcha",
    "cf-chl",
    "attention required",
    "access denied",
    "please enable javascript",
    "are you a robot",
    "unusual traffic",
];

/// A document ready for extraction
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    pub rendered: bool,
}

pub struct FetchClient {
    transport: Arc<dyn Transport>,
    renderer: Option<Arc<dyn Renderer>>,
    policy: RetryPolicy,
    failure_limit: u32,
    render_failures: AtomicU32,
    degraded: AtomicBool,
}

impl FetchClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            renderer: None,
            policy,
            failure_limit: 2,
            render_failures: AtomicU32::new(0),
            degraded: AtomicBool::new(false),
        }
    }

    /// Enable headless escalation. After `failure_limit` consecutive render
    /// failures the client stays static-only for the rest of its life.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>, failure_limit: u32) -> Self {
        self.renderer = Some(renderer);
        self.failure_limit = failure_limit.max(1);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn headless_available(&self) -> bool {
        self.renderer.is_some() && !self.degraded.load(Ordering::Acquire)
    }

    /// Static fetch, escalating to headless rendering when the static path
    /// fails outright or comes back looking like a bot wall.
    pub async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedPage, FetchError> {
        match self.fetch_static(url, headers).await {
            Ok(page) if self.headless_available() && looks_blocked(&page.html) => {
                info!(url = %url, "Static page looks bot-blocked, escalating to headless");
                match self.render(url).await {
                    Ok(rendered) => Ok(rendered),
                    Err(e) => {
                        debug!(url = %url, error = %e, "Headless escalation failed, keeping static page");
                        Ok(page)
                    }
                }
            }
            Ok(page) => Ok(page),
            Err(fetch_err) if self.headless_available() => {
                info!(url = %url, "Static fetch exhausted, escalating to headless");
                self.render(url).await.map_err(|render_err| {
                    warn!(url = %url, error = %render_err, "Headless escalation failed");
                    fetch_err
                })
            }
            Err(fetch_err) => Err(fetch_err),
        }
    }

    /// Headless first, static on render failure. Used by sources whose
    /// prices are filled in client-side.
    pub async fn fetch_rendered_first(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if self.headless_available() {
            match self.render(url).await {
                Ok(page) => return Ok(page),
                Err(e) => warn!(url = %url, error = %e, "Headless render failed, falling back to static fetch"),
            }
        }
        self.fetch_static(url, &[]).await
    }

    /// Static fetch with retry and exponential backoff.
    ///
    /// Every non-2xx status is retried; 401/403 are reported as bot detection.
    pub async fn fetch_static(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedPage, FetchError> {
        let mut reason = String::from("no attempt made");

        for attempt in 1..=self.policy.max_attempts {
            match self.transport.get(url, headers).await {
                Ok(page) if page.is_success() => {
                    debug!(url = %url, attempt, bytes = page.body.len(), "Fetched page");
                    return Ok(FetchedPage {
                        url: page.final_url,
                        html: page.body,
                        rendered: false,
                    });
                }
                Ok(page) => {
                    reason = format!("HTTP {}", page.status);
                    if is_bot_block(page.status) {
                        warn!(
                            url = %url,
                            attempt,
                            max = self.policy.max_attempts,
                            status = page.status,
                            "Bot detection triggered"
                        );
                    } else {
                        warn!(
                            url = %url,
                            attempt,
                            max = self.policy.max_attempts,
                            status = page.status,
                            "Fetch attempt returned an error status"
                        );
                    }
                }
                Err(e) => {
                    reason = e.to_string();
                    warn!(
                        url = %url,
                        attempt,
                        max = self.policy.max_attempts,
                        error = %e,
                        "Fetch attempt failed"
                    );
                }
            }

            if let Some(delay) = self.policy.delay_after(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError {
            url: url.to_string(),
            attempts: self.policy.max_attempts,
            reason,
        })
    }

    /// Drop the headless browser, if one is running
    pub async fn release(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.release().await;
        }
    }

    async fn render(&self, url: &str) -> Result<FetchedPage, RenderError> {
        let renderer = match &self.renderer {
            Some(renderer) if self.headless_available() => renderer,
            _ => return Err(RenderError::Disabled),
        };

        match renderer.render(url).await {
            Ok(html) => {
                self.render_failures.store(0, Ordering::Release);
                Ok(FetchedPage {
                    url: url.to_string(),
                    html,
                    rendered: true,
                })
            }
            Err(e) => {
                let failures = self.render_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.failure_limit && !self.degraded.swap(true, Ordering::AcqRel) {
                    warn!(
                        failures,
                        "Headless rendering keeps failing; continuing with static fetch only"
                    );
                    renderer.release().await;
                }
                Err(e)
            }
        }
    }
}

/// Whether a successfully fetched page is really a challenge or empty shell
pub fn looks_blocked(html: &str) -> bool {
    if html.trim().is_empty() {
        return true;
    }
    let lower = html.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lower.contains(marker))
}
