//! In-process fakes for the network and browser seams

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::RenderError;
use crate::fetch::{RawPage, Renderer, Transport};

/// Replays queued responses in order, then the fallback (if any)
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Result<RawPage, String>>>,
    fallback: Option<Result<RawPage, String>>,
    requested: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with 200 whenever the queue is empty
    pub fn serving(html: &str) -> Self {
        Self {
            fallback: Some(Ok(page(200, html))),
            ..Self::default()
        }
    }

    /// Fail every request whenever the queue is empty
    pub fn failing(reason: &str) -> Self {
        Self {
            fallback: Some(Err(reason.to_string())),
            ..Self::default()
        }
    }

    pub fn push_html(&self, html: &str) {
        self.queue.lock().unwrap().push_back(Ok(page(200, html)));
    }

    pub fn push_status(&self, status: u16) {
        self.queue.lock().unwrap().push_back(Ok(page(status, "")));
    }

    pub fn push_error(&self, reason: &str) {
        self.queue.lock().unwrap().push_back(Err(reason.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

fn page(status: u16, html: &str) -> RawPage {
    RawPage {
        status,
        final_url: String::new(),
        body: html.to_string(),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<RawPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());

        let next = self.queue.lock().unwrap().pop_front();
        let response = next
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err("no scripted response".to_string()));

        response
            .map(|mut page| {
                page.final_url = url.to_string();
                page
            })
            .map_err(|reason| anyhow!(reason))
    }
}

pub struct FakeRenderer {
    html: Option<String>,
    calls: AtomicUsize,
    released: AtomicBool,
}

impl FakeRenderer {
    pub fn succeeding(html: &str) -> Self {
        Self {
            html: Some(html.to_string()),
            calls: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            html: None,
            calls: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.html.clone().ok_or_else(|| RenderError::Launch(format!("no browser for {url}")))
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
