//! In-memory browser used by unit tests
//!
//! A `FakeSite` serves one HTML document to every page. Navigation failures
//! and a "after play click" document can be scripted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{BrowserError, BrowserHandle, BrowserLauncher, PageDriver, PageOptions};

#[derive(Default)]
pub struct FakeSite {
    html: Mutex<String>,
    after_click: Mutex<Option<String>>,
    scripted_errors: Mutex<VecDeque<BrowserError>>,
    persistent_error: Mutex<Option<BrowserError>>,
    navigations: AtomicUsize,
    clicks: AtomicUsize,
    last_user_agent: Mutex<Option<String>>,
}

impl FakeSite {
    pub fn new(html: &str) -> Arc<Self> {
        let site = Self::default();
        site.set_html(html);
        Arc::new(site)
    }

    pub fn set_html(&self, html: &str) {
        *self.html.lock().unwrap() = html.to_string();
    }

    /// Document served once a play button has been clicked
    pub fn set_after_click(&self, html: &str) {
        *self.after_click.lock().unwrap() = Some(html.to_string());
    }

    /// Fail the next navigation with `error`
    pub fn push_navigation_error(&self, error: BrowserError) {
        self.scripted_errors.lock().unwrap().push_back(error);
    }

    /// Fail every navigation with `error`
    pub fn fail_all_navigations(&self, error: BrowserError) {
        *self.persistent_error.lock().unwrap() = Some(error);
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn last_user_agent(&self) -> Option<String> {
        self.last_user_agent.lock().unwrap().clone()
    }
}

pub struct FakeLauncher {
    site: Arc<FakeSite>,
    launches: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl FakeLauncher {
    pub fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            launches: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the first `count` launches fail
    pub fn failing_launches(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrowserError::Launch("chromium exited with status 1".to_string()));
        }
        Ok(Arc::new(FakeBrowser {
            site: Arc::clone(&self.site),
            alive: AtomicBool::new(true),
            open_pages: Arc::new(AtomicUsize::new(0)),
        }))
    }
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    alive: AtomicBool,
    open_pages: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self, options: &PageOptions) -> Result<Box<dyn PageDriver>, BrowserError> {
        if !self.is_alive() {
            return Err(BrowserError::Disconnected("browser closed".to_string()));
        }
        *self.site.last_user_agent.lock().unwrap() = Some(options.user_agent.clone());
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            document: Mutex::new(None),
            open_pages: Arc::clone(&self.open_pages),
        }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePage {
    site: Arc<FakeSite>,
    document: Mutex<Option<String>>,
    open_pages: Arc<AtomicUsize>,
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, _url: &str) -> Result<(), BrowserError> {
        self.site.navigations.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.site.scripted_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.site.persistent_error.lock().unwrap().clone() {
            return Err(error);
        }
        *self.document.lock().unwrap() = Some(self.site.html.lock().unwrap().clone());
        Ok(())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self
            .document
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "<html><head></head><body></body></html>".to_string()))
    }

    async fn click_play_button(&self) -> Result<bool, BrowserError> {
        self.site.clicks.fetch_add(1, Ordering::SeqCst);
        match self.site.after_click.lock().unwrap().clone() {
            Some(html) => {
                *self.document.lock().unwrap() = Some(html);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
