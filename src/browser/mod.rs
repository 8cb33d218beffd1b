//! Headless browser abstraction
//!
//! The scraper only talks to the browser through the three traits defined
//! here, so the Chromium implementation in [`chrome`] can be swapped for an
//! in-memory double in tests.

pub mod blocking;
pub mod chrome;
pub mod manager;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use blocking::{RequestFilter, ResourceKind};
pub use chrome::ChromeLauncher;
pub use manager::{BrowserManager, PageLease};

/// Errors raised by the browser layer
///
/// Retryability is part of the variant, not of the message text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    /// The browser process could not be started or connected to
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// Navigation did not reach DOMContentLoaded in time
    #[error("Navigation timed out after {0} ms")]
    NavigationTimeout(u64),

    /// The page failed to load (DNS, connection reset, aborted frame)
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The page, target or browser connection went away
    #[error("Browser disconnected: {0}")]
    Disconnected(String),

    /// A script evaluated in the page threw or returned garbage
    #[error("Page evaluation failed: {0}")]
    Evaluation(String),

    /// Any other DevTools protocol failure
    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Transient failures worth another navigate+extract round
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrowserError::NavigationTimeout(_)
                | BrowserError::Navigation(_)
                | BrowserError::Disconnected(_)
        )
    }
}

/// Launch settings for the shared browser process
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Pass `--no-sandbox`; needed when running as root inside containers
    pub no_sandbox: bool,
    /// Explicit Chromium executable, otherwise auto-detected
    pub chrome_executable: Option<String>,
    /// DevTools endpoint of an already running browser
    pub remote_url: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    /// Upper bound on simultaneously open pages
    pub max_concurrent_pages: usize,
    /// How long to wait for the process to come up
    pub launch_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: false,
            chrome_executable: None,
            remote_url: None,
            window_width: 1280,
            window_height: 720,
            max_concurrent_pages: 4,
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// Per-page settings applied when a page is opened
#[derive(Debug, Clone)]
pub struct PageOptions {
    /// User agent override for every request of the page
    pub user_agent: String,
    /// Timeout for navigation and every DOM operation
    pub timeout: Duration,
    /// Requests matching this filter are aborted
    pub request_filter: Arc<RequestFilter>,
}

/// Starts (or connects to) a browser
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, BrowserError>;
}

/// A running browser shared by all requests
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a fresh tab with user agent, timeouts and request blocking installed
    async fn new_page(&self, options: &PageOptions) -> Result<Box<dyn PageDriver>, BrowserError>;

    /// False once the connection to the process has been lost
    fn is_alive(&self) -> bool;

    /// Pages opened through this handle and not yet closed
    fn open_pages(&self) -> usize;

    /// Shut the browser down
    async fn close(&self) -> Result<(), BrowserError>;
}

/// One tab of the shared browser
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for DOMContentLoaded
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Serialized DOM of the current document
    async fn content(&self) -> Result<String, BrowserError>;

    /// Click the first element whose text suggests play/load/watch.
    /// Returns whether anything was clicked.
    async fn click_play_button(&self) -> Result<bool, BrowserError>;

    /// Close the tab
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BrowserError::NavigationTimeout(6000).is_retryable());
        assert!(BrowserError::Navigation("net::ERR_CONNECTION_RESET".into()).is_retryable());
        assert!(BrowserError::Disconnected("target closed".into()).is_retryable());

        assert!(!BrowserError::Launch("no executable".into()).is_retryable());
        assert!(!BrowserError::Evaluation("ReferenceError".into()).is_retryable());
        assert!(!BrowserError::Protocol("bad params".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = BrowserError::NavigationTimeout(6000);
        assert_eq!(format!("{}", error), "Navigation timed out after 6000 ms");
    }

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(!config.no_sandbox);
        assert_eq!(config.max_concurrent_pages, 4);
        assert!(config.remote_url.is_none());
    }
}
