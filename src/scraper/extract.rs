//! Click-and-poll candidate extraction over a loaded page
//!
//! Each attempt takes a DOM snapshot and runs the passive scan. Between
//! attempts a play-like button is clicked and the page is polled for a late
//! iframe until the poll window closes.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::browser::{BrowserError, PageDriver};
use crate::parser::{find_late_candidate, find_streaming_candidate, HostFilter};

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Passive scans per page
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// How long to poll after a click
    pub poll_window: Duration,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            poll_interval: Duration::from_millis(200),
            poll_window: Duration::from_millis(2000),
        }
    }
}

/// What extraction saw
#[derive(Debug, Clone)]
pub struct Extraction {
    pub link: Option<String>,
    /// Latest DOM snapshot, used for metadata and debug info
    pub html: String,
}

pub struct CandidateExtractor<'a> {
    config: &'a ExtractConfig,
    filter: &'a HostFilter,
}

impl<'a> CandidateExtractor<'a> {
    pub fn new(config: &'a ExtractConfig, filter: &'a HostFilter) -> Self {
        Self { config, filter }
    }

    /// Run the bounded passive scan / click / poll cycle on `page`
    ///
    /// Only errors that make the page unusable (timeouts, lost connection)
    /// are returned; a failed click or a failed poll snapshot is logged and
    /// the cycle continues.
    pub async fn run(&self, page: &dyn PageDriver, page_url: &str) -> Result<Extraction, BrowserError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut html = String::new();

        for attempt in 1..=max_attempts {
            html = page.content().await?;
            if let Some(link) = find_streaming_candidate(&html, page_url, self.filter) {
                debug!("Passive scan found a candidate on attempt {}", attempt);
                return Ok(Extraction { link: Some(link), html });
            }

            if attempt == max_attempts {
                break;
            }

            match page.click_play_button().await {
                Ok(true) => debug!("Clicked play button, polling for late iframe"),
                Ok(false) => debug!("No play button found, polling anyway"),
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => warn!("Play button click failed: {}", e),
            }

            if let Some(extraction) = self.poll(page, page_url).await? {
                return Ok(extraction);
            }
        }

        Ok(Extraction { link: None, html })
    }

    async fn poll(&self, page: &dyn PageDriver, page_url: &str) -> Result<Option<Extraction>, BrowserError> {
        let started = Instant::now();
        while started.elapsed() < self.config.poll_window {
            match page.content().await {
                Ok(html) => {
                    if let Some(link) = find_late_candidate(&html, page_url, self.filter) {
                        return Ok(Some(Extraction { link: Some(link), html }));
                    }
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => debug!("Poll snapshot failed: {}", e),
            }
            sleep(self.config.poll_interval).await;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakeSite};
    use crate::browser::{BrowserHandle, BrowserLauncher, PageOptions, RequestFilter};
    use std::sync::Arc;

    const PAGE: &str = "https://123animehub.cc/anime/one-piece/episode/42";
    const STREAM: &str = "https://bunnycdn.to/embed/one-piece-42-abcdef";

    fn options() -> PageOptions {
        PageOptions {
            user_agent: "test-agent".to_string(),
            timeout: Duration::from_secs(6),
            request_filter: Arc::new(RequestFilter::default()),
        }
    }

    async fn open(site: &Arc<FakeSite>) -> Box<dyn PageDriver> {
        let browser = FakeLauncher::new(Arc::clone(site)).launch().await.unwrap();
        let page = browser.new_page(&options()).await.unwrap();
        page.goto(PAGE).await.unwrap();
        page
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_scan_needs_no_click() {
        let site = FakeSite::new(&format!(r#"<iframe src="{}"></iframe>"#, STREAM));
        let page = open(&site).await;
        let config = ExtractConfig::default();
        let filter = HostFilter::default();

        let extraction = CandidateExtractor::new(&config, &filter).run(page.as_ref(), PAGE).await.unwrap();

        assert_eq!(extraction.link.as_deref(), Some(STREAM));
        assert_eq!(site.clicks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_reveals_late_iframe() {
        let site = FakeSite::new(r#"<button class="play-btn">Play</button>"#);
        site.set_after_click(&format!(r#"<iframe data-src="{}"></iframe>"#, STREAM));
        let page = open(&site).await;
        let config = ExtractConfig::default();
        let filter = HostFilter::default();

        let extraction = CandidateExtractor::new(&config, &filter).run(page.as_ref(), PAGE).await.unwrap();

        assert_eq!(extraction.link.as_deref(), Some(STREAM));
        assert_eq!(site.clicks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_found_after_poll_window() {
        let site = FakeSite::new(
            r#"<title>Episode 42</title><iframe src="https://googleads.g.doubleclick.net/pagead/ads"></iframe>"#,
        );
        let page = open(&site).await;
        let config = ExtractConfig::default();
        let filter = HostFilter::default();

        let started = Instant::now();
        let extraction = CandidateExtractor::new(&config, &filter).run(page.as_ref(), PAGE).await.unwrap();

        assert!(extraction.link.is_none());
        assert!(extraction.html.contains("Episode 42"));
        assert_eq!(site.clicks(), 1);
        assert!(started.elapsed() >= config.poll_window);
        assert!(started.elapsed() < config.poll_window * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_skips_click() {
        let site = FakeSite::new("<p>empty</p>");
        let page = open(&site).await;
        let config = ExtractConfig {
            max_attempts: 1,
            ..ExtractConfig::default()
        };
        let filter = HostFilter::default();

        let extraction = CandidateExtractor::new(&config, &filter).run(page.as_ref(), PAGE).await.unwrap();

        assert!(extraction.link.is_none());
        assert_eq!(site.clicks(), 0);
    }
}
