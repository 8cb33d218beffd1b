//! Episode stream resolution
//!
//! `EpisodeScraper` is the single entry point: it consults the result cache,
//! drives the shared browser to the episode page, runs candidate extraction
//! with bounded retries and turns every outcome into a `StreamingResult`.

pub mod extract;

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::{BrowserError, BrowserManager, PageDriver, PageOptions, RequestFilter};
use crate::cache::{ResultCache, DEFAULT_CACHE_TTL_MS};
use crate::models::StreamingResult;
use crate::parser::metadata::derive_metadata;
use crate::parser::{collect_debug_info, HostFilter};

pub use extract::{CandidateExtractor, ExtractConfig, Extraction};

/// Errors that can occur while resolving an episode
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScraperError {
    /// The episode URL is not an absolute http(s) URL
    #[error("Invalid episode URL: {0}")]
    InvalidUrl(String),

    /// A browser failure that was not retried
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// Retryable failures on every attempt
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: BrowserError },
}

/// Retry, timeout and extraction settings
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Timeout applied to navigation and every page operation
    pub navigation_timeout: Duration,
    /// Attempts of the navigate-and-extract sequence
    pub max_retries: u32,
    /// Linear backoff step in milliseconds
    pub backoff_base_ms: u64,
    /// Whether to rotate user agents
    pub rotate_user_agent: bool,
    pub extract: ExtractConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(6000),
            max_retries: 3,
            backoff_base_ms: 3000,
            rotate_user_agent: true,
            extract: ExtractConfig::default(),
        }
    }
}

/// Desktop Chromium user agents; the page is rendered by Chromium so only
/// Chromium builds are presented
const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Chrome on Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Resolves episode pages to streaming links
pub struct EpisodeScraper {
    browser: Arc<BrowserManager>,
    cache: Arc<ResultCache>,
    config: ScraperConfig,
    filter: HostFilter,
    request_filter: Arc<RequestFilter>,
    cache_ttl: Duration,
}

impl EpisodeScraper {
    /// Create a scraper with the default host lists and blocking rules
    pub fn new(browser: Arc<BrowserManager>, cache: Arc<ResultCache>, config: ScraperConfig) -> Self {
        Self {
            browser,
            cache,
            config,
            filter: HostFilter::default(),
            request_filter: Arc::new(RequestFilter::default()),
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_host_filter(mut self, filter: HostFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_request_filter(mut self, filter: RequestFilter) -> Self {
        self.request_filter = Arc::new(filter);
        self
    }

    /// Get a random user agent from the list
    fn get_user_agent(&self) -> &'static str {
        if self.config.rotate_user_agent {
            let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
            USER_AGENTS[idx]
        } else {
            USER_AGENTS[0]
        }
    }

    /// Linear backoff before attempt `attempt + 1`
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.backoff_base_ms * u64::from(attempt))
    }

    /// Resolve an episode page to its streaming link
    ///
    /// Never fails: every outcome, including browser errors, is reported
    /// through the returned result. Only successes are cached.
    pub async fn resolve_episode(&self, episode_url: &str) -> StreamingResult {
        let started = Instant::now();

        if let Some(hit) = self.cache.get(episode_url) {
            info!("Cache hit for {}", episode_url);
            return hit.served_from_cache(started.elapsed());
        }

        match self.scrape_with_retries(episode_url).await {
            Ok(Extraction { link: Some(link), html }) => {
                info!(
                    "Found valid streaming link: {}...",
                    link.chars().take(60).collect::<String>()
                );
                let meta = derive_metadata(episode_url, &html);
                let result = StreamingResult::found(episode_url, meta, link, started.elapsed());
                let purged = self.cache.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
                self.cache.set(episode_url, result.clone(), self.cache_ttl);
                result
            }
            Ok(Extraction { link: None, html }) => {
                let debug_info = collect_debug_info(&html);
                info!(
                    "No valid streaming link found for {} ({} iframes on page)",
                    episode_url, debug_info.total_iframes
                );
                let meta = derive_metadata(episode_url, &html);
                StreamingResult::not_found(episode_url, meta, debug_info, started.elapsed())
            }
            Err(e) => {
                error!("Error resolving episode {}: {}", episode_url, e);
                let meta = derive_metadata(episode_url, "");
                StreamingResult::unexpected(episode_url, meta, e.to_string(), started.elapsed())
            }
        }
    }

    async fn scrape_with_retries(&self, episode_url: &str) -> Result<Extraction, ScraperError> {
        validate_episode_url(episode_url)?;

        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.scrape_once(episode_url).await {
                Ok(extraction) => return Ok(extraction),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Retry {}/{} after error: {} (waiting {}ms)",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ScraperError::RetriesExhausted { attempts: attempt, last: e })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One navigate-and-extract pass on a fresh page
    async fn scrape_once(&self, episode_url: &str) -> Result<Extraction, BrowserError> {
        let browser = self.browser.get_browser().await?;
        let options = PageOptions {
            user_agent: self.get_user_agent().to_string(),
            timeout: self.config.navigation_timeout,
            request_filter: Arc::clone(&self.request_filter),
        };
        let lease = self.browser.prepare_page(&browser, &options).await?;

        let outcome = self.load_and_extract(lease.page(), episode_url).await;

        if let Err(e) = lease.close().await {
            warn!("Failed to close page: {}", e);
        }
        outcome
    }

    async fn load_and_extract(
        &self,
        page: &dyn PageDriver,
        episode_url: &str,
    ) -> Result<Extraction, BrowserError> {
        page.goto(episode_url).await?;
        CandidateExtractor::new(&self.config.extract, &self.filter)
            .run(page, episode_url)
            .await
    }
}

fn validate_episode_url(episode_url: &str) -> Result<(), ScraperError> {
    match Url::parse(episode_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(ScraperError::InvalidUrl(episode_url.to_string())),
    }
}
