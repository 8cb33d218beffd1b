//! Configuration module for the episode scraper
//!
//! Handles loading environment variables and application configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::browser::BrowserConfig;
use crate::cache::DEFAULT_CACHE_TTL_MS;
use crate::scraper::ScraperConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Base URL of the episode source site
    pub base_url: String,
    /// Headless browser launch settings
    pub browser: BrowserConfig,
    /// Retry and extraction settings
    pub scraper: ScraperConfig,
    /// Result cache time-to-live in milliseconds
    pub cache_ttl_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Panics
    /// Panics if a numeric or boolean variable is set but cannot be parsed
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = BrowserConfig::default();
        let browser = BrowserConfig {
            chrome_executable: env::var("CHROME_EXECUTABLE").ok(),
            remote_url: env::var("BROWSER_WS_URL").ok(),
            headless: parse_var("BROWSER_HEADLESS", defaults.headless),
            no_sandbox: parse_var("BROWSER_NO_SANDBOX", defaults.no_sandbox),
            max_concurrent_pages: parse_var("MAX_CONCURRENT_PAGES", defaults.max_concurrent_pages),
            ..defaults
        };

        let defaults = ScraperConfig::default();
        let scraper = ScraperConfig {
            navigation_timeout: Duration::from_millis(parse_var(
                "NAVIGATION_TIMEOUT_MS",
                defaults.navigation_timeout.as_millis() as u64,
            )),
            max_retries: parse_var("SCRAPE_MAX_RETRIES", defaults.max_retries),
            backoff_base_ms: parse_var("SCRAPE_BACKOFF_MS", defaults.backoff_base_ms),
            ..defaults
        };

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080),
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "https://123animehub.cc".to_string()),
            browser,
            scraper,
            cache_ttl_ms: parse_var("CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS),
        }
    }
}

/// Read and parse an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a valid value, got {:?}", key, value)),
        Err(_) => default,
    }
}
