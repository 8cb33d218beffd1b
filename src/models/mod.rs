//! Data models for the episode stream API
//!
//! `StreamingResult` is the single output of episode resolution; the
//! `ApiResponse`/`ApiError` envelopes are used by the HTTP layer.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::parser::metadata::EpisodeMetadata;
pub use crate::parser::{DebugInfo, IframeSummary};

/// Error text returned when no streaming iframe could be found
pub const NOT_FOUND_MESSAGE: &str = "No valid streaming iframe found after multiple attempts";

/// Why a resolution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The page loaded but held no valid streaming link
    NotFound,
    /// Browser or navigation failure
    Unexpected,
}

/// Outcome of resolving one episode page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResult {
    /// Whether a streaming link was found
    pub success: bool,
    /// Anime slug taken from the URL path
    pub anime_id: String,
    /// Display title derived from the slug
    pub anime_title: String,
    /// Episode number from the URL, or "Unknown"
    pub episode_number: String,
    /// The episode page that was resolved
    pub episode_url: String,
    /// Absolute URL of the video host iframe
    pub streaming_link: Option<String>,
    /// Range containing this episode, or "single-episode"
    pub range_id: String,
    /// Range labels in ascending order
    pub all_ranges: Vec<String>,
    /// Wall-clock time spent, in seconds with millisecond precision
    pub extraction_time_seconds: f64,
    /// Whether this result was served from the cache
    pub cached: bool,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Page summary attached when no link was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

/// Round to three decimals
pub fn elapsed_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

impl StreamingResult {
    fn base(episode_url: &str, meta: EpisodeMetadata, elapsed: Duration) -> Self {
        Self {
            success: false,
            anime_id: meta.anime_id,
            anime_title: meta.anime_title,
            episode_number: meta.episode_number,
            episode_url: episode_url.to_string(),
            streaming_link: None,
            range_id: meta.range_id,
            all_ranges: meta.all_ranges,
            extraction_time_seconds: elapsed_seconds(elapsed),
            cached: false,
            error: None,
            debug: None,
            failure: None,
        }
    }

    /// Successful resolution
    pub fn found(episode_url: &str, meta: EpisodeMetadata, link: String, elapsed: Duration) -> Self {
        Self {
            success: true,
            streaming_link: Some(link),
            ..Self::base(episode_url, meta, elapsed)
        }
    }

    /// Page loaded but no valid link was found
    pub fn not_found(
        episode_url: &str,
        meta: EpisodeMetadata,
        debug: DebugInfo,
        elapsed: Duration,
    ) -> Self {
        Self {
            error: Some(NOT_FOUND_MESSAGE.to_string()),
            debug: Some(debug),
            failure: Some(FailureKind::NotFound),
            ..Self::base(episode_url, meta, elapsed)
        }
    }

    /// Resolution failed with an error
    pub fn unexpected(
        episode_url: &str,
        meta: EpisodeMetadata,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            error: Some(error.into()),
            failure: Some(FailureKind::Unexpected),
            ..Self::base(episode_url, meta, elapsed)
        }
    }

    /// Copy of a cached result, marked as such
    pub fn served_from_cache(mut self, elapsed: Duration) -> Self {
        self.cached = true;
        self.extraction_time_seconds = elapsed_seconds(elapsed);
        self
    }
}

/// Standard API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful (always true for this type)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// ISO timestamp of when data was fetched
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Create a new successful API response with the current timestamp
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ApiError {
    /// Whether the operation was successful (always false for errors)
    pub success: bool,
    /// Error message describing what went wrong
    pub error: String,
    /// ISO timestamp of when the error occurred
    pub timestamp: String,
}

impl ApiError {
    /// Create a new API error response with the current timestamp
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Shared browser status reported by the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrowserStatus {
    pub running: bool,
    pub open_pages: usize,
}
