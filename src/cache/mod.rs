//! In-memory TTL cache of episode results
//!
//! Keyed by the normalized episode URL. Expired entries read as misses and
//! are dropped lazily on access or by `purge_expired`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::models::StreamingResult;

/// Default time-to-live: five minutes
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

struct CacheEntry {
    result: StreamingResult,
    expires_at: Instant,
}

#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache key for an episode URL: trimmed, without trailing slashes
    pub fn normalize_key(episode_url: &str) -> String {
        episode_url.trim().trim_end_matches('/').to_string()
    }

    /// Cached result for `episode_url` if it has not expired
    pub fn get(&self, episode_url: &str) -> Option<StreamingResult> {
        let key = Self::normalize_key(episode_url);
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.result.clone()),
            Some(_) => {
                debug!("Cache entry expired for {}", key);
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store `result`, replacing any previous entry for the same URL
    pub fn set(&self, episode_url: &str, result: StreamingResult, ttl: Duration) {
        let key = Self::normalize_key(episode_url);
        let expires_at = Instant::now() + ttl;
        self.lock().insert(key, CacheEntry { result, expires_at });
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
