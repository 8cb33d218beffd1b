//! Parser module for finding streaming embeds in episode pages
//!
//! Works on a serialized DOM snapshot taken from the browser. Episode pages
//! carry many iframes (ads, trackers, comment widgets); only one of them is
//! the video host, and the functions here pick it out.

pub mod metadata;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::constants::hosts::{LATE_LOAD_WHITELIST, STREAMING_BLACKLIST, STREAMING_WHITELIST};
use crate::constants::selectors::{DEBUG_PLAY_CONTROLS, IFRAME_SOURCE_ATTRS, PRIORITY_IFRAMES};

/// Iframes inspected by the generic scan, in document order
pub const MAX_SCANNED_IFRAMES: usize = 20;
/// Anchors inspected as a last resort while polling
pub const MAX_SCANNED_ANCHORS: usize = 30;
/// Debug payload truncates iframe sources to this many characters
const DEBUG_SRC_LEN: usize = 100;

static IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static PLAY_CONTROL: Lazy<Selector> = Lazy::new(|| Selector::parse(DEBUG_PLAY_CONTROLS).unwrap());
static PRIORITY: Lazy<Vec<Selector>> = Lazy::new(|| {
    PRIORITY_IFRAMES
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

/// Classifies URLs as streaming hosts or noise
///
/// The lists are heuristics; override them per instance as sites change.
#[derive(Debug, Clone)]
pub struct HostFilter {
    whitelist: Vec<String>,
    late_whitelist: Vec<String>,
    blacklist: Vec<String>,
    min_len: usize,
}

impl Default for HostFilter {
    fn default() -> Self {
        Self::new(
            to_owned(STREAMING_WHITELIST),
            to_owned(LATE_LOAD_WHITELIST),
            to_owned(STREAMING_BLACKLIST),
        )
    }
}

fn to_owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_lowercase()).collect()
}

impl HostFilter {
    pub fn new(whitelist: Vec<String>, late_whitelist: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            whitelist,
            late_whitelist,
            blacklist,
            min_len: 30,
        }
    }

    /// Minimum URL length accepted; shorter URLs are never real embeds
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    fn passes_basics(&self, src: &str) -> bool {
        !src.is_empty() && src != "about:blank" && src.starts_with("http") && src.len() >= self.min_len
    }

    fn is_blacklisted(&self, lower: &str) -> bool {
        self.blacklist.iter().any(|b| lower.contains(b.as_str()))
    }

    /// Full validity predicate used by the passive scan
    pub fn is_valid_streaming_link(&self, src: &str) -> bool {
        if !self.passes_basics(src) {
            return false;
        }
        let lower = src.to_lowercase();
        !self.is_blacklisted(&lower) && self.whitelist.iter().any(|w| lower.contains(w.as_str()))
    }

    /// Stricter predicate for the poll scan: only known video hosts
    pub fn is_late_candidate(&self, src: &str) -> bool {
        if !self.passes_basics(src) {
            return false;
        }
        let lower = src.to_lowercase();
        !self.is_blacklisted(&lower)
            && self.late_whitelist.iter().any(|w| lower.contains(w.as_str()))
    }
}

/// Resolve an attribute value the way `iframe.src` would report it
fn resolve(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("http") || raw == "about:blank" {
        return Some(raw.to_string());
    }
    match base {
        Some(base) => base.join(raw).ok().map(String::from),
        None => Some(raw.to_string()),
    }
}

/// First non-empty source attribute of an iframe
fn iframe_source(iframe: &ElementRef, attrs: &[&str], base: Option<&Url>) -> Option<String> {
    attrs
        .iter()
        .filter_map(|attr| iframe.value().attr(attr))
        .find(|v| !v.trim().is_empty())
        .and_then(|v| resolve(v, base))
}

/// Passive scan: priority selectors first, then the first iframes in document order
///
/// `page_url` resolves relative and protocol-relative sources.
pub fn find_streaming_candidate(html: &str, page_url: &str, filter: &HostFilter) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    for selector in PRIORITY.iter() {
        let src = document
            .select(selector)
            .next()
            .and_then(|iframe| iframe_source(&iframe, &["src"], base.as_ref()));
        if let Some(src) = src {
            if filter.is_valid_streaming_link(&src) {
                return Some(src);
            }
        }
    }

    document
        .select(&IFRAME)
        .take(MAX_SCANNED_IFRAMES)
        .filter_map(|iframe| iframe_source(&iframe, IFRAME_SOURCE_ATTRS, base.as_ref()))
        .find(|src| filter.is_valid_streaming_link(src))
}

/// Reduced scan run while polling after a play click: iframes, then anchors
pub fn find_late_candidate(html: &str, page_url: &str, filter: &HostFilter) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let from_iframes = document
        .select(&IFRAME)
        .take(MAX_SCANNED_IFRAMES)
        .filter_map(|iframe| iframe_source(&iframe, &["src", "data-src"], base.as_ref()))
        .find(|src| filter.is_late_candidate(src));
    if from_iframes.is_some() {
        return from_iframes;
    }

    document
        .select(&ANCHOR)
        .take(MAX_SCANNED_ANCHORS)
        .filter_map(|a| a.value().attr("href").and_then(|h| resolve(h, base.as_ref())))
        .find(|href| filter.is_late_candidate(href))
}

/// An iframe seen on a page where no stream was found
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IframeSummary {
    /// Source truncated to 100 characters
    pub src: String,
    /// Element id or "no-id"
    pub id: String,
    /// Class attribute or "no-class"
    pub class: String,
}

/// Non-sensitive page facts returned when extraction finds nothing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    /// All iframes in the document
    pub total_iframes: usize,
    /// Iframes that had any source attribute
    pub iframe_sources: Vec<IframeSummary>,
    /// Text of the <title> element
    pub page_title: String,
    /// Elements that look like play/load buttons
    pub play_buttons: usize,
}

/// Summarize the page for operators without returning its content
pub fn collect_debug_info(html: &str) -> DebugInfo {
    let document = Html::parse_document(html);

    let iframes: Vec<ElementRef> = document.select(&IFRAME).collect();
    let iframe_sources = iframes
        .iter()
        .filter_map(|iframe| {
            let src = IFRAME_SOURCE_ATTRS
                .iter()
                .filter_map(|attr| iframe.value().attr(attr))
                .find(|v| !v.trim().is_empty())?;
            Some(IframeSummary {
                src: src.chars().take(DEBUG_SRC_LEN).collect(),
                id: iframe.value().id().unwrap_or("no-id").to_string(),
                class: iframe
                    .value()
                    .attr("class")
                    .filter(|c| !c.is_empty())
                    .unwrap_or("no-class")
                    .to_string(),
            })
        })
        .collect();

    let page_title = document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    DebugInfo {
        total_iframes: iframes.len(),
        iframe_sources,
        page_title,
        play_buttons: document.select(&PLAY_CONTROL).count(),
    }
}
