//! Episode metadata derived from the episode URL and page DOM

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

/// Sentinel episode number when the URL carries none
pub const UNKNOWN_EPISODE: &str = "Unknown";
/// Range label used when the page has no episode ranges
pub const SINGLE_EPISODE: &str = "single-episode";

/// Tried in order; the first match wins
static EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)episode[/\-]?(\d+)",
        r"(?i)ep[/\-]?(\d+)",
        r"/(\d+)/?$",
        r"-(\d+)/?$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static EXACT_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*[-–]\s*(\d+)$").unwrap());
static ANY_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*[-–]\s*(\d+)").unwrap());

static RANGE_ATTR: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-range-id]").unwrap());
static RANGE_LISTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.episodes_range, .episodes_range").unwrap());
static RANGE_CLASSES: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="range"], [class*="episode"]"#).unwrap());

/// Episode number from the URL, or "Unknown"
pub fn extract_episode_number(episode_url: &str) -> String {
    EPISODE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(episode_url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_EPISODE.to_string())
}

/// Anime id and display title from the path segment after `anime`
///
/// Returns `("unknown", "Unknown Anime")` when the URL has no such segment.
pub fn extract_anime_identity(episode_url: &str) -> (String, String) {
    let parts: Vec<&str> = episode_url.split('/').collect();
    parts
        .iter()
        .position(|part| *part == "anime")
        .and_then(|idx| parts.get(idx + 1))
        .filter(|id| !id.is_empty())
        .map(|id| (id.to_string(), title_from_slug(id)))
        .unwrap_or_else(|| ("unknown".to_string(), "Unknown Anime".to_string()))
}

/// "one-piece-dub" -> "One Piece Dub"
pub fn title_from_slug(slug: &str) -> String {
    let mut title = String::with_capacity(slug.len());
    let mut at_word_start = true;
    for c in slug.replace('-', " ").chars() {
        let is_word = c.is_alphanumeric() || c == '_';
        if is_word && at_word_start {
            title.extend(c.to_uppercase());
        } else {
            title.push(c);
        }
        at_word_start = !is_word;
    }
    title
}

/// A bucket of episodes as shown by the site, e.g. "26-50"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRange {
    pub range_id: String,
    pub label: String,
    pub start: u32,
    pub end: u32,
}

impl EpisodeRange {
    fn from_captures(range_id: Option<&str>, start: &str, end: &str) -> Option<Self> {
        let start: u32 = start.parse().ok()?;
        let end: u32 = end.parse().ok()?;
        let label = format!("{}-{}", start, end);
        Some(Self {
            range_id: range_id.map(str::to_string).unwrap_or_else(|| label.clone()),
            label,
            start,
            end,
        })
    }

    pub fn contains(&self, episode: u32) -> bool {
        (self.start..=self.end).contains(&episode)
    }
}

/// Episode ranges on the page, deduplicated and sorted by start
///
/// Tried in order until one yields ranges: `data-range-id` elements whose
/// whole text is a range, `.episodes_range` lists carrying `data-range-id`,
/// then any "range"/"episode"-classed element.
pub fn extract_episode_ranges(html: &str) -> Vec<EpisodeRange> {
    let document = Html::parse_document(html);

    let mut ranges: Vec<EpisodeRange> = document
        .select(&RANGE_ATTR)
        .filter_map(|el| {
            let text = el.text().collect::<String>();
            let caps = EXACT_RANGE.captures(text.trim())?;
            EpisodeRange::from_captures(el.value().attr("data-range-id"), &caps[1], &caps[2])
        })
        .collect();

    if ranges.is_empty() {
        ranges = document
            .select(&RANGE_LISTS)
            .filter_map(|el| {
                let range_id = el.value().attr("data-range-id")?;
                let text = el.text().collect::<String>();
                let caps = ANY_RANGE.captures(&text)?;
                EpisodeRange::from_captures(Some(range_id), &caps[1], &caps[2])
            })
            .collect();
    }

    if ranges.is_empty() {
        ranges = document
            .select(&RANGE_CLASSES)
            .filter_map(|el| {
                let text = el.text().collect::<String>();
                let caps = ANY_RANGE.captures(&text)?;
                EpisodeRange::from_captures(el.value().attr("data-range-id"), &caps[1], &caps[2])
            })
            .collect();
    }

    let mut seen_ids = HashSet::new();
    let mut seen_labels = HashSet::new();
    ranges.retain(|r| seen_ids.insert(r.range_id.clone()) && seen_labels.insert(r.label.clone()));
    ranges.sort_by_key(|r| r.start);
    ranges
}

/// Label of the range containing `episode_number`, or "single-episode"
pub fn current_range(ranges: &[EpisodeRange], episode_number: &str) -> String {
    episode_number
        .parse::<u32>()
        .ok()
        .and_then(|episode| ranges.iter().find(|r| r.contains(episode)))
        .map(|r| r.label.clone())
        .unwrap_or_else(|| SINGLE_EPISODE.to_string())
}

/// All range labels in ascending order; `["single-episode"]` when there are none
pub fn range_labels(ranges: &[EpisodeRange]) -> Vec<String> {
    if ranges.is_empty() {
        return vec![SINGLE_EPISODE.to_string()];
    }
    ranges.iter().map(|r| r.label.clone()).collect()
}

/// Everything the result needs from the URL and the page
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeMetadata {
    pub anime_id: String,
    pub anime_title: String,
    pub episode_number: String,
    pub range_id: String,
    pub all_ranges: Vec<String>,
}

/// Derive all metadata; `html` may be empty when the page is unavailable
pub fn derive_metadata(episode_url: &str, html: &str) -> EpisodeMetadata {
    let (anime_id, anime_title) = extract_anime_identity(episode_url);
    let episode_number = extract_episode_number(episode_url);
    let ranges = extract_episode_ranges(html);

    EpisodeMetadata {
        anime_id,
        anime_title,
        range_id: current_range(&ranges, &episode_number),
        all_ranges: range_labels(&ranges),
        episode_number,
    }
}
