//! Constants module for the episode scraper
//!
//! Contains endpoint URL builders and the host/selector lists used to tell
//! streaming embeds apart from ads and trackers.

/// URL builder functions for all endpoints
pub mod endpoints {
    /// Episode page URL, e.g. `https://123animehub.cc/anime/one-piece/episode/42`
    pub fn episode(base_url: &str, anime_id: &str, episode: u32) -> String {
        format!(
            "{}/anime/{}/episode/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(anime_id),
            episode
        )
    }
}

/// Host fragment lists used by the candidate extractor and the request filter
pub mod hosts {
    /// Substrings of known video hosts and generic embed terms
    pub const STREAMING_WHITELIST: &[&str] = &[
        "bunnycdn",
        "filemoon",
        "doodstream",
        "streamtape",
        "mp4upload",
        "mixdrop",
        "upstream",
        "streamwish",
        "vids.to",
        "vidstream",
        "fastcdn",
        "embed",
        "player",
        "stream",
        "video",
        "vid",
        "play",
        "watch",
    ];

    /// Specific hosts accepted while polling after a simulated play click
    pub const LATE_LOAD_WHITELIST: &[&str] = &[
        "bunnycdn",
        "filemoon",
        "doodstream",
        "streamtape",
        "mp4upload",
        "mixdrop",
        "upstream",
        "streamwish",
    ];

    /// Ad, analytics, comment and social hosts that are never a stream
    pub const STREAMING_BLACKLIST: &[&str] = &[
        "disqus.com",
        "dtscout.com",
        "google-analytics",
        "googletagmanager",
        "doubleclick.net",
        "googlesyndication",
        "googleadservices",
        "adsystem",
        "facebook.com",
        "twitter.com",
        "instagram.com",
        "tiktok.com",
    ];

    /// Request URL fragments aborted before they hit the network
    pub const BLOCKED_REQUEST_FRAGMENTS: &[&str] = &[
        "doubleclick",
        "google-analytics",
        "analytics",
        "adservice",
        "googleadservices",
        "googlesyndication",
        "googletagmanager",
        "adsystem",
        "/ads/",
        "tracker",
        "facebook.com",
        "twitter.com",
        "instagram.com",
        "tiktok.com",
    ];
}

/// CSS selectors used while scanning the episode page
pub mod selectors {
    /// Checked in order before the generic iframe scan, most specific first
    pub const PRIORITY_IFRAMES: &[&str] = &[
        "#iframe_ext82377 iframe",
        r#"iframe[src*="bunnycdn"]"#,
        r#"iframe[src*="embed"]"#,
        r#"iframe[src*="play"]"#,
        r#"iframe[src*="stream"]"#,
        r#"iframe[src*="video"]"#,
        r#"iframe[src*="player"]"#,
        r#"iframe[src*="vid"]"#,
    ];

    /// Attributes holding an iframe source, in lookup order
    pub const IFRAME_SOURCE_ATTRS: &[&str] = &["src", "data-src", "data-lazy", "data-original"];

    /// Elements that may start playback when clicked
    pub const PLAY_BUTTONS: &str = "button, .play-btn, .load-btn, [onclick], .btn";

    /// Controls counted in the debug summary
    pub const DEBUG_PLAY_CONTROLS: &str = "button, .play-btn, .load-btn";
}
