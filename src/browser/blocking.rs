//! Request blocking rules applied to every page
//!
//! Images, stylesheets, fonts and media are never needed to find an embed,
//! and ad/analytics requests only slow the page down.

use crate::constants::hosts::BLOCKED_REQUEST_FRAGMENTS;

/// Resource type of an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Script,
    Image,
    Stylesheet,
    Font,
    Media,
    Xhr,
    Other,
}

/// Decides which requests are aborted
#[derive(Debug, Clone)]
pub struct RequestFilter {
    blocked_kinds: Vec<ResourceKind>,
    blocked_fragments: Vec<String>,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::new(
            vec![
                ResourceKind::Image,
                ResourceKind::Stylesheet,
                ResourceKind::Font,
                ResourceKind::Media,
            ],
            BLOCKED_REQUEST_FRAGMENTS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl RequestFilter {
    pub fn new(blocked_kinds: Vec<ResourceKind>, blocked_fragments: Vec<String>) -> Self {
        Self {
            blocked_kinds,
            blocked_fragments: blocked_fragments
                .into_iter()
                .map(|f| f.to_lowercase())
                .collect(),
        }
    }

    /// Add another URL fragment to the deny list
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.blocked_fragments.push(fragment.into().to_lowercase());
        self
    }

    /// Whether a request of `kind` to `url` should be aborted
    pub fn should_block(&self, kind: ResourceKind, url: &str) -> bool {
        if self.blocked_kinds.contains(&kind) {
            return true;
        }
        let url = url.to_lowercase();
        self.blocked_fragments.iter().any(|f| url.contains(f.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_heavy_resource_kinds() {
        let filter = RequestFilter::default();
        for kind in [
            ResourceKind::Image,
            ResourceKind::Stylesheet,
            ResourceKind::Font,
            ResourceKind::Media,
        ] {
            assert!(filter.should_block(kind, "https://cdn.example.com/asset"));
        }
    }

    #[test]
    fn test_allows_documents_and_scripts() {
        let filter = RequestFilter::default();
        assert!(!filter.should_block(
            ResourceKind::Document,
            "https://123animehub.cc/anime/one-piece/episode/1"
        ));
        assert!(!filter.should_block(ResourceKind::Script, "https://123animehub.cc/js/player.js"));
        assert!(!filter.should_block(ResourceKind::Xhr, "https://123animehub.cc/ajax/episode/uploads"));
    }

    #[test]
    fn test_blocks_tracking_domains() {
        let filter = RequestFilter::default();
        assert!(filter.should_block(
            ResourceKind::Script,
            "https://www.googletagmanager.com/gtag/js?id=G-1"
        ));
        assert!(filter.should_block(
            ResourceKind::Script,
            "https://securepubads.g.DOUBLECLICK.net/tag/js/gpt.js"
        ));
        assert!(filter.should_block(ResourceKind::Xhr, "https://example.com/ads/banner"));
        assert!(filter.should_block(ResourceKind::Document, "https://connect.facebook.com/sdk.js"));
    }

    #[test]
    fn test_custom_fragment() {
        let filter = RequestFilter::new(vec![], vec![]).with_fragment("PopUnder");
        assert!(filter.should_block(ResourceKind::Script, "https://x.com/popunder.js"));
        assert!(!filter.should_block(ResourceKind::Image, "https://x.com/a.png"));
    }
}
