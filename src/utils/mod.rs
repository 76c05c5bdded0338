// src/utils/mod.rs

//! Utility functions and helpers.

pub mod cache;
pub mod http;
pub mod retry;

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract a numeric gallery id from a link (looks for common patterns).
pub fn extract_numeric_id(link: &str) -> Option<i64> {
    // Common patterns: /g/123/, /gallery/123, ?id=123
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"/(?:g|gallery|galleries|book|manga)/(\d+)",
            r"[?&](?:id|gid|no)=(\d+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });

    patterns
        .iter()
        .find_map(|pattern| pattern.captures(link))
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

/// Strip path separators so a fragment cannot escape its directory.
pub fn sanitize_fragment(fragment: &str) -> String {
    fragment
        .trim()
        .trim_start_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
    }

    #[test]
    fn test_extract_numeric_id() {
        assert_eq!(extract_numeric_id("https://komo.test/g/123/"), Some(123));
        assert_eq!(extract_numeric_id("/gallery/456"), Some(456));
        assert_eq!(extract_numeric_id("/view?id=789"), Some(789));
        assert_eq!(extract_numeric_id("/about"), None);
    }

    #[test]
    fn test_sanitize_fragment() {
        assert_eq!(sanitize_fragment("/a/../b//c.webp"), "a/b/c.webp");
        assert_eq!(sanitize_fragment("001.jpg"), "001.jpg");
    }
}
