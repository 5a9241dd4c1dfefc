use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// URL path fragments that point at a single product
pub const PRODUCT_PATTERNS: [&str; 8] = ["/dp/", "/p/", "/product/", "/item/", "/itm/", ".itm", "listing", "-i."];

/// URL path fragments that point at a listing of products
pub const CATEGORY_PATTERNS: [&str; 7] = ["/c/", "/b/", "/s?", "/category/", "/collection/", "/shop/", "/search"];

/// What a URL looks like from its shape alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    LikelyProduct,
    LikelyCategory,
    Unknown,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkKind::LikelyProduct => "likely product",
            LinkKind::LikelyCategory => "likely category",
            LinkKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Classify a URL by its path patterns. Product patterns win over category patterns.
pub fn classify_url(url: &str) -> LinkKind {
    let lowered = url.to_lowercase();
    if PRODUCT_PATTERNS.iter().any(|p| lowered.contains(p)) {
        LinkKind::LikelyProduct
    } else if CATEGORY_PATTERNS.iter().any(|p| lowered.contains(p)) {
        LinkKind::LikelyCategory
    } else {
        LinkKind::Unknown
    }
}

/// Heuristic score used to rank links when no model is available
pub fn score_url(url: &str) -> i32 {
    let lowered = url.to_lowercase();
    let mut score = 0;

    score += PRODUCT_PATTERNS.iter().filter(|p| lowered.contains(*p)).count() as i32 * 3;
    score -= CATEGORY_PATTERNS.iter().filter(|p| lowered.contains(*p)).count() as i32;

    // Numeric ids in the path are typical of product pages
    if lowered.split('/').any(|seg| seg.len() >= 5 && seg.chars().all(|c| c.is_ascii_digit())) {
        score += 1;
    }
    score
}

/// Configuration for filtering search-result links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlFilterConfig {
    /// Host fragments that are never followed (search engines, social sites)
    #[serde(default = "default_excluded_hosts")]
    pub excluded_hosts: Vec<String>,

    /// Regex patterns for URLs to include (if empty, all URLs are included unless excluded)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude (these take precedence over include patterns)
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_excluded_hosts() -> Vec<String> {
    [
        "google.", "bing.", "duckduckgo.", "yahoo.", "baidu.",
        "wikipedia.", "youtube.", "facebook.", "twitter.", "instagram.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        // Static assets are never product pages
        r"(?i)\.(jpg|jpeg|png|gif|css|js|ico|svg|woff|woff2|ttf|eot|pdf)$".to_string(),
    ]
}

impl Default for UrlFilterConfig {
    fn default() -> Self {
        Self {
            excluded_hosts: default_excluded_hosts(),
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Decides which result links are worth visiting
#[derive(Debug)]
pub struct UrlFilter {
    config: UrlFilterConfig,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new(UrlFilterConfig::default()).expect("Default regex patterns should be valid")
    }
}

impl UrlFilter {
    pub fn new(config: UrlFilterConfig) -> Result<Self> {
        let include_regexes = config
            .include_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let exclude_regexes = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            include_regexes,
            exclude_regexes,
        })
    }

    /// Whether a link scraped from a results page may be followed
    pub fn should_follow(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        if host.is_empty() || self.config.excluded_hosts.iter().any(|h| host.contains(h.as_str())) {
            return false;
        }

        if self.exclude_regexes.iter().any(|r| r.is_match(url)) {
            return false;
        }

        self.include_regexes.is_empty() || self.include_regexes.iter().any(|r| r.is_match(url))
    }

    /// Keep followable links, normalized and deduplicated, in their original order
    pub fn filter_links<I, S>(&self, links: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept: Vec<String> = Vec::new();
        for link in links {
            let link = link.as_ref();
            if !self.should_follow(link) {
                continue;
            }
            let normalized = self.normalize_url(link);
            if !kept.contains(&normalized) {
                kept.push(normalized);
            }
        }
        kept
    }

    /// Drop the fragment of a URL; unparsable input is returned as-is
    pub fn normalize_url(&self, url: &str) -> String {
        match Url::parse(url) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let filter = UrlFilter::default();

        assert!(filter.should_follow("https://www.etsy.com/listing/123/mug"));
        assert!(filter.should_follow("http://shop.example/item/9"));

        // Search engines and social sites are skipped
        assert!(!filter.should_follow("https://www.google.com/search?q=mug"));
        assert!(!filter.should_follow("https://duckduckgo.com/?q=mug"));
        assert!(!filter.should_follow("https://en.wikipedia.org/wiki/Mug"));
        assert!(!filter.should_follow("https://www.youtube.com/watch?v=1"));

        // Non-http schemes and assets are skipped
        assert!(!filter.should_follow("ftp://files.example/mug"));
        assert!(!filter.should_follow("javascript:void(0)"));
        assert!(!filter.should_follow("https://cdn.example/mug.JPG"));
    }

    #[test]
    fn test_regex_patterns() {
        let config = UrlFilterConfig {
            include_patterns: vec![r"/product/".to_string()],
            exclude_patterns: vec![r"/product/draft/".to_string()],
            ..UrlFilterConfig::default()
        };
        let filter = UrlFilter::new(config).unwrap();

        assert!(filter.should_follow("https://shop.example/product/1"));
        assert!(!filter.should_follow("https://shop.example/blog/1"));
        assert!(!filter.should_follow("https://shop.example/product/draft/1"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = UrlFilterConfig {
            include_patterns: vec!["(".to_string()],
            ..UrlFilterConfig::default()
        };
        assert!(matches!(UrlFilter::new(config), Err(crate::error::ScoutError::Config(_))));
    }

    #[test]
    fn test_filter_links_normalizes_and_dedupes() {
        let filter = UrlFilter::default();
        let links = filter.filter_links([
            "https://shop.example/item/1#reviews",
            "https://shop.example/item/1",
            "https://www.bing.com/search?q=x",
            "https://shop.example/item/2",
        ]);
        assert_eq!(
            links,
            vec!["https://shop.example/item/1", "https://shop.example/item/2"]
        );
    }

    #[test]
    fn test_classify_url() {
        assert_eq!(classify_url("https://www.amazon.com/Kettle/dp/B01"), LinkKind::LikelyProduct);
        assert_eq!(classify_url("https://www.ebay.com/itm/1234"), LinkKind::LikelyProduct);
        assert_eq!(classify_url("https://www.walmart.com/browse/c/kitchen"), LinkKind::LikelyCategory);
        assert_eq!(classify_url("https://www.amazon.com/s?k=kettle"), LinkKind::LikelyCategory);
        assert_eq!(classify_url("https://blog.example/post"), LinkKind::Unknown);
        // product wins when both match
        assert_eq!(classify_url("https://shop.example/shop/product/7"), LinkKind::LikelyProduct);
    }

    #[test]
    fn test_score_url_prefers_products() {
        let product = score_url("https://shop.example/product/12345");
        let category = score_url("https://shop.example/category/kettles");
        let plain = score_url("https://shop.example/about");
        assert!(product > plain);
        assert!(plain > category);
    }
}
