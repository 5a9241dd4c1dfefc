use crate::results::SeoData;
use crate::utils::sanitize_text;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use url::Url;

/// Metadata pulled out of raw page markup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    /// meta_description, meta_keywords, og_title, og_description, og_image,
    /// canonical_url, page_title
    pub fields: BTreeMap<String, String>,
    /// Parsed `application/ld+json` blocks
    pub json_ld: Vec<Value>,
}

impl PageMetadata {
    pub fn len(&self) -> usize {
        self.fields.len() + self.json_ld.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat mapping handed to the model
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.fields {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        if !self.json_ld.is_empty() {
            map.insert("structured_data".into(), Value::Array(self.json_ld.clone()));
        }
        Value::Object(map)
    }

    /// Split into meta tags, Open Graph tags and structured data
    pub fn to_seo(&self) -> SeoData {
        let mut seo = SeoData::default();
        for (key, value) in &self.fields {
            match key.strip_prefix("og_") {
                Some(og) => {
                    seo.og_tags.insert(format!("og:{}", og), value.clone());
                }
                None => {
                    seo.meta_tags.insert(key.clone(), value.clone());
                }
            }
        }
        seo.schema_data = self.json_ld.clone();
        seo
    }
}

struct MetaPatterns {
    fields: Vec<(&'static str, Regex)>,
    title: Regex,
    json_ld: Regex,
}

fn meta_patterns() -> &'static MetaPatterns {
    static PATTERNS: OnceLock<MetaPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let fields = [
            ("meta_description", r#"(?i)<meta[^>]*name="description"[^>]*content="([^"]*)""#),
            ("meta_keywords", r#"(?i)<meta[^>]*name="keywords"[^>]*content="([^"]*)""#),
            ("og_title", r#"(?i)<meta[^>]*property="og:title"[^>]*content="([^"]*)""#),
            ("og_description", r#"(?i)<meta[^>]*property="og:description"[^>]*content="([^"]*)""#),
            ("og_image", r#"(?i)<meta[^>]*property="og:image"[^>]*content="([^"]*)""#),
            ("canonical_url", r#"(?i)<link[^>]*rel="canonical"[^>]*href="([^"]*)""#),
        ]
        .into_iter()
        .map(|(key, pattern)| (key, Regex::new(pattern).expect("static pattern")))
        .collect();

        MetaPatterns {
            fields,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static pattern"),
            json_ld: Regex::new(
                r#"(?is)<script[^>]*type="application/ld\+json"[^>]*>(.*?)</script>"#,
            )
            .expect("static pattern"),
        }
    })
}

/// Extract meta tags, page title and JSON-LD from HTML
pub fn extract_metadata(html: &str) -> PageMetadata {
    let patterns = meta_patterns();
    let mut metadata = PageMetadata::default();

    for (key, regex) in &patterns.fields {
        if let Some(value) = regex.captures(html).and_then(|c| c.get(1)) {
            metadata
                .fields
                .insert(key.to_string(), sanitize_text(value.as_str().trim()));
        }
    }

    if let Some(title) = patterns.title.captures(html).and_then(|c| c.get(1)) {
        let title = title.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if !title.is_empty() {
            metadata.fields.insert("page_title".into(), sanitize_text(&title));
        }
    }

    for block in patterns.json_ld.captures_iter(html) {
        let Some(raw) = block.get(1) else { continue };
        match serde_json::from_str::<Value>(raw.as_str().trim()) {
            Ok(value) => metadata.json_ld.push(value),
            Err(e) => ::log::debug!("Skipping malformed JSON-LD block: {}", e),
        }
    }

    metadata
}

fn image_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // product-specific images
            r#"(?i)<img[^>]*class="[^"]*(?:product|main|primary|gallery|hero|featured)[^"]*"[^>]*src="([^"]*)""#,
            r#"(?i)<img[^>]*id="[^"]*(?:product|main|primary|gallery|hero|featured)[^"]*"[^>]*src="([^"]*)""#,
            r#"(?i)<img[^>]*data-(?:product|main|primary|large|zoom)[^>]*src="([^"]*)""#,
            r#"(?i)<div[^>]*class="[^"]*(?:product|main|primary|gallery|hero|featured)[^"]*"[^>]*style="[^"]*background-image:\s*url\('([^']*)'\)"#,
            r#"(?i)data-(?:image-large|large-image|zoom-image|hero-image|main-image)="([^"]*)""#,
            // Open Graph and structured data
            r#"(?i)<meta[^>]*property="og:image"[^>]*content="([^"]*)""#,
            r#"(?i)<meta[^>]*itemprop="image"[^>]*content="([^"]*)""#,
            // large images
            r#"(?i)<img[^>]*(?:width|height)="[4-9]\d\d"[^>]*src="([^"]*)""#,
            r#"(?i)<img[^>]*src="([^"]*)"[^>]*(?:width|height)="[4-9]\d\d""#,
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

const IMAGE_SKIP_WORDS: [&str; 5] = ["icon", "logo", "placeholder", "spinner", "loading"];
const IMAGE_SKIP_SIZES: [&str; 3] = ["16x16", "32x32", "64x64"];

/// Likely product image URLs, best candidates first, at most `limit`
pub fn image_candidates(html: &str, base: Option<&Url>, limit: usize) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();

    'patterns: for pattern in image_patterns() {
        for captures in pattern.captures_iter(html) {
            let Some(raw) = captures.get(1) else { continue };
            let raw = raw.as_str().trim();
            if raw.is_empty() || raw.starts_with("data:") {
                continue;
            }

            let lowered = raw.to_lowercase();
            if IMAGE_SKIP_WORDS.iter().any(|w| lowered.contains(w))
                || IMAGE_SKIP_SIZES.iter().any(|s| lowered.contains(s))
            {
                continue;
            }

            let url = match base {
                Some(base) => base
                    .join(raw)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| raw.to_string()),
                None => raw.to_string(),
            };

            if !images.contains(&url) {
                images.push(url);
            }
            if images.len() >= limit {
                break 'patterns;
            }
        }
    }

    images
}
