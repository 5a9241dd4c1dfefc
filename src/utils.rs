use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Host of a URL without a leading `www.`
pub fn extract_domain(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(_) => None,
    };

    // Fall back to splitting by hand for malformed URLs
    let host = host.unwrap_or_else(|| {
        let without_scheme = url.split("//").nth(1).unwrap_or(url);
        without_scheme.split('/').next().unwrap_or(without_scheme).to_string()
    });

    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn slug_patterns() -> &'static (Regex, Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"[^a-z0-9\s-]").expect("static pattern"),
            Regex::new(r"\s+").expect("static pattern"),
            Regex::new(r"-+").expect("static pattern"),
        )
    })
}

/// URL-friendly slug: lowercase ASCII words joined by single hyphens
pub fn generate_slug(text: &str) -> String {
    let (special, spaces, hyphens) = slug_patterns();

    let lower = sanitize_text(text).to_lowercase();
    let slug = special.replace_all(&lower, "");
    let slug = spaces.replace_all(&slug, "-");
    let slug = hyphens.replace_all(&slug, "-");

    slug.trim_matches('-').to_string()
}

/// Convert a string to a sanitized filename
pub fn sanitize_filename(name: &str) -> String {
    let mut name = name.replace("http://", "").replace("https://", "");
    name = name.replace(['/', '\\', ':', '?', '&', '=', '#', '%', '*', '"', '<', '>', '|', ' '], "_");

    // Limit filename length
    truncate_chars(&name, 100)
}

/// Replace anything outside ASCII with `?` so log lines stay printable
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// First `max` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.amazon.com/dp/B09XYZ"), "amazon.com");
        assert_eq!(extract_domain("http://shop.example.org/item/1"), "shop.example.org");
        assert_eq!(extract_domain("not a url/path"), "not a url");
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Sony WH-1000XM4  Headphones!"), "sony-wh-1000xm4-headphones");
        assert_eq!(generate_slug("  --Hello   World--  "), "hello-world");
        assert_eq!(generate_slug("Café Crème"), "caf-crme");
        assert_eq!(generate_slug(""), "");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("https://example.com/a?b=c"), "example.com_a_b_c");
        assert_eq!(sanitize_filename(&"x".repeat(150)).len(), 100);
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("price: 5€"), "price: 5?");
    }
}
