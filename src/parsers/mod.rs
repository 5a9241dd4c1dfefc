pub mod html;
pub mod meta;

#[cfg(test)]
mod tests;

pub use html::{ElementCounts, PageLink};
pub use meta::PageMetadata;

use crate::utils::truncate_chars;
use scraper::Html;
use url::Url;

/// Phrases that mark a bot-check interstitial
const CAPTCHA_INDICATORS: [&str; 6] = [
    "captcha",
    "robot check",
    "automated access",
    "unusual traffic",
    "prove you're human",
    "security check",
];

/// Maximum number of product-link candidates kept per page
pub const MAX_PRODUCT_LINKS: usize = 20;

/// Everything the classifier and link selector observe about a page
#[derive(Debug, Clone, Default)]
pub struct PageSignals {
    pub url: String,
    pub title: String,
    /// Visible body text, whitespace-normalized
    pub text: String,
    /// Every http(s) link on the page
    pub links: Vec<PageLink>,
    /// Links that look like individual products
    pub product_links: Vec<PageLink>,
    pub element_counts: ElementCounts,
}

impl PageSignals {
    /// Parse page source into signals.
    ///
    /// `title` overrides the document's `<title>` (the browser's view of the title wins).
    pub fn from_html(url: &str, title: Option<&str>, source: &str) -> Self {
        let doc = Html::parse_document(source);
        let base = Url::parse(url).ok();

        let title = title
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .or_else(|| html::title(&doc))
            .unwrap_or_default();

        Self {
            url: url.to_string(),
            title,
            text: html::visible_text(&doc),
            links: html::links(&doc, base.as_ref()),
            product_links: html::product_links(&doc, base.as_ref(), MAX_PRODUCT_LINKS),
            element_counts: html::element_counts(&doc),
        }
    }

    /// Leading `max` characters of the visible text
    pub fn text_excerpt(&self, max: usize) -> String {
        truncate_chars(&self.text, max)
    }
}

/// Detect a CAPTCHA page, returning the indicator that matched
pub fn captcha_indicator(source: &str) -> Option<&'static str> {
    let lowered = source.to_lowercase();
    CAPTCHA_INDICATORS
        .iter()
        .find(|indicator| lowered.contains(*indicator))
        .copied()
}
