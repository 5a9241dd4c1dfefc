use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// An anchor on the page, resolved to an absolute URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

/// Counts of page elements that hint at the page type
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub product_elements: usize,
    pub grid_elements: usize,
    pub cart_buttons: usize,
}

const PRODUCT_ELEMENT_SELECTOR: &str =
    r#"div.product, li.product, div.item, div[class*="product"], div[class*="item"]"#;

const GRID_SELECTOR: &str = r#"div.grid, ul.grid, div.products, ul.products, div.items, div[class*="grid"], div[class*="productGrid"]"#;

const PRODUCT_LINK_SELECTOR: &str = concat!(
    r#"a[href*="product"], a[href*="item"], a[href*="/p/"], a[href*="/dp/"], "#,
    r#"a[class*="product"], a[class*="item"], a.listing-link, a[data-listing-id], "#,
    r#"a.s-item__link, a[data-test="product-title"], a[link-identifier="linkProductTitle"]"#
);

/// Anchor texts that lead to pagination or listings rather than a product
const NON_PRODUCT_TEXT: [&str; 5] = ["view all", "see all", "next", "previous", "page"];

const CART_PHRASES: [&str; 3] = ["add to cart", "buy now", "add to basket"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector should parse")
}

/// Normalize runs of whitespace into single spaces
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of the body, skipping script and style contents
pub fn visible_text(doc: &Html) -> String {
    let body_selector = selector("body");
    let mut parts = Vec::new();

    match doc.select(&body_selector).next() {
        Some(body) => collect_text(body, &mut parts),
        None => collect_text(doc.root_element(), &mut parts),
    }

    collapse_whitespace(&parts.join(" "))
}

fn collect_text(element: ElementRef, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if matches!(name, "script" | "style" | "noscript" | "template" | "head") {
                continue;
            }
            collect_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
    }
}

/// Contents of `<title>`, if any
pub fn title(doc: &Html) -> Option<String> {
    let title_selector = selector("title");
    doc.select(&title_selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Resolve an href against the page URL, keeping only http(s) targets
fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => {
            let mut resolved = resolved;
            resolved.set_fragment(None);
            Some(resolved.to_string())
        }
        _ => None,
    }
}

fn link_text(element: &ElementRef) -> String {
    let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    if !text.is_empty() {
        return text;
    }
    element
        .value()
        .attr("title")
        .or_else(|| element.value().attr("aria-label"))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

/// All distinct http(s) links on the page, in document order
pub fn links(doc: &Html, base: Option<&Url>) -> Vec<PageLink> {
    let link_selector = selector("a[href]");
    let mut seen = HashSet::new();

    let links = doc
        .select(&link_selector)
        .filter_map(|e| {
            let url = resolve(base, e.value().attr("href")?)?;
            if !seen.insert(url.clone()) {
                return None;
            }
            Some(PageLink {
                url,
                text: link_text(&e),
            })
        })
        .collect::<Vec<_>>();

    ::log::debug!("HTML parser found {} links", links.len());
    links
}

/// Links that look like they lead to individual products.
///
/// Uses retailer-specific selectors first and widens to image links when fewer than
/// five matches were found.
pub fn product_links(doc: &Html, base: Option<&Url>, limit: usize) -> Vec<PageLink> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    let mut push = |element: ElementRef, found: &mut Vec<PageLink>| {
        let Some(url) = element.value().attr("href").and_then(|h| resolve(base, h)) else {
            return;
        };
        let text = link_text(&element);
        let lowered = text.to_lowercase();
        if NON_PRODUCT_TEXT.iter().any(|skip| lowered.contains(skip)) {
            return;
        }
        if seen.insert(url.clone()) {
            found.push(PageLink { url, text });
        }
    };

    for element in doc.select(&selector(PRODUCT_LINK_SELECTOR)) {
        push(element, &mut found);
    }

    // Images wrapped in links are common on listing grids
    if found.len() < 5 {
        let image_selector = selector("img");
        for element in doc.select(&selector("a[href]")) {
            if element.select(&image_selector).next().is_some() {
                push(element, &mut found);
            }
        }
    }

    found.truncate(limit);
    found
}

/// Count product tiles, grids and purchase buttons
pub fn element_counts(doc: &Html) -> ElementCounts {
    let product_elements = doc.select(&selector(PRODUCT_ELEMENT_SELECTOR)).count();
    let grid_elements = doc.select(&selector(GRID_SELECTOR)).count();

    let class_buttons = doc.select(&selector(r#"[class*="add-to-cart"]"#)).count();
    let text_buttons = doc
        .select(&selector(r#"button, a, input[type="submit"]"#))
        .filter(|e| {
            let text = e
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| e.text().collect::<String>())
                .to_lowercase();
            CART_PHRASES.iter().any(|p| text.contains(p))
        })
        .filter(|e| {
            !e.value()
                .attr("class")
                .is_some_and(|c| c.contains("add-to-cart"))
        })
        .count();

    ElementCounts {
        product_elements,
        grid_elements,
        cart_buttons: class_buttons + text_buttons,
    }
}
