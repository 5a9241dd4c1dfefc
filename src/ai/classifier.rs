use super::client::ModelClient;
use super::schema::PAGE_ANALYSIS;
use crate::parsers::PageSignals;
use crate::results::{PageAnalysis, PageType, RecommendedLink};
use crate::utils::truncate_chars;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Characters of visible text shown to the classifier
pub const CLASSIFIER_TEXT_CHARS: usize = 1500;

/// Candidate links shown to the classifier
pub const CLASSIFIER_MAX_LINKS: usize = 15;

/// Characters of visible text shown to the product confirmation prompt
const CONFIRM_TEXT_CHARS: usize = 3000;

const CATEGORY_URL_PATTERNS: [&str; 8] = [
    "/category/", "/collection/", "/shop/", "/search", "/c/", "/s?", "/b?", "/market/",
];

/// What the current navigation attempt is looking for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchContext {
    pub search_term: String,
    /// First word of the search term, used to keep category navigation on topic
    pub base_category: String,
}

impl SearchContext {
    pub fn new(search_term: impl Into<String>) -> Self {
        let search_term = search_term.into();
        let base_category = search_term
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            search_term,
            base_category,
        }
    }
}

/// Answer of the yes/no product-page check
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDecision {
    pub is_product: bool,
    pub reason: String,
}

/// Labels pages as product, category or neither
#[async_trait]
pub trait PageClassifier: Send + Sync {
    /// Classify a page. Never fails: an unusable answer is reported as `Neither`.
    async fn classify(&self, page: &PageSignals, context: &SearchContext) -> PageAnalysis;

    /// Check that a page really is a single product before extracting it
    async fn confirm_product(&self, url: &str, title: &str, text: &str) -> ProductDecision;
}

/// Pick the model classifier when a client is available, the heuristic otherwise
pub fn classifier_for(client: Option<Arc<ModelClient>>) -> Box<dyn PageClassifier> {
    match client {
        Some(client) => Box::new(ModelClassifier::new(client)),
        None => {
            ::log::warn!("No model client available, using heuristic page detection");
            Box::new(HeuristicClassifier)
        }
    }
}

/// Page classification from URL patterns and element counts
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn is_category_page(page: &PageSignals) -> bool {
        let url = page.url.to_lowercase();
        CATEGORY_URL_PATTERNS.iter().any(|p| url.contains(p))
            || page.element_counts.product_elements > 3
            || page.element_counts.grid_elements > 0
    }
}

#[async_trait]
impl PageClassifier for HeuristicClassifier {
    async fn classify(&self, page: &PageSignals, _context: &SearchContext) -> PageAnalysis {
        if Self::is_category_page(page) {
            PageAnalysis::new(PageType::Category, 70, "Heuristic detection (no AI available)")
        } else {
            PageAnalysis::new(PageType::Product, 60, "Assuming product page based on heuristics")
        }
    }

    async fn confirm_product(&self, _url: &str, _title: &str, _text: &str) -> ProductDecision {
        ProductDecision {
            is_product: true,
            reason: "No model available to confirm the page type".to_string(),
        }
    }
}

/// Model-driven classifier that remembers its recent decisions
pub struct ModelClassifier {
    client: Arc<ModelClient>,
}

const MEMORY: &str = "page_analysis";
const MEMORY_CAPACITY: usize = 5;

impl ModelClassifier {
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self { client }
    }

    fn context(&self) -> String {
        self.client.recall(MEMORY, MEMORY_CAPACITY)
    }

    fn remember(&self, entry: String) {
        self.client.remember(MEMORY, MEMORY_CAPACITY, entry);
    }

    fn analysis_prompt(&self, page: &PageSignals, context: &SearchContext) -> String {
        let links = page
            .product_links
            .iter()
            .take(CLASSIFIER_MAX_LINKS)
            .enumerate()
            .map(|(i, link)| {
                let text = if link.text.is_empty() { "Unnamed link" } else { link.text.as_str() };
                json!({
                    "index": i + 1,
                    "text": truncate_chars(text, 50),
                    "url": link.url,
                })
            })
            .collect::<Vec<_>>();
        let links = serde_json::to_string_pretty(&links).unwrap_or_else(|_| "[]".into());
        let counts = serde_json::to_string(&page.element_counts).unwrap_or_default();
        let (term, category) = (&context.search_term, &context.base_category);

        format!(
            r#"You are an AI shopping assistant analyzing an e-commerce webpage.

SEARCH CONTEXT:
Search term: "{term}"
Base category: "{category}"

PREVIOUS PAGE ANALYSES:
{history}

PAGE INFORMATION:
URL: {url}
Title: {title}
Content sample: {text}
Element counts: {counts}

AVAILABLE LINKS ON THE PAGE:
{links}

PAGE TYPE DEFINITIONS:
- PRODUCT page: A page focused on a single product with details, price, and purchase options
- CATEGORY page: A page showing multiple products in a list or grid with limited details per item
- NEITHER: Not related to products (homepage, blog, error page, captcha, etc.)

IF page_type is "CATEGORY":
    - Include 1-3 recommended_links that are most likely to be PRODUCT pages (not subcategories)
    - Prioritize links that match the search term "{term}" or category "{category}"
    - Avoid links to search results, filters, or "view all" type pages
ELSE:
    - Do NOT include the "recommended_links" field at all"#,
            history = self.context(),
            url = page.url,
            title = page.title,
            text = page.text_excerpt(CLASSIFIER_TEXT_CHARS),
        )
    }
}

#[async_trait]
impl PageClassifier for ModelClassifier {
    async fn classify(&self, page: &PageSignals, context: &SearchContext) -> PageAnalysis {
        let started = Instant::now();
        ::log::info!("Performing AI page analysis for {}", page.url);

        let prompt = self.analysis_prompt(page, context);
        let value = self.client.generate_structured(&prompt, &PAGE_ANALYSIS).await;

        let analysis = match analysis_from_value(&value, &context.base_category) {
            Some(analysis) => analysis,
            None => {
                let error = value
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("response had no page_type");
                ::log::error!("Failed to analyze page: {}", error);
                PageAnalysis::new(PageType::Neither, 0, format!("Page analysis failed: {}", error))
            }
        };

        self.remember(format!(
            "URL: {}, Type: {}, Confidence: {}, Reason: {}",
            page.url, analysis.page_type, analysis.confidence, analysis.reason
        ));
        ::log::info!(
            "AI page analysis completed in {:.2}s: {} (confidence: {}%)",
            started.elapsed().as_secs_f64(),
            analysis.page_type,
            analysis.confidence
        );
        analysis
    }

    async fn confirm_product(&self, url: &str, title: &str, text: &str) -> ProductDecision {
        let prompt = format!(
            r#"Analyze this webpage and determine if it's a product page or not.

Previous page analyses:
{history}

Current URL: {url}
Current Title: {title}

Page content excerpt:
{excerpt}

A product page typically:
1. Is focused on a single product (not a list of products)
2. Has product details like price, description, images
3. Often has "add to cart" or "buy now" functionality
4. Contains product specifications or features

Answer with "YES" if this is a product page, or "NO" if it's not (e.g., if it's a search results page,
category page, homepage, etc.). Then give a brief explanation (1-2 sentences).

Format your response exactly like this:
DECISION: YES or NO
REASON: Your explanation here"#,
            history = self.context(),
            excerpt = truncate_chars(text, CONFIRM_TEXT_CHARS),
        );

        let response = self.client.generate(&prompt).await;
        ::log::info!("Page analysis response received ({} chars)", response.len());

        let decision = parse_decision(&response);
        if let Some(decision) = &decision {
            self.remember(format!(
                "URL: {}, Decision: {}, Reason: {}",
                url,
                if decision.is_product { "PRODUCT" } else { "NOT PRODUCT" },
                decision.reason
            ));
        }

        let decision = decision.unwrap_or_else(|| ProductDecision {
            is_product: false,
            reason: "Could not determine page type".to_string(),
        });
        ::log::info!(
            "Page classification: {} - {}",
            if decision.is_product { "Product page" } else { "Not a product page" },
            decision.reason
        );
        decision
    }
}

fn decision_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?i)DECISION:\s*(YES|NO)").expect("static pattern"),
            Regex::new(r"REASON:\s*([^\n]*)").expect("static pattern"),
        )
    })
}

/// Parse a `DECISION: YES|NO` / `REASON: ...` reply
pub fn parse_decision(response: &str) -> Option<ProductDecision> {
    let (decision, reason) = decision_patterns();
    let answer = decision.captures(response)?.get(1)?.as_str().to_ascii_uppercase();
    let reason = reason
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "No reason provided".to_string());

    Some(ProductDecision {
        is_product: answer == "YES",
        reason,
    })
}

/// Turn a structured page-analysis mapping into a `PageAnalysis`.
///
/// Returns `None` when the mapping has no page type. Recommended links are only kept
/// for category pages; entries without a URL are dropped and empty reasons filled in.
pub fn analysis_from_value(value: &Value, base_category: &str) -> Option<PageAnalysis> {
    let page_type = PageType::from_label(value.get("page_type")?.as_str()?);

    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(50.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(50.0),
        _ => 50.0,
    }
    .clamp(0.0, 100.0)
    .round() as u8;

    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .unwrap_or("No reason provided");

    let links = value
        .get("recommended_links")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(|link| {
                    let url = link.get("url")?.as_str()?.trim();
                    if url.is_empty() {
                        return None;
                    }
                    let reason = link
                        .get("reason")
                        .and_then(Value::as_str)
                        .filter(|r| !r.trim().is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Product appears related to {}", base_category));
                    Some(RecommendedLink {
                        url: url.to_string(),
                        reason,
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if page_type != PageType::Category && !links.is_empty() {
        ::log::warn!("Dropping recommended links for {} page", page_type);
    }

    Some(PageAnalysis::new(page_type, confidence, reason).with_links(links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::tests::{ScriptedBackend, scripted_client};
    use crate::parsers::ElementCounts;

    fn page(url: &str, counts: ElementCounts) -> PageSignals {
        PageSignals {
            url: url.to_string(),
            title: "Kettles".to_string(),
            text: "Kettles for every kitchen".to_string(),
            element_counts: counts,
            ..PageSignals::default()
        }
    }

    #[test]
    fn test_search_context_base_category() {
        let context = SearchContext::new("kettle top rated price under 50");
        assert_eq!(context.base_category, "kettle");
        assert_eq!(SearchContext::new("").base_category, "");
    }

    #[tokio::test]
    async fn test_heuristic_classifier() {
        let classifier = HeuristicClassifier;
        let context = SearchContext::new("kettle");

        let grid = ElementCounts {
            grid_elements: 1,
            ..ElementCounts::default()
        };
        let analysis = classifier.classify(&page("https://shop.example/a", grid), &context).await;
        assert_eq!(analysis.page_type, PageType::Category);
        assert_eq!(analysis.confidence, 70);
        assert!(analysis.recommended_links.is_empty());

        let analysis = classifier
            .classify(&page("https://shop.example/collection/kettles", ElementCounts::default()), &context)
            .await;
        assert_eq!(analysis.page_type, PageType::Category);

        let analysis = classifier
            .classify(&page("https://shop.example/kettle-9", ElementCounts::default()), &context)
            .await;
        assert_eq!(analysis.page_type, PageType::Product);
        assert_eq!(analysis.confidence, 60);
    }

    #[test]
    fn test_analysis_normalizes_links() {
        let value = json!({
            "page_type": "CATEGORY",
            "confidence": 85.4,
            "reason": "grid",
            "recommended_links": [
                {"url": "https://shop.example/p/1", "reason": ""},
                {"reason": "no url"},
                {"url": "https://shop.example/p/2", "reason": "featured"}
            ]
        });
        let analysis = analysis_from_value(&value, "kettle").unwrap();
        assert_eq!(analysis.confidence, 85);
        assert_eq!(analysis.recommended_links.len(), 2);
        assert_eq!(analysis.recommended_links[0].reason, "Product appears related to kettle");
        assert_eq!(analysis.recommended_links[1].reason, "featured");
    }

    #[test]
    fn test_analysis_drops_links_for_product() {
        let value = json!({
            "page_type": "PRODUCT",
            "confidence": 150,
            "reason": "",
            "recommended_links": [{"url": "https://shop.example/p/1"}]
        });
        let analysis = analysis_from_value(&value, "kettle").unwrap();
        assert_eq!(analysis.page_type, PageType::Product);
        assert_eq!(analysis.confidence, 100);
        assert_eq!(analysis.reason, "No reason provided");
        assert!(analysis.recommended_links.is_empty());
    }

    #[test]
    fn test_analysis_requires_page_type() {
        assert!(analysis_from_value(&json!({"is_product": false, "error": "bad"}), "x").is_none());
    }

    #[test]
    fn test_parse_decision() {
        let decision = parse_decision("DECISION: yes\nREASON: Single item with price\nextra").unwrap();
        assert!(decision.is_product);
        assert_eq!(decision.reason, "Single item with price");

        let decision = parse_decision("DECISION: NO").unwrap();
        assert!(!decision.is_product);
        assert_eq!(decision.reason, "No reason provided");

        assert!(parse_decision("I think so").is_none());
    }

    #[tokio::test]
    async fn test_model_classifier_uses_structured_reply() {
        let backend = ScriptedBackend::new([
            r#"{"page_type": "CATEGORY", "confidence": 80, "reason": "grid", "recommended_links": [{"url": "https://shop.example/p/1", "reason": "top"}]}"#,
            r#"{"page_type": "PRODUCT", "confidence": 90, "reason": "single item"}"#,
        ]);
        let classifier = ModelClassifier::new(Arc::new(scripted_client(&backend)));
        let context = SearchContext::new("kettle");

        let first = classifier
            .classify(&page("https://shop.example/c/kettles", ElementCounts::default()), &context)
            .await;
        assert_eq!(first.page_type, PageType::Category);
        assert_eq!(first.recommended_links[0].url, "https://shop.example/p/1");

        let second = classifier
            .classify(&page("https://shop.example/p/1", ElementCounts::default()), &context)
            .await;
        assert_eq!(second.page_type, PageType::Product);

        // the second prompt carries the first decision as context
        let prompts = backend.prompts();
        assert!(prompts[0].contains("No previous context."));
        assert!(prompts[1].contains("URL: https://shop.example/c/kettles, Type: CATEGORY"));
    }

    #[tokio::test]
    async fn test_model_classifier_unusable_reply_is_neither() {
        let backend = ScriptedBackend::new(["no idea"]);
        let classifier = ModelClassifier::new(Arc::new(scripted_client(&backend)));
        let analysis = classifier
            .classify(&page("https://shop.example/", ElementCounts::default()), &SearchContext::new("x"))
            .await;
        assert_eq!(analysis.page_type, PageType::Neither);
        assert!(analysis.reason.starts_with("Page analysis failed"));
    }

    #[tokio::test]
    async fn test_model_confirm_product() {
        let backend = ScriptedBackend::new(["DECISION: NO\nREASON: search results"]);
        let classifier = ModelClassifier::new(Arc::new(scripted_client(&backend)));
        let decision = classifier
            .confirm_product("https://shop.example/s?k=x", "Results", "many items")
            .await;
        assert!(!decision.is_product);
        assert_eq!(decision.reason, "search results");
    }
}
