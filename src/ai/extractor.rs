use super::client::ModelClient;
use super::schema::{MINIMAL_PRODUCT, PRODUCT_DATA};
use crate::utils::truncate_chars;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Characters of page text given to the full extraction prompt
pub const EXTRACTION_TEXT_CHARS: usize = 4000;

/// Characters of page text given to the minimal fallback prompt
pub const FALLBACK_TEXT_CHARS: usize = 2000;

/// Number of product fields the completion rate is measured against
pub const TRACKED_FIELDS: usize = 18;

const IMPORTANT_FIELDS: [&str; 5] = ["product_name", "price", "description", "brand", "main_image_url"];

/// What the extractor sees of a page
#[derive(Debug, Clone, Default)]
pub struct ExtractionInput {
    pub url: String,
    pub domain: String,
    pub text: String,
    /// Flat metadata mapping (meta tags, Open Graph, JSON-LD)
    pub metadata: Value,
    pub image_candidates: Vec<String>,
}

/// Pulls structured product records out of page text with the model
pub struct ProductExtractor {
    client: Arc<ModelClient>,
}

const MEMORY: &str = "product_extraction";
const MEMORY_CAPACITY: usize = 3;

impl ProductExtractor {
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self { client }
    }

    /// Extract a product mapping. Always returns an object with an `is_product` flag;
    /// negative results carry an `error`.
    pub async fn extract(&self, input: &ExtractionInput) -> Value {
        let started = Instant::now();
        ::log::info!("Requesting comprehensive product extraction for {}", input.url);

        let result = self
            .client
            .generate_structured(&self.extraction_prompt(input), &PRODUCT_DATA)
            .await;

        let mut result = if usable(&result) {
            ::log::info!(
                "Received structured product data in {:.2}s",
                started.elapsed().as_secs_f64()
            );
            result
        } else {
            ::log::warn!(
                "Structured extraction failed ({}), retrying with the minimal schema",
                error_of(&result)
            );
            let fallback = self
                .client
                .generate_structured(&fallback_prompt(input), &MINIMAL_PRODUCT)
                .await;
            if usable(&fallback) {
                ::log::info!("Successfully extracted fallback data");
                fallback
            } else {
                ::log::error!("Fallback extraction also failed: {}", error_of(&fallback));
                return json!({
                    "is_product": false,
                    "error": format!("Extraction failed: {}", error_of(&fallback)),
                });
            }
        };

        if is_product(&result) {
            fill_source(&mut result, input);
            let name = result
                .get("product_name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown product")
                .to_string();
            self.client.remember(
                MEMORY,
                MEMORY_CAPACITY,
                format!("Extracted: {} from {}", name, input.domain),
            );
            log_completion(&result);
        } else {
            ::log::info!(
                "AI determined this is not a product page: {}",
                result.get("error").and_then(Value::as_str).unwrap_or("No reason provided")
            );
        }
        result
    }

    fn extraction_prompt(&self, input: &ExtractionInput) -> String {
        let history = self.client.recall(MEMORY, MEMORY_CAPACITY);
        let metadata = serde_json::to_string_pretty(&input.metadata).unwrap_or_default();
        let images = if input.image_candidates.is_empty() {
            "No image candidates found".to_string()
        } else {
            input.image_candidates.join("\n")
        };

        format!(
            r#"You are an expert product information extractor for an e-commerce directory.
Your task is to analyze this webpage and extract COMPREHENSIVE product information.

EXTREMELY IMPORTANT:
1. Include ALL available fields, not just the minimum required ones
2. Your response quality will be rated based on completeness (how many fields you accurately fill)

Recent extractions:
{history}

WEBPAGE TO ANALYZE:
URL: {url}
Domain: {domain}

Page content excerpt:
{text}

Candidate product image URLs:
{images}

Additional metadata:
{metadata}

Also generate a catchy seo_listing_title (55-60 characters), original_commentary (6-7 sentences
discussing the product without copying its description) and 3 backlink_suggestions.

IF NOT A PRODUCT PAGE, set is_product to false with an error message.
IF THIS IS A PRODUCT PAGE, extract as many details as possible."#,
            url = input.url,
            domain = input.domain,
            text = truncate_chars(&input.text, EXTRACTION_TEXT_CHARS),
        )
    }
}

fn fallback_prompt(input: &ExtractionInput) -> String {
    format!(
        r#"Analyze this webpage and determine if it contains a product.
If it IS a product page, set is_product to true and give product_name, price and description.
If it is NOT a product page, set is_product to false and explain why in error.

URL: {}
Page content excerpt: {}"#,
        input.url,
        truncate_chars(&input.text, FALLBACK_TEXT_CHARS)
    )
}

/// A structured result is usable when it parsed and carries the `is_product` flag
fn usable(result: &Value) -> bool {
    result.get("raw_response").is_none() && result.get("is_product").is_some_and(Value::is_boolean)
}

fn is_product(result: &Value) -> bool {
    result.get("is_product").and_then(Value::as_bool).unwrap_or(false)
}

fn error_of(result: &Value) -> String {
    result
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("response had no is_product flag")
        .to_string()
}

fn fill_source(result: &mut Value, input: &ExtractionInput) {
    let Value::Object(map) = result else { return };
    for (key, value) in [("source_url", &input.url), ("source_domain", &input.domain)] {
        let missing = map.get(key).and_then(Value::as_str).is_none_or(str::is_empty);
        if missing {
            map.insert(key.to_string(), Value::String(value.clone()));
        }
    }
}

/// Names of the fields holding a non-empty value
pub fn filled_fields(result: &Value) -> Vec<String> {
    let Value::Object(map) = result else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        })
        .map(|(k, _)| k.clone())
        .collect()
}

fn log_completion(result: &Value) {
    let filled = filled_fields(result);
    let rate = filled.len() as f64 / TRACKED_FIELDS as f64 * 100.0;
    ::log::info!(
        "Field completion rate: {:.1}% ({}/{} fields)",
        rate,
        filled.len(),
        TRACKED_FIELDS
    );
    ::log::debug!("Extracted fields: {}", filled.join(", "));

    let missing = IMPORTANT_FIELDS
        .iter()
        .filter(|f| !filled.iter().any(|k| k == *f))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        ::log::warn!("Missing important fields: {}", missing.join(", "));
    }
}
