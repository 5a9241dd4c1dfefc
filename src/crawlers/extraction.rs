use super::browser::Browser;
use crate::ai::{ExtractionInput, PageClassifier, ProductExtractor};
use crate::error::Result;
use crate::parsers::PageMetadata;
use crate::parsers::meta::{extract_metadata, image_candidates};
use crate::results::ProductRecord;
use crate::utils::{extract_domain, generate_slug, sanitize_filename};
use chrono::{Local, Utc};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Attempts made to read and extract a page
pub const MAX_EXTRACTION_ATTEMPTS: u32 = 2;

/// Image candidates handed to the extractor
pub const MAX_IMAGE_CANDIDATES: usize = 10;

/// Turns the browser's current page into a product record
pub struct ProductScraper {
    browser: Arc<dyn Browser>,
    classifier: Arc<dyn PageClassifier>,
    /// `None` when no model is available; records then come from page metadata alone
    extractor: Option<ProductExtractor>,
    retry_unit: Duration,
    raw_dir: Option<PathBuf>,
}

impl ProductScraper {
    pub fn new(
        browser: Arc<dyn Browser>,
        classifier: Arc<dyn PageClassifier>,
        extractor: Option<ProductExtractor>,
    ) -> Self {
        Self {
            browser,
            classifier,
            extractor,
            retry_unit: Duration::from_secs(1),
            raw_dir: None,
        }
    }

    /// Base of the retry delay; attempt `n` waits `2 * n` units
    pub fn with_retry_unit(mut self, unit: Duration) -> Self {
        self.retry_unit = unit;
        self
    }

    /// Keep the source of every extracted page in `dir`
    pub fn with_raw_dir(mut self, dir: PathBuf) -> Self {
        self.raw_dir = Some(dir);
        self
    }

    /// Extract the product on the current page.
    ///
    /// Never fails: browser errors are retried, then reported as a rejected record.
    pub async fn extract_current(&self) -> ProductRecord {
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=MAX_EXTRACTION_ATTEMPTS {
            match self.try_extract().await {
                Ok(record) => {
                    ::log::info!(
                        "Extraction finished in {:.2}s (product: {})",
                        started.elapsed().as_secs_f64(),
                        record.is_product
                    );
                    return record;
                }
                Err(e) => {
                    ::log::warn!(
                        "Extraction attempt {}/{} failed: {}",
                        attempt,
                        MAX_EXTRACTION_ATTEMPTS,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < MAX_EXTRACTION_ATTEMPTS {
                        tokio::time::sleep(self.retry_unit * 2 * attempt).await;
                    }
                }
            }
        }

        ProductRecord::rejected(format!(
            "Extraction failed after {} attempts: {}",
            MAX_EXTRACTION_ATTEMPTS, last_error
        ))
    }

    async fn try_extract(&self) -> Result<ProductRecord> {
        let url = self.browser.current_url().await?;
        let title = self.browser.title().await.unwrap_or_default();
        let source = self.browser.source().await?;
        let text = self.browser.body_text().await?;

        let decision = self.classifier.confirm_product(&url, &title, &text).await;
        if !decision.is_product {
            ::log::info!("Skipping {}: {}", url, decision.reason);
            return Ok(ProductRecord::rejected(format!(
                "Not a product page: {}",
                decision.reason
            )));
        }

        self.save_raw(&url, &source).await;

        let metadata = extract_metadata(&source);
        let base = Url::parse(&url).ok();
        let input = ExtractionInput {
            url: url.clone(),
            domain: extract_domain(&url),
            text,
            metadata: metadata.to_json(),
            image_candidates: image_candidates(&source, base.as_ref(), MAX_IMAGE_CANDIDATES),
        };
        ::log::debug!(
            "Collected {} metadata entries and {} image candidates for {}",
            metadata.len(),
            input.image_candidates.len(),
            url
        );

        let value = match &self.extractor {
            Some(extractor) => extractor.extract(&input).await,
            None => metadata_product(&input, &metadata),
        };

        let mut record = ProductRecord::from_extraction(value);
        if record.is_product {
            enrich(&mut record, &input, &metadata);
            ::log::info!(
                "Extracted product: {}",
                record.title().unwrap_or("Unknown product")
            );
        }
        Ok(record)
    }

    async fn save_raw(&self, url: &str, source: &str) {
        let Some(dir) = &self.raw_dir else { return };
        let path = dir.join(format!("{}.html", sanitize_filename(url)));
        if let Err(e) = tokio::fs::write(&path, source).await {
            ::log::warn!("Could not save page source to {}: {}", path.display(), e);
        }
    }
}

/// Product mapping built from page metadata alone
fn metadata_product(input: &ExtractionInput, metadata: &PageMetadata) -> Value {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| metadata.fields.get(*k))
            .filter(|v| !v.is_empty())
            .cloned()
    };

    let Some(name) = field(&["og_title", "page_title"]) else {
        return serde_json::json!({
            "is_product": false,
            "error": "No model available and the page has no title metadata",
        });
    };

    let mut map = Map::new();
    map.insert("is_product".into(), Value::Bool(true));
    map.insert("product_name".into(), Value::String(name));
    if let Some(description) = field(&["og_description", "meta_description"]) {
        map.insert("description".into(), Value::String(description));
    }
    if let Some(image) = field(&["og_image"]).or_else(|| input.image_candidates.first().cloned()) {
        map.insert("main_image_url".into(), Value::String(image));
    }
    map.insert("source_url".into(), Value::String(input.url.clone()));
    map.insert("source_domain".into(), Value::String(input.domain.clone()));
    Value::Object(map)
}

/// Add slug, timestamp, identifier, SEO metadata and image fallbacks
fn enrich(record: &mut ProductRecord, input: &ExtractionInput, metadata: &PageMetadata) {
    if record.slug.as_deref().is_none_or(str::is_empty) {
        let slug = generate_slug(record.title().unwrap_or_default());
        if !slug.is_empty() {
            record.slug = Some(slug);
        }
    }
    if record.id.is_none() {
        record.id = Some(format!("product_{}", Utc::now().timestamp_millis()));
    }
    record.scraped_at = Some(Local::now().to_rfc3339());

    if record.source_url.is_none() {
        record.source_url = Some(input.url.clone());
    }
    if record.source_domain.is_none() {
        record.source_domain = Some(input.domain.clone());
    }
    if record.main_image_url.is_none() {
        record.main_image_url = input.image_candidates.first().cloned();
    }

    let seo = metadata.to_seo();
    if !seo.is_empty() {
        record.seo = Some(seo);
    }
}
