//! The scraping run: search and navigate, extract, add commentary, store, submit.

use crate::ai::writer::listings_in;
use crate::ai::{
    ContentWriter, LinkSelector, ModelClient, PageClassifier, ProductExtractor, classifier_for, selector_for,
};
use crate::api::DirectoryClient;
use crate::config::{BackendKind, ModelConfig, RunPaths, ScoutConfig};
use crate::crawlers::{Browser, Navigator, Pauses, ProductScraper, WebDriverBrowser};
use crate::error::{Result, ScoutError};
use crate::results::{ProductRecord, SubmissionResult};
use crate::storage;
use crate::utils::generate_slug;
use chrono::Local;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a finished run produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub products: usize,
    pub attempts: usize,
    pub failed_extractions: usize,
    /// Where the products were saved; `None` when nothing was collected
    pub products_path: Option<PathBuf>,
    pub submissions: Vec<SubmissionResult>,
    pub interrupted: bool,
}

/// Build the model client, or `None` when the model is disabled
pub fn model_client(config: &ModelConfig, debug_dir: &Path) -> Result<Option<Arc<ModelClient>>> {
    if !config.enabled {
        ::log::warn!("Model disabled, falling back to heuristics");
        return Ok(None);
    }
    let client = ModelClient::from_config(config, Some(debug_dir.to_path_buf()))?;
    Ok(Some(Arc::new(client)))
}

/// Client used for blog commentary: the hosted chat backend when a key is configured,
/// the main client otherwise
pub fn commentary_client(
    config: &ScoutConfig,
    main: Option<Arc<ModelClient>>,
) -> Result<Option<Arc<ModelClient>>> {
    if !config.commentary {
        return Ok(None);
    }
    if config.model.api_key.is_some() && config.model.enabled {
        let chat = ModelConfig {
            backend: BackendKind::OpenAi,
            model: config.commentary_model.clone(),
            ..config.model.clone()
        };
        return Ok(Some(Arc::new(ModelClient::from_config(&chat, None)?)));
    }
    Ok(main)
}

/// One scraping run
pub struct Scout {
    config: ScoutConfig,
    paths: RunPaths,
    browser: Arc<dyn Browser>,
    navigator: Navigator,
    scraper: ProductScraper,
    writer: Option<ContentWriter>,
    products: Vec<ProductRecord>,
    attempts: usize,
    failed_extractions: usize,
}

impl Scout {
    /// Create the run directories, the model clients and the browser session
    pub async fn launch(config: ScoutConfig) -> Result<Self> {
        let paths = RunPaths::new(&config.output.output_dir);
        paths.create_all()?;
        ::log::info!("Run {} writing to {}", paths.run_id, paths.root.display());

        let client = model_client(&config.model, &paths.debug)?;
        let commentary = commentary_client(&config, client.clone())?;

        let started = Instant::now();
        let browser = WebDriverBrowser::connect(&config.browser).await?;
        ::log::info!("Browser initialized in {:.2}s", started.elapsed().as_secs_f64());

        Ok(Self::new(config, paths, Arc::new(browser), client, commentary))
    }

    pub fn new(
        config: ScoutConfig,
        paths: RunPaths,
        browser: Arc<dyn Browser>,
        client: Option<Arc<ModelClient>>,
        commentary: Option<Arc<ModelClient>>,
    ) -> Self {
        let classifier: Arc<dyn PageClassifier> = Arc::from(classifier_for(client.clone()));
        let selector: Arc<dyn LinkSelector> = Arc::from(selector_for(client.clone()));

        let mut navigator = Navigator::new(
            browser.clone(),
            Arc::clone(&classifier),
            selector,
            config.search.clone(),
        );
        if config.browser.screenshots {
            navigator = navigator.with_screenshots(paths.screenshots.clone());
        }

        let scraper = ProductScraper::new(
            browser.clone(),
            classifier,
            client.map(ProductExtractor::new),
        )
        .with_raw_dir(paths.raw.clone());

        Self {
            writer: commentary.map(ContentWriter::new),
            config,
            paths,
            browser,
            navigator,
            scraper,
            products: Vec::new(),
            attempts: 0,
            failed_extractions: 0,
        }
    }

    pub fn with_pauses(mut self, pauses: Pauses) -> Self {
        self.navigator = self.navigator.with_pauses(pauses);
        self.scraper = self.scraper.with_retry_unit(Duration::ZERO);
        self
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Collect products until the target count or the attempt budget is reached, then
    /// clean up. Ctrl-C stops collection early; cleanup still runs.
    pub async fn run(mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let interrupted = tokio::select! {
            _ = self.collect() => false,
            _ = tokio::signal::ctrl_c() => {
                ::log::warn!("Scraper interrupted by user");
                true
            }
        };

        let mut summary = self.finish().await;
        summary.interrupted = interrupted;
        ::log::info!("Scraper completed in {:.2}s", started.elapsed().as_secs_f64());
        Ok(summary)
    }

    async fn collect(&mut self) {
        let target = self.config.count;
        let max_attempts = target * 2;

        while self.products.len() < target && self.attempts < max_attempts {
            self.attempts += 1;
            let iteration = Instant::now();
            ::log::info!(
                "Finding product {}/{} (search attempt {})",
                self.products.len() + 1,
                target,
                self.attempts
            );

            let Some(navigation) = self.navigator.search_and_navigate().await else {
                ::log::warn!(
                    "Search or navigation failed in {:.2}s, trying again",
                    iteration.elapsed().as_secs_f64()
                );
                continue;
            };

            let mut record = self.scraper.extract_current().await;
            if !record.is_product {
                self.failed_extractions += 1;
                ::log::info!(
                    "Not a product: {}",
                    record.error.as_deref().unwrap_or("no reason given")
                );
            } else {
                record
                    .extra
                    .entry("search_term".to_string())
                    .or_insert_with(|| Value::String(navigation.search_term.clone()));
                self.add_commentary(&mut record).await;
                ::log::info!("Found product: {}", record.title().unwrap_or("Unknown product"));
                self.products.push(record);

                let count = self.products.len();
                if count == 1 || count % 5 == 0 {
                    ::log::info!("Saving intermediate results with {} products", count);
                    storage::save(&self.products, &self.config.output.products_path);
                }
            }

            ::log::info!("Iteration completed in {:.2}s", iteration.elapsed().as_secs_f64());
            let extractions = self.products.len() + self.failed_extractions;
            if extractions > 0 {
                ::log::info!(
                    "Current success rate: {:.1}% ({} successes, {} failures)",
                    self.products.len() as f64 / extractions as f64 * 100.0,
                    self.products.len(),
                    self.failed_extractions
                );
            }
        }
    }

    async fn add_commentary(&self, record: &mut ProductRecord) {
        let Some(writer) = &self.writer else { return };
        if record.blog_commentary.is_some() {
            return;
        }
        let started = Instant::now();
        record.blog_commentary = writer.blog_commentary(record).await;
        if record.blog_commentary.is_some() {
            ::log::info!("Generated commentary in {:.2}s", started.elapsed().as_secs_f64());
        }
    }

    /// Close the browser, save what was collected and submit it
    async fn finish(&mut self) -> RunSummary {
        ::log::info!("Closing browser and cleaning up resources");
        if let Err(e) = self.browser.close().await {
            ::log::warn!("Error closing browser: {}", e);
        }

        let mut summary = RunSummary {
            run_id: self.paths.run_id.clone(),
            products: self.products.len(),
            attempts: self.attempts,
            failed_extractions: self.failed_extractions,
            ..RunSummary::default()
        };

        if self.products.is_empty() {
            ::log::warn!("No products were found");
            return summary;
        }

        summary.products_path = storage::save(&self.products, &self.config.output.products_path);
        let processed = self
            .paths
            .processed
            .join(format!("{}_products.json", self.paths.run_id));
        storage::save(&self.products, &processed);

        if self.config.api.submit {
            summary.submissions = self.submit().await;
        }

        let extractions = self.products.len() + self.failed_extractions;
        ::log::info!(
            "Final success rate: {:.1}% over {} extractions",
            self.products.len() as f64 / extractions as f64 * 100.0,
            extractions
        );
        summary
    }

    async fn submit(&self) -> Vec<SubmissionResult> {
        let results = match submit_products(&self.config, &self.products).await {
            Ok(results) => results,
            Err(e) => {
                ::log::error!("Error during API submission: {}", e);
                return Vec::new();
            }
        };

        let path = self
            .paths
            .processed
            .join(format!("{}_submission_results.json", self.paths.run_id));
        match storage::write_json(&results, &path) {
            Ok(()) => ::log::info!("API submission results saved to {}", path.display()),
            Err(e) => ::log::error!("Could not save submission results: {}", e),
        }
        results
    }
}

/// Submit products as listings using the API section of the configuration
pub async fn submit_products(config: &ScoutConfig, products: &[ProductRecord]) -> Result<Vec<SubmissionResult>> {
    let api = &config.api;
    let site_slug = api
        .site_slug
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScoutError::Config("a site slug is required for API submission".into()))?;

    let client = DirectoryClient::new(api)?;
    let category_id = client
        .resolve_category(site_slug, api.category_id.as_deref(), api.category_name.as_deref())
        .await
        .ok_or_else(|| ScoutError::Config("no category id or name available for submission".into()))?;

    let results = client.submit_products(site_slug, &category_id, products).await;
    let succeeded = results.iter().filter(|r| r.success).count();
    ::log::info!("Submitted {}/{} listings to site {}", succeeded, results.len(), site_slug);
    Ok(results)
}

/// Load a product file and submit it
pub async fn submit_file(config: &ScoutConfig, path: &Path) -> Result<Vec<SubmissionResult>> {
    let products: Vec<ProductRecord> = storage::load(path);
    if products.is_empty() {
        return Err(ScoutError::Config(format!("no products found in {}", path.display())));
    }
    submit_products(config, &products).await
}

/// Generate listings straight from the model and save them under
/// `<output>/generated_listings/`
pub async fn generate_listings(
    config: &ScoutConfig,
    search_term: &str,
    category: &str,
    count: usize,
) -> Result<PathBuf> {
    let model = ModelConfig {
        enabled: true,
        ..config.model.clone()
    };
    let client = ModelClient::from_config(&model, None)?;
    let writer = ContentWriter::new(Arc::new(client));
    generate_with(&writer, &config.output.output_dir, search_term, category, count).await
}

async fn generate_with(
    writer: &ContentWriter,
    output_dir: &Path,
    search_term: &str,
    category: &str,
    count: usize,
) -> Result<PathBuf> {
    let started = Instant::now();
    ::log::info!("Generating {} listings for '{}' in {}", count, search_term, category);
    let document = writer.generate_listings(search_term, category, count).await;

    let path = output_dir.join("generated_listings").join(format!(
        "{}_{}.json",
        generate_slug(search_term),
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    storage::write_json(&document, &path)?;

    if let Some(error) = document.get("error").and_then(Value::as_str) {
        ::log::error!("Listing generation failed: {}", error);
        return Err(ScoutError::Model(format!(
            "{} (response saved to {})",
            error,
            path.display()
        )));
    }

    ::log::info!(
        "Generated {} listings in {:.2}s, saved to {}",
        listings_in(&document).len(),
        started.elapsed().as_secs_f64(),
        path.display()
    );
    Ok(path)
}
