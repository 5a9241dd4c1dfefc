//! Search-and-navigate: from a search engine query to a product page.
//!
//! One attempt moves through [`NavState`]: `Searching` opens the engine and picks a
//! result, `Classifying` labels the current page, `Following` navigates to the next
//! candidate. A product page ends the attempt in `Done`; everything else ends in
//! `Failed` and counts toward the navigator's consecutive-failure limit.

use super::browser::Browser;
use crate::ai::{LinkSelector, PageClassifier, SearchContext};
use crate::config::SearchConfig;
use crate::error::{Result, ScoutError};
use crate::filter::UrlFilter;
use crate::parsers::{PageSignals, captcha_indicator};
use crate::results::{PageAnalysis, PageType};
use crate::utils::sanitize_filename;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Searched when no categories are configured
pub const DEFAULT_PRODUCTS: [&str; 10] = [
    "smartphone samsung galaxy s22",
    "laptop dell xps 15",
    "headphones sony wh-1000xm4",
    "air fryer ninja 4-quart",
    "coffee maker breville barista express",
    "running shoes brooks ghost 14",
    "blender vitamix 5200",
    "watch apple watch series 7",
    "vacuum cleaner dyson v11",
    "camera sony a7iii",
];

/// Search box selectors, tried in order
pub const SEARCH_BOX_SELECTORS: [&str; 5] = [
    "input[name='q']",
    "input[name='query']",
    "input[name='search']",
    "#search-box",
    "input[type='search']",
];

const COOKIE_CONSENT_XPATH: &str =
    "//button[contains(., 'Accept') or contains(., 'I agree') or contains(., 'Agree')]";

const RETAILERS: [&str; 5] = ["amazon", "walmart", "target", "etsy", "ebay"];

/// Search terms for a list of categories
pub fn generate_search_terms(categories: &[String]) -> Vec<String> {
    let mut terms = Vec::new();
    for category in categories {
        let category = category.trim();
        if category.is_empty() {
            continue;
        }
        terms.push(format!("{} specific model", category));
        terms.push(format!("{} top rated", category));
        terms.push(format!("{} buy online", category));
        terms.push(format!("{} product page", category));
        terms.push(format!("best {} to buy", category));
        for retailer in RETAILERS {
            terms.push(format!("{} {}", category, retailer));
        }
    }
    terms
}

/// Price suffix appended to a query, empty without bounds
pub fn price_qualifier(min_price: Option<f64>, max_price: Option<f64>) -> String {
    match (min_price, max_price) {
        (Some(min), Some(max)) => format!(" price {}-{}", min, max),
        (Some(min), None) => format!(" price over {}", min),
        (None, Some(max)) => format!(" price under {}", max),
        (None, None) => String::new(),
    }
}

/// A random search term from the configured categories, or from [`DEFAULT_PRODUCTS`]
pub fn pick_search_term(config: &SearchConfig) -> String {
    let terms = generate_search_terms(&config.categories);
    let mut rng = rand::thread_rng();
    match terms.choose(&mut rng) {
        Some(term) => term.clone(),
        None => DEFAULT_PRODUCTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(DEFAULT_PRODUCTS[0])
            .to_string(),
    }
}

/// States of one navigation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum NavState {
    Searching,
    Classifying,
    /// Navigating to the given URL
    Following(String),
    /// The current page is a product page
    Done,
    Failed(String),
}

/// Pauses that let pages settle after navigation
#[derive(Debug, Clone, Copy)]
pub struct Pauses {
    pub after_open: Duration,
    pub after_search: Duration,
    pub after_follow: Duration,
}

impl Pauses {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            after_open: Duration::from_secs(2),
            after_search: Duration::from_secs(5),
            after_follow: Duration::from_millis(config.settle_ms),
        }
    }

    pub fn none() -> Self {
        Self {
            after_open: Duration::ZERO,
            after_search: Duration::ZERO,
            after_follow: Duration::ZERO,
        }
    }
}

/// Result of a successful attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    pub product_url: String,
    pub search_term: String,
    /// Every classified page, in order
    pub visited: Vec<String>,
}

/// Drives the browser from a search query to a product page
pub struct Navigator {
    browser: Arc<dyn Browser>,
    classifier: Arc<dyn PageClassifier>,
    selector: Arc<dyn LinkSelector>,
    filter: UrlFilter,
    config: SearchConfig,
    pauses: Pauses,
    screenshot_dir: Option<PathBuf>,
    failures: u32,
}

/// Mutable state of one attempt
struct Attempt {
    context: SearchContext,
    visited: Vec<String>,
}

impl Navigator {
    pub fn new(
        browser: Arc<dyn Browser>,
        classifier: Arc<dyn PageClassifier>,
        selector: Arc<dyn LinkSelector>,
        config: SearchConfig,
    ) -> Self {
        let pauses = Pauses::from_config(&config);
        Self {
            browser,
            classifier,
            selector,
            filter: UrlFilter::default(),
            config,
            pauses,
            screenshot_dir: None,
            failures: 0,
        }
    }

    pub fn with_pauses(mut self, pauses: Pauses) -> Self {
        self.pauses = pauses;
        self
    }

    /// Save a screenshot after every navigation into `dir`
    pub fn with_screenshots(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = Some(dir);
        self
    }

    pub fn with_filter(mut self, filter: UrlFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Consecutive failed attempts so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Search with a random term and navigate to a product page
    pub async fn search_and_navigate(&mut self) -> Option<Navigation> {
        let term = pick_search_term(&self.config);
        self.navigate_from_search(&term).await
    }

    /// Search for `search_term` (plus price qualifiers) and navigate to a product page.
    ///
    /// Returns `None` on failure. Once the failure limit is reached the counter resets and
    /// the attempt is skipped.
    pub async fn navigate_from_search(&mut self, search_term: &str) -> Option<Navigation> {
        if self.failures >= self.config.max_search_failures {
            ::log::warn!(
                "Too many consecutive search failures ({}), resetting the counter",
                self.failures
            );
            self.failures = 0;
            return None;
        }

        let started = Instant::now();
        let mut attempt = Attempt {
            context: SearchContext::new(search_term),
            visited: Vec::new(),
        };
        let mut state = NavState::Searching;

        loop {
            ::log::debug!("Navigation state: {:?}", state);
            state = match state {
                NavState::Searching => self.searching(&attempt).await,
                NavState::Classifying => self.classifying(&mut attempt).await,
                NavState::Following(url) => self.following(&url).await,
                NavState::Done => {
                    let product_url = attempt.visited.last().cloned().unwrap_or_default();
                    ::log::info!(
                        "Reached product page {} after {} page(s) in {:.2}s",
                        product_url,
                        attempt.visited.len(),
                        started.elapsed().as_secs_f64()
                    );
                    self.failures = 0;
                    return Some(Navigation {
                        product_url,
                        search_term: attempt.context.search_term,
                        visited: attempt.visited,
                    });
                }
                NavState::Failed(reason) => {
                    self.failures += 1;
                    ::log::warn!(
                        "Navigation failed ({}/{}): {}",
                        self.failures,
                        self.config.max_search_failures,
                        reason
                    );
                    return None;
                }
            };
        }
    }

    async fn searching(&self, attempt: &Attempt) -> NavState {
        let query = format!(
            "{}{}",
            attempt.context.search_term,
            price_qualifier(self.config.min_price, self.config.max_price)
        );
        ::log::info!("Searching for: {}", query);

        match self.search(&query, &attempt.context.search_term).await {
            Ok(url) => NavState::Following(url),
            Err(e) => NavState::Failed(e.to_string()),
        }
    }

    /// Run the query on the search engine and choose a result link
    async fn search(&self, query: &str, search_term: &str) -> Result<String> {
        let started = Instant::now();
        self.browser.goto(&self.config.search_url).await?;
        tokio::time::sleep(self.pauses.after_open).await;

        match self.browser.click_first(COOKIE_CONSENT_XPATH).await {
            Ok(true) => ::log::debug!("Dismissed cookie consent"),
            Ok(false) => {}
            Err(e) => ::log::debug!("Cookie consent check failed: {}", e),
        }

        if !self.browser.submit_search(&SEARCH_BOX_SELECTORS, query).await? {
            return Err(ScoutError::Navigation("could not find a search box".into()));
        }
        tokio::time::sleep(self.pauses.after_search).await;
        self.capture("search_results", query).await;

        let source = self.browser.source().await?;
        if let Some(indicator) = captcha_indicator(&source) {
            return Err(ScoutError::Navigation(format!(
                "CAPTCHA detected on results page ({})",
                indicator
            )));
        }

        let results_url = self.browser.current_url().await?;
        let signals = PageSignals::from_html(&results_url, None, &source);
        let candidates = self
            .filter
            .filter_links(signals.links.iter().map(|l| l.url.as_str()));
        ::log::info!(
            "Found {} usable result links in {:.2}s",
            candidates.len(),
            started.elapsed().as_secs_f64()
        );
        if candidates.is_empty() {
            return Err(ScoutError::Navigation("no usable result links".into()));
        }

        match self.selector.select_result_link(&candidates, search_term).await {
            Some(choice) => {
                ::log::info!("Selected result #{}: {} ({})", choice.index, choice.url, choice.reason);
                Ok(choice.url)
            }
            None => Err(ScoutError::Navigation("no result link selected".into())),
        }
    }

    async fn classifying(&self, attempt: &mut Attempt) -> NavState {
        if attempt.visited.len() >= self.config.max_depth {
            return NavState::Failed(format!(
                "maximum depth {} reached without a product page",
                self.config.max_depth
            ));
        }

        let page = match self.read_page().await {
            Ok(page) => page,
            Err(e) => return NavState::Failed(e.to_string()),
        };
        attempt.visited.push(page.url.clone());

        let started = Instant::now();
        let analysis = self.classifier.classify(&page, &attempt.context).await;
        ::log::info!(
            "Page {} at depth {} classified as {} ({}%) in {:.2}s: {}",
            page.url,
            attempt.visited.len(),
            analysis.page_type,
            analysis.confidence,
            started.elapsed().as_secs_f64(),
            analysis.reason
        );

        match analysis.page_type {
            PageType::Product => NavState::Done,
            PageType::Category => self.next_from_category(&page, &analysis, attempt).await,
            PageType::Neither => NavState::Failed(format!("not a product or category page: {}", analysis.reason)),
        }
    }

    /// Pick where to go from a category page
    async fn next_from_category(&self, page: &PageSignals, analysis: &PageAnalysis, attempt: &Attempt) -> NavState {
        if !analysis.recommended_links.is_empty() {
            for link in &analysis.recommended_links {
                if attempt.visited.contains(&link.url) {
                    ::log::debug!("Skipping already visited recommendation {}", link.url);
                    continue;
                }
                ::log::info!("Following recommended link {} ({})", link.url, link.reason);
                return NavState::Following(link.url.clone());
            }
            return NavState::Failed("every recommended link was already visited".into());
        }

        let candidates = page
            .product_links
            .iter()
            .map(|l| l.url.clone())
            .filter(|url| !attempt.visited.contains(url))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return NavState::Failed("category page has no product links".into());
        }

        match self
            .selector
            .select_link(&candidates, &page.url, &attempt.context.search_term)
            .await
        {
            Some(choice) => {
                ::log::info!("Following product link {} ({})", choice.url, choice.reason);
                NavState::Following(choice.url)
            }
            None => NavState::Failed("no product link selected".into()),
        }
    }

    async fn following(&self, url: &str) -> NavState {
        if let Err(e) = self.browser.goto(url).await {
            return NavState::Failed(e.to_string());
        }
        tokio::time::sleep(self.pauses.after_follow).await;
        self.capture("page", url).await;
        NavState::Classifying
    }

    async fn read_page(&self) -> Result<PageSignals> {
        let url = self.browser.current_url().await?;
        let title = self.browser.title().await.unwrap_or_default();
        let source = self.browser.source().await?;
        Ok(PageSignals::from_html(&url, Some(&title), &source))
    }

    async fn capture(&self, label: &str, name: &str) {
        let Some(dir) = &self.screenshot_dir else { return };
        let path = dir.join(format!(
            "{}_{}_{}.png",
            label,
            sanitize_filename(name),
            chrono::Local::now().format("%H%M%S")
        ));
        match self.browser.screenshot(&path).await {
            Ok(()) => ::log::debug!("Saved screenshot {}", path.display()),
            Err(e) => ::log::warn!("Screenshot failed: {}", e),
        }
    }
}
