use super::client::ModelClient;
use super::schema::LINK_SELECTION;
use crate::filter::{LinkKind, classify_url, score_url};
use crate::utils::extract_domain;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

/// Links shown to the model in one standard selection
pub const SAMPLE_SIZE: usize = 10;

/// Links shown to the model in one structured selection
pub const STRUCTURED_MAX_LINKS: usize = 15;

/// Previously chosen links remembered for deduplication
pub const HISTORY_CAP: usize = 20;

/// A selected link and why it was picked
#[derive(Debug, Clone, PartialEq)]
pub struct LinkChoice {
    pub url: String,
    /// 1-based position in the caller's `links`
    pub index: usize,
    pub reason: String,
    /// Whether the chooser believes the link is a product page, when it said so
    pub is_product_page: Option<bool>,
    /// The choice was random because the answer could not be used
    pub fallback: bool,
}

/// Chooses which link to follow next
#[async_trait]
pub trait LinkSelector: Send + Sync {
    /// Pick one of `links` found on `current_url`, avoiding earlier picks
    async fn select_link(&self, links: &[String], current_url: &str, search_term: &str) -> Option<LinkChoice>;

    /// Pick the search result most likely to be a product page
    async fn select_result_link(&self, links: &[String], search_term: &str) -> Option<LinkChoice>;
}

/// Pick the model selector when a client is available, the heuristic otherwise
pub fn selector_for(client: Option<Arc<ModelClient>>) -> Box<dyn LinkSelector> {
    match client {
        Some(client) => Box::new(ModelLinkSelector::new(client)),
        None => Box::new(HeuristicLinkSelector::default()),
    }
}

/// Links chosen earlier in the run
#[derive(Debug, Default)]
pub struct SelectionHistory {
    chosen: Vec<String>,
}

impl SelectionHistory {
    /// Candidates not chosen before; resets the history when nothing new remains
    pub fn fresh(&mut self, links: &[String]) -> Vec<String> {
        let fresh = links
            .iter()
            .filter(|l| !self.chosen.contains(l))
            .cloned()
            .collect::<Vec<_>>();
        ::log::debug!("After filtering previously chosen links: {} links remain", fresh.len());

        if fresh.is_empty() {
            ::log::warn!("No new links available, resetting history");
            self.chosen.clear();
            return links.to_vec();
        }
        fresh
    }

    pub fn record(&mut self, link: &str) {
        self.chosen.push(link.to_string());
        if self.chosen.len() > HISTORY_CAP {
            let excess = self.chosen.len() - HISTORY_CAP;
            self.chosen.drain(..excess);
        }
    }

    pub fn contains(&self, link: &str) -> bool {
        self.chosen.iter().any(|l| l == link)
    }

    pub fn len(&self) -> usize {
        self.chosen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }
}

fn sample_links(links: Vec<String>) -> Vec<String> {
    if links.len() <= SAMPLE_SIZE {
        return links;
    }
    let mut rng = rand::thread_rng();
    let sample = links
        .choose_multiple(&mut rng, SAMPLE_SIZE)
        .cloned()
        .collect::<Vec<_>>();
    ::log::debug!("Sampled {} links from {} available links", sample.len(), links.len());
    sample
}

fn random_choice(links: &[String]) -> Option<String> {
    links.choose(&mut rand::thread_rng()).cloned()
}

fn selection_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?i)SELECTION:\s*\**\s*(\d+)").expect("static pattern"),
            Regex::new(r"(?i)REASON:\s*([^\n]*)").expect("static pattern"),
        )
    })
}

/// Parse a `SELECTION: n` / `REASON: ...` reply, returning the raw number and reason
pub fn parse_selection(response: &str) -> Option<(usize, String)> {
    let (selection, reason) = selection_patterns();
    let number = selection.captures(response)?.get(1)?.as_str().parse::<usize>().ok()?;
    let reason = reason
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "No reason provided".to_string());
    Some((number, reason))
}

/// Number each link and annotate it with its domain and URL shape
pub fn annotate_links(links: &[String]) -> String {
    links
        .iter()
        .enumerate()
        .map(|(i, link)| {
            format!(
                "{}. {} (Domain: {}, Type: {})",
                i + 1,
                link,
                extract_domain(link),
                classify_url(link)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const MEMORY: &str = "link_selection";
const MEMORY_CAPACITY: usize = 10;

/// Model-driven link selection with a history of earlier picks
pub struct ModelLinkSelector {
    client: Arc<ModelClient>,
    history: Mutex<SelectionHistory>,
}

impl ModelLinkSelector {
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self {
            client,
            history: Mutex::new(SelectionHistory::default()),
        }
    }

    fn fresh_sample(&self, links: &[String]) -> Vec<String> {
        let fresh = match self.history.lock() {
            Ok(mut history) => history.fresh(links),
            Err(_) => links.to_vec(),
        };
        sample_links(fresh)
    }

    fn record(&self, link: &str) {
        if let Ok(mut history) = self.history.lock() {
            history.record(link);
        }
    }

    fn context(&self) -> String {
        self.client.recall(MEMORY, MEMORY_CAPACITY)
    }

    fn remember(&self, entry: String) {
        self.client.remember(MEMORY, MEMORY_CAPACITY, entry);
    }
}

#[async_trait]
impl LinkSelector for ModelLinkSelector {
    async fn select_link(&self, links: &[String], current_url: &str, search_term: &str) -> Option<LinkChoice> {
        if links.is_empty() {
            ::log::warn!("No links provided to select from");
            return None;
        }
        let started = Instant::now();
        ::log::info!("Selecting from {} links for search term: '{}'", links.len(), search_term);

        let sample = self.fresh_sample(links);

        let mut domains: HashMap<String, usize> = HashMap::new();
        for link in &sample {
            *domains.entry(extract_domain(link)).or_default() += 1;
        }
        ::log::debug!("Domain distribution in link sample: {:?}", domains);

        let numbered = sample
            .iter()
            .enumerate()
            .map(|(i, link)| format!("{}. {}", i + 1, link))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"You are a product discovery assistant helping find interesting products online.

Current search term: "{search_term}"
Current page: {current_url}

Previous selections:
{history}

Please analyze these potential product links and select the SINGLE most promising one that:
1. Is most likely to be a product page (not a category or search results page)
2. Is different from previous selections
3. Appears most relevant to the search term
4. Seems to be from a legitimate store (not spam)

Available links:
{numbered}

Respond ONLY with the number of your selection (1-{count}) and a brief reason. Format:
SELECTION: [number]
REASON: [brief explanation]"#,
            history = self.context(),
            count = sample.len(),
        );

        let response = self.client.generate(&prompt).await;
        ::log::info!("AI link selection response received ({} chars)", response.len());
        self.remember(format!("Search: '{}', Selected: {}", search_term, response.trim()));

        let choice = match parse_selection(&response) {
            Some((index, reason)) if (1..=sample.len()).contains(&index) => Some(LinkChoice {
                url: sample[index - 1].clone(),
                index: offered_position(links, &sample[index - 1]),
                reason,
                is_product_page: None,
                fallback: false,
            }),
            Some((index, _)) => {
                ::log::error!("Selection number {} out of range (1-{})", index, sample.len());
                None
            }
            None => {
                ::log::error!("No selection number found in AI response");
                None
            }
        };

        let choice = match choice {
            Some(choice) => choice,
            None => {
                ::log::warn!("Couldn't parse AI selection, using random fallback");
                let url = random_choice(&sample)?;
                LinkChoice {
                    index: offered_position(links, &url),
                    url,
                    reason: "Random fallback".to_string(),
                    is_product_page: None,
                    fallback: true,
                }
            }
        };

        self.record(&choice.url);
        ::log::info!("Selected link #{}: {} ({})", choice.index, choice.url, choice.reason);
        ::log::info!("Link selection completed in {:.2}s", started.elapsed().as_secs_f64());
        Some(choice)
    }

    async fn select_result_link(&self, links: &[String], search_term: &str) -> Option<LinkChoice> {
        if links.is_empty() {
            return None;
        }
        let sample = &links[..links.len().min(STRUCTURED_MAX_LINKS)];

        let prompt = format!(
            r#"You are a product link analyzer tasked with selecting the BEST link from search results.

SEARCH TERM: "{search_term}"

You must select exactly ONE link that is most likely to be a direct product page (not a category page).

LINKS TO ANALYZE:
{links}

SELECTION CRITERIA:
1. Prioritize direct product pages over category pages
2. Look for URL patterns that indicate product pages (e.g., /product/, /item/, /dp/, product ID numbers)
3. Prefer links from major retailers (Amazon, Walmart, Target, eBay, Etsy, etc.)
4. URLs ending with ID numbers often indicate product pages
5. URLs containing 'category', 'collection', 'shop', 'search' typically indicate category pages"#,
            links = annotate_links(sample),
        );

        ::log::info!("Requesting structured link selection from AI");
        let result = self.client.generate_structured(&prompt, &LINK_SELECTION).await;

        let index = result.get("selection").and_then(Value::as_u64).map(|n| n as usize);
        let reason = result
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("No reason provided")
            .to_string();
        let is_product_page = result.get("is_product_page").and_then(Value::as_bool);

        match index {
            Some(index) if (1..=sample.len()).contains(&index) => {
                let url = sample[index - 1].clone();
                ::log::info!(
                    "AI structured link selection: #{} - {} (product: {:?})",
                    index,
                    reason,
                    is_product_page
                );
                self.record(&url);
                Some(LinkChoice {
                    url,
                    index,
                    reason,
                    is_product_page,
                    fallback: false,
                })
            }
            _ => {
                ::log::warn!("Invalid structured selection {:?}, falling back to standard selection", index);
                self.select_link(links, "search results", search_term).await
            }
        }
    }
}

/// 1-based position of `url` in `links`
fn offered_position(links: &[String], url: &str) -> usize {
    links.iter().position(|link| link == url).map_or(0, |i| i + 1)
}

/// Link selection by URL pattern score alone
#[derive(Debug, Default)]
pub struct HeuristicLinkSelector {
    history: Mutex<SelectionHistory>,
}

impl HeuristicLinkSelector {
    fn best(&self, links: &[String]) -> Option<LinkChoice> {
        let fresh = match self.history.lock() {
            Ok(mut history) => history.fresh(links),
            Err(_) => links.to_vec(),
        };

        // first link wins ties
        let url = fresh.iter().fold(None::<&String>, |best, link| match best {
            Some(b) if score_url(b) >= score_url(link) => best,
            _ => Some(link),
        })?;

        let kind = classify_url(url);
        let choice = LinkChoice {
            url: url.clone(),
            index: offered_position(links, url),
            reason: format!("Highest URL pattern score ({})", kind),
            is_product_page: Some(kind == LinkKind::LikelyProduct),
            fallback: false,
        };
        if let Ok(mut history) = self.history.lock() {
            history.record(&choice.url);
        }
        Some(choice)
    }
}

#[async_trait]
impl LinkSelector for HeuristicLinkSelector {
    async fn select_link(&self, links: &[String], _current_url: &str, _search_term: &str) -> Option<LinkChoice> {
        self.best(links)
    }

    async fn select_result_link(&self, links: &[String], _search_term: &str) -> Option<LinkChoice> {
        self.best(&links[..links.len().min(STRUCTURED_MAX_LINKS)])
    }
}
