use clap::{Parser, Subcommand, ValueEnum};
use product_scout::config::{BackendKind, ScoutConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "product-scout")]
#[command(about = "Finds product pages with a browser and a language model and turns them into directory listings")]
#[command(version)]
pub struct Args {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the web for products and collect them
    Scrape(ScrapeArgs),
    /// Submit a saved product file as listings
    Submit(SubmitArgs),
    /// Generate listings directly with the model, without a browser
    Generate(GenerateArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Filter string for env_logger
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Ollama,
    Openai,
}

/// Model backend selection
#[derive(clap::Args, Debug, Default)]
pub struct ModelArgs {
    /// Model backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Model name (default: llama3:latest)
    #[arg(long)]
    pub model: Option<String>,

    /// Host of the local model backend
    #[arg(long)]
    pub host: Option<String>,

    /// Port of the local model backend
    #[arg(long)]
    pub port: Option<u16>,

    /// Use URL and page-structure heuristics instead of the model
    #[arg(long)]
    pub no_ai: bool,
}

impl ModelArgs {
    fn apply(&self, config: &mut ScoutConfig) {
        if let Some(backend) = self.backend {
            config.model.backend = match backend {
                BackendArg::Ollama => BackendKind::Ollama,
                BackendArg::Openai => BackendKind::OpenAi,
            };
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(host) = &self.host {
            config.model.host = host.clone();
        }
        if let Some(port) = self.port {
            config.model.port = port;
        }
        if self.no_ai {
            config.model.enabled = false;
        }
    }
}

/// Content API options
#[derive(clap::Args, Debug, Default)]
pub struct ApiArgs {
    /// Base URL of the content API
    #[arg(long)]
    pub api_url: Option<String>,

    /// Bearer token for the content API (or DIRECTORY_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Site to submit listings to
    #[arg(long)]
    pub site_slug: Option<String>,

    /// Category id for submitted listings
    #[arg(long)]
    pub category_id: Option<String>,

    /// Category name to look up or create when no id is given
    #[arg(long)]
    pub category_name: Option<String>,

    /// Call the real API instead of writing to the local datastore
    #[arg(long)]
    pub live: bool,

    /// Local datastore used in mock mode and as fallback
    #[arg(long)]
    pub local_store: Option<PathBuf>,
}

impl ApiArgs {
    fn apply(&self, config: &mut ScoutConfig) {
        let api = &mut config.api;
        if let Some(url) = &self.api_url {
            api.base_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            api.api_key = Some(key.clone());
        }
        if let Some(slug) = &self.site_slug {
            api.site_slug = Some(slug.clone());
        }
        if let Some(id) = &self.category_id {
            api.category_id = Some(id.clone());
        }
        if let Some(name) = &self.category_name {
            api.category_name = Some(name.clone());
        }
        if self.live {
            api.mock_mode = false;
        }
        if let Some(path) = &self.local_store {
            api.local_store = path.clone();
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ScrapeArgs {
    /// Number of products to collect (default: 10)
    #[arg(long)]
    pub count: Option<usize>,

    /// Product categories to search for
    #[arg(long, num_args = 1..)]
    pub categories: Vec<String>,

    #[arg(long)]
    pub min_price: Option<f64>,

    #[arg(long)]
    pub max_price: Option<f64>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Search engine start page (default: https://duckduckgo.com/)
    #[arg(long)]
    pub search_engine: Option<String>,

    /// URL for the WebDriver instance (or WEBDRIVER_URL)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Product collection file (default: ./data/products.json)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Root directory for run artifacts (default: ./seo_data)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Save screenshots after every navigation
    #[arg(long)]
    pub screenshots: bool,

    /// Save every prompt and response
    #[arg(long)]
    pub debug_ai: bool,

    /// Skip blog commentary
    #[arg(long)]
    pub no_commentary: bool,

    /// Model used for blog commentary on the hosted backend
    #[arg(long)]
    pub commentary_model: Option<String>,

    /// Submit collected products to the content API
    #[arg(long)]
    pub submit_to_api: bool,

    #[command(flatten)]
    pub api: ApiArgs,
}

impl ScrapeArgs {
    pub fn apply(&self, config: &mut ScoutConfig) {
        if let Some(count) = self.count {
            config.count = count;
        }
        if !self.categories.is_empty() {
            config.search.categories = self.categories.clone();
        }
        if self.min_price.is_some() {
            config.search.min_price = self.min_price;
        }
        if self.max_price.is_some() {
            config.search.max_price = self.max_price;
        }
        self.model.apply(config);
        if let Some(url) = &self.search_engine {
            config.search.search_url = url.clone();
        }
        if let Some(url) = &self.webdriver_url {
            config.browser.webdriver_url = url.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(path) = &self.output {
            config.output.products_path = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.output_dir = dir.clone();
        }
        if self.screenshots {
            config.browser.screenshots = true;
        }
        if self.debug_ai {
            config.model.debug = true;
        }
        if self.no_commentary {
            config.commentary = false;
        }
        if let Some(model) = &self.commentary_model {
            config.commentary_model = model.clone();
        }
        if self.submit_to_api {
            config.api.submit = true;
        }
        self.api.apply(config);
    }
}

#[derive(clap::Args, Debug)]
pub struct SubmitArgs {
    /// Product file to submit
    pub file: PathBuf,

    #[command(flatten)]
    pub api: ApiArgs,
}

impl SubmitArgs {
    pub fn apply(&self, config: &mut ScoutConfig) {
        self.api.apply(config);
    }
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// What the listings are about
    #[arg(long)]
    pub search_term: String,

    /// Category the listings belong to
    #[arg(long)]
    pub category: String,

    /// Number of listings to generate
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Root directory; listings go to <dir>/generated_listings/
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn apply(&self, config: &mut ScoutConfig) {
        self.model.apply(config);
        if let Some(dir) = &self.output_dir {
            config.output.output_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrape(args: &[&str]) -> ScoutConfig {
        let argv = ["product-scout", "scrape"].iter().chain(args).copied();
        let parsed = Args::try_parse_from(argv).unwrap();
        let Command::Scrape(scrape) = parsed.command else {
            panic!("expected scrape");
        };
        let mut config = ScoutConfig::default();
        scrape.apply(&mut config);
        config
    }

    #[test]
    fn test_scrape_flags_override_config() {
        let config = scrape(&[
            "--count", "3",
            "--categories", "kettles", "toasters",
            "--max-price", "80",
            "--backend", "openai",
            "--headed",
            "--no-commentary",
            "--submit-to-api",
            "--site-slug", "kitchen",
            "--live",
        ]);
        assert_eq!(config.count, 3);
        assert_eq!(config.search.categories, vec!["kettles", "toasters"]);
        assert_eq!(config.search.max_price, Some(80.0));
        assert_eq!(config.model.backend, BackendKind::OpenAi);
        assert!(!config.browser.headless);
        assert!(!config.commentary);
        assert!(config.api.submit);
        assert_eq!(config.api.site_slug.as_deref(), Some("kitchen"));
        assert!(!config.api.mock_mode);
    }

    #[test]
    fn test_scrape_without_flags_keeps_config() {
        let config = scrape(&[]);
        assert_eq!(config.count, 10);
        assert!(config.browser.headless);
        assert!(config.api.mock_mode);
        assert!(config.model.enabled);
    }

    #[test]
    fn test_generate_requires_term_and_category() {
        assert!(Args::try_parse_from(["product-scout", "generate", "--category", "Bags"]).is_err());

        let parsed = Args::try_parse_from([
            "product-scout",
            "--log-level",
            "debug",
            "generate",
            "--search-term",
            "hiking backpacks",
            "--category",
            "Bags",
        ])
        .unwrap();
        assert_eq!(parsed.log_level.as_filter(), "debug");
        let Command::Generate(generate) = parsed.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.count, 10);
    }
}
