use crate::error::{Result, ScoutError};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which model backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local generation endpoint (`/api/generate`)
    Ollama,
    /// Hosted chat-completion endpoint (`/v1/chat/completions`)
    OpenAi,
}

/// Configuration for the model client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Use the model at all; heuristics take over when disabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Model name passed to the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Host of the local backend
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the local backend
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the hosted chat-completion API
    #[serde(default = "default_openai_url")]
    pub openai_url: String,

    /// API key for the hosted backend (falls back to OPENAI_API_KEY)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Minimum interval between two model calls, in milliseconds
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Sampling temperature (hosted backend only)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Write every prompt and response into the run's debug directory
    #[serde(default)]
    pub debug: bool,
}

/// Configuration for searching and page navigation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Product categories used to build search terms
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub min_price: Option<f64>,

    #[serde(default)]
    pub max_price: Option<f64>,

    /// Search engine start page
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Consecutive failed attempts before search-and-navigate gives up
    #[serde(default = "default_max_search_failures")]
    pub max_search_failures: u32,

    /// Maximum pages visited in one navigation attempt
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Pause after each navigation, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Configuration for the WebDriver session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Page load timeout in seconds
    #[serde(default = "default_page_load_secs")]
    pub page_load_secs: u64,

    /// Save screenshots of every visited page into the run directory
    #[serde(default)]
    pub screenshots: bool,
}

/// Where things get written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for per-run artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Product collection file
    #[serde(default = "default_products_path")]
    pub products_path: PathBuf,
}

/// Configuration for the content API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Submit collected products as listings
    #[serde(default)]
    pub submit: bool,

    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Bearer token (falls back to DIRECTORY_API_KEY)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub site_slug: Option<String>,

    #[serde(default)]
    pub category_id: Option<String>,

    /// Category to look up or create when no id is given
    #[serde(default)]
    pub category_name: Option<String>,

    /// Use the local datastore file instead of the network
    #[serde(default = "default_mock_mode")]
    pub mock_mode: bool,

    /// Local datastore file used in mock mode and as network fallback
    #[serde(default = "default_local_store")]
    pub local_store: PathBuf,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// Number of products to collect
    #[serde(default = "default_count")]
    pub count: usize,

    /// Generate blog commentary for each product
    #[serde(default = "default_commentary")]
    pub commentary: bool,

    /// Model used for commentary (hosted backend)
    #[serde(default = "default_commentary_model")]
    pub commentary_model: String,
}

impl ScoutConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScoutError::Config(e.to_string()))
    }

    /// Apply environment overrides that the file never carries (secrets, WebDriver URL)
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.browser.webdriver_url = webdriver_url;
            }
        }
        if self.model.api_key.is_none() {
            self.model.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if self.api.api_key.is_none() {
            self.api.api_key = std::env::var("DIRECTORY_API_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }
    }
}

impl ModelConfig {
    /// Generation endpoint of the local backend
    pub fn generate_url(&self) -> String {
        format!("http://{}:{}/api/generate", self.host, self.port)
    }

    /// Chat-completion endpoint of the hosted backend
    pub fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.openai_url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

/// Per-run artifact directories, keyed by a timestamped run id
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_id: String,
    pub root: PathBuf,
    pub raw: PathBuf,
    pub processed: PathBuf,
    pub screenshots: PathBuf,
    pub debug: PathBuf,
}

impl RunPaths {
    /// Lay out the directories for a new run under `output_dir/runs/`
    pub fn new(output_dir: &Path) -> Self {
        let run_id = format!("run_{}", Local::now().format("%Y%m%d_%H%M%S"));
        Self::with_run_id(output_dir, run_id)
    }

    pub fn with_run_id(output_dir: &Path, run_id: String) -> Self {
        let root = output_dir.join("runs").join(&run_id);
        Self {
            raw: root.join("raw"),
            processed: root.join("processed"),
            screenshots: root.join("screenshots"),
            debug: root.join("debug"),
            root,
            run_id,
        }
    }

    /// Create every directory of the run
    pub fn create_all(&self) -> Result<()> {
        for dir in [&self.raw, &self.processed, &self.screenshots, &self.debug] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_backend() -> BackendKind {
    BackendKind::Ollama
}

fn default_model() -> String {
    "llama3:latest".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    11434
}

fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_rate_limit_ms() -> u64 {
    500
}

fn default_temperature() -> f32 {
    0.7
}

fn default_search_url() -> String {
    "https://duckduckgo.com/".to_string()
}

fn default_max_search_failures() -> u32 {
    5
}

fn default_max_depth() -> usize {
    5
}

fn default_settle_ms() -> u64 {
    3000
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_page_load_secs() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./seo_data")
}

fn default_products_path() -> PathBuf {
    PathBuf::from("./data/products.json")
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_mock_mode() -> bool {
    true
}

fn default_local_store() -> PathBuf {
    PathBuf::from("directory_listings.json")
}

fn default_count() -> usize {
    10
}

fn default_commentary() -> bool {
    true
}

fn default_commentary_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            browser: BrowserConfig::default(),
            output: OutputConfig::default(),
            api: ApiConfig::default(),
            count: default_count(),
            commentary: default_commentary(),
            commentary_model: default_commentary_model(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: default_backend(),
            model: default_model(),
            host: default_host(),
            port: default_port(),
            openai_url: default_openai_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            rate_limit_ms: default_rate_limit_ms(),
            temperature: default_temperature(),
            debug: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            min_price: None,
            max_price: None,
            search_url: default_search_url(),
            max_search_failures: default_max_search_failures(),
            max_depth: default_max_depth(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
            page_load_secs: default_page_load_secs(),
            screenshots: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            products_path: default_products_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            submit: false,
            base_url: default_api_url(),
            api_key: None,
            site_slug: None,
            category_id: None,
            category_name: None,
            mock_mode: default_mock_mode(),
            local_store: default_local_store(),
        }
    }
}
