use super::browser::Browser;
use crate::config::BrowserConfig;
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

/// WebDriver key code for Enter
const ENTER_KEY: &str = "\u{E007}";

/// Extra time allowed on top of the page-load timeout before a navigation is abandoned
const NAVIGATION_GRACE: Duration = Duration::from_secs(15);

/// Common local WebDriver endpoints tried when the configured one is unreachable
const FALLBACK_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A Chrome session driven over WebDriver
pub struct WebDriverBrowser {
    client: Client,
    navigation_timeout: Duration,
}

impl WebDriverBrowser {
    /// Start a session, falling back to common local ports when the configured URL fails
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let client = connect_to_webdriver(&config.webdriver_url, capabilities(config)).await?;
        Ok(Self {
            client,
            navigation_timeout: Duration::from_secs(config.page_load_secs) + NAVIGATION_GRACE,
        })
    }
}

/// Chrome capabilities: headless toggle, automation flags hidden, page-load timeout
fn capabilities(config: &BrowserConfig) -> Map<String, Value> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--window-size=1920,1080".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!("--user-agent={}", USER_AGENT),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }

    let mut caps = Map::new();
    caps.insert("browserName".into(), json!("chrome"));
    caps.insert(
        "goog:chromeOptions".into(),
        json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
        }),
    );
    caps.insert(
        "timeouts".into(),
        json!({ "pageLoad": config.page_load_secs * 1000 }),
    );
    caps
}

/// Connects to the WebDriver instance
async fn connect_to_webdriver(webdriver_url: &str, caps: Map<String, Value>) -> Result<Client> {
    let first_error = match new_session(webdriver_url, caps.clone()).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Ok(client);
        }
        Err(e) => {
            ::log::error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
            e
        }
    };

    for url in FALLBACK_URLS {
        if url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        // Errors from fallbacks are not logged to avoid log spam
        if let Ok(client) = new_session(url, caps.clone()).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!("Failed to connect to any WebDriver servers");
    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(first_error.into())
}

async fn new_session(
    url: &str,
    caps: Map<String, Value>,
) -> std::result::Result<Client, fantoccini::error::NewSessionError> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(caps);
    builder.connect(url).await
}

/// Log a failed WebDriver command and convert it
fn handle_command_error(error: CmdError, context: &str, url: &str) -> ScoutError {
    if error.to_string().contains("Unable to find session") {
        ::log::warn!("Lost session while {} {}", context, url);
    } else {
        ::log::error!("Failed {} {}: {}", context, url, error);
    }
    ScoutError::Browser(error)
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        ::log::debug!("GOTO: {}", url);
        match timeout(self.navigation_timeout, self.client.goto(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(handle_command_error(e, "accessing", url)),
            Err(_) => {
                ::log::error!("Timeout loading: {}", url);
                Err(ScoutError::Navigation(format!("timed out loading {}", url)))
            }
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.client.title().await?)
    }

    async fn source(&self) -> Result<String> {
        self.client
            .source()
            .await
            .map_err(|e| handle_command_error(e, "getting source for", "current page"))
    }

    async fn body_text(&self) -> Result<String> {
        let body = self.client.find(Locator::Css("body")).await?;
        Ok(body.text().await?)
    }

    async fn submit_search(&self, selectors: &[&str], text: &str) -> Result<bool> {
        for selector in selectors {
            let Ok(input) = self.client.find(Locator::Css(*selector)).await else {
                continue;
            };
            ::log::debug!("Found search box with selector: {}", selector);
            input.clear().await?;
            input.send_keys(text).await?;
            input.send_keys(ENTER_KEY).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn click_first(&self, xpath: &str) -> Result<bool> {
        let elements = self.client.find_all(Locator::XPath(xpath)).await?;
        match elements.first() {
            Some(element) => {
                element.click().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self.client.screenshot().await?;
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_capabilities() {
        let config = BrowserConfig::default();
        let caps = capabilities(&config);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert_eq!(caps["timeouts"]["pageLoad"], json!(30_000));
    }

    #[test]
    fn test_visible_browser_capabilities() {
        let config = BrowserConfig {
            headless: false,
            ..BrowserConfig::default()
        };
        let caps = capabilities(&config);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a.as_str().unwrap().starts_with("--user-agent=")));
    }
}
