use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// The browser operations the navigator and the extraction stage rely on
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate to a URL and wait for the load to finish
    async fn goto(&self, url: &str) -> Result<()>;

    /// URL of the current page after redirects
    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Full page source
    async fn source(&self) -> Result<String>;

    /// Rendered text of the `<body>`
    async fn body_text(&self) -> Result<String>;

    /// Type `text` into the first element matching one of `selectors` and press Enter.
    ///
    /// Returns `false` when no selector matched.
    async fn submit_search(&self, selectors: &[&str], text: &str) -> Result<bool>;

    /// Click the first element matching an XPath expression; `false` when nothing matched
    async fn click_first(&self, xpath: &str) -> Result<bool>;

    /// Save a PNG screenshot of the viewport
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// End the session
    async fn close(&self) -> Result<()>;
}
