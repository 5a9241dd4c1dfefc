use thiserror::Error;

/// Errors raised inside the scraping pipeline.
///
/// Most stages degrade instead of returning these (the model client, storage and the
/// API fallbacks log and carry on), so a `ScoutError` reaching `main` is either a
/// configuration problem or a browser session that could not be started.
#[derive(Error, Debug)]
pub enum ScoutError {
    /// Missing or invalid configuration (absent credentials, bad file, bad regex)
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request to a model backend or the content API failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A backend answered with a non-success status
    #[error("{service} returned status {status}")]
    Status { service: String, status: u16 },

    /// WebDriver session could not be created
    #[error("WebDriver session error: {0}")]
    Session(#[from] fantoccini::error::NewSessionError),

    /// A WebDriver command failed (navigation timeout, missing element, lost session)
    #[error("WebDriver command failed: {0}")]
    Browser(#[from] fantoccini::error::CmdError),

    /// Navigation gave up (CAPTCHA, no search box, no usable links)
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Model output could not be used
    #[error("model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ScoutError>;

impl From<regex::Error> for ScoutError {
    fn from(e: regex::Error) -> Self {
        ScoutError::Config(format!("invalid pattern: {}", e))
    }
}
