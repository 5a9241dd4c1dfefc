//! Browser automation: the [`Browser`] seam, its WebDriver implementation, the
//! search-and-navigate state machine and the product extraction stage.

pub mod browser;
pub mod extraction;
pub mod search;
pub mod web;

pub use browser::Browser;
pub use extraction::ProductScraper;
pub use search::{NavState, Navigation, Navigator, Pauses};
pub use web::WebDriverBrowser;
