// Re-export modules
pub mod ai;
pub mod api;
pub mod config;
pub mod crawlers;
pub mod error;
pub mod filter;
pub mod parsers;
pub mod pipeline;
pub mod results;
pub mod storage;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::ScoutConfig;
pub use error::{Result, ScoutError};
pub use pipeline::{RunSummary, Scout};
pub use results::{Listing, PageAnalysis, PageType, ProductRecord};
