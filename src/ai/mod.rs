//! Model-backed decision making: page classification, link selection, product
//! extraction and copywriting, all on top of one rate-limited [`ModelClient`].

pub mod classifier;
pub mod client;
pub mod extractor;
pub mod links;
pub mod memory;
pub mod schema;
pub mod writer;

pub use classifier::{HeuristicClassifier, ModelClassifier, PageClassifier, SearchContext, classifier_for};
pub use client::{CompletionRequest, ModelBackend, ModelClient};
pub use extractor::{ExtractionInput, ProductExtractor};
pub use links::{HeuristicLinkSelector, LinkChoice, LinkSelector, ModelLinkSelector, selector_for};
pub use memory::{ContextManager, ConversationMemory};
pub use writer::ContentWriter;
