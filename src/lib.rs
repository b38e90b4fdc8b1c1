//! Retrieval-augmented generation core.
//!
//! A backend-agnostic vector index store (self-managed flat index or an
//! externally managed engine) plus the indexing, retrieval, and generation
//! pipelines built on top of it.

pub mod config;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod model;
pub mod naming;
pub mod providers;
pub mod retrieve;
pub mod store;
pub mod templates;

pub use config::AppConfig;
pub use error::{EngineError, Result};
pub use generate::{GenerationOrchestrator, RagAnswer};
pub use ingest::IndexingPipeline;
pub use model::*;
pub use retrieve::RetrievalPipeline;
pub use store::{build_store, BackendKind, VectorStore};
pub use templates::TemplateCatalog;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_TOP_K: usize = 10;
    pub const DEFAULT_METRIC: &str = "cosine";
    pub const DEFAULT_INPUT_MAX_CHARS: usize = 1000;
    pub const DEFAULT_HISTORY_LIMIT: usize = 20;
}
