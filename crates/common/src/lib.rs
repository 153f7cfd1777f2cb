//! CourseFind Common Library
//!
//! Shared code for the CourseFind search service including:
//! - Configuration management
//! - Error types and handling
//! - Text cleaning, chunking and keyword extraction
//! - Embedding and language-model client abstractions
//! - Grounded answer synthesis
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension (matches the local MiniLM-sized mock embedder)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
