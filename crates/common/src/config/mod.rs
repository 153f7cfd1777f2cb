//! Configuration management for CourseFind services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generative language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval engine tuning
    #[serde(default)]
    pub search: SearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches allowed in flight at once
    #[serde(default = "default_concurrent_batches")]
    pub max_concurrent_batches: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key (mock responses are used when absent)
    pub api_key: Option<String>,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature for answers
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Upper bound on chunk length in characters
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Characters carried over from the previous chunk
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Results retrieved when answering without explicit context
    #[serde(default = "default_max_retrieval_docs")]
    pub max_retrieval_docs: usize,

    /// Minimum similarity for a chunk to ground an answer
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Weight of the dense similarity in hybrid scoring
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Weight of the normalized BM25 score in hybrid scoring
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    /// BM25 score mapped to 1.0 during normalization
    #[serde(default = "default_lexical_normalization")]
    pub lexical_normalization: f32,

    /// Per-index candidate multiplier for hybrid retrieval
    #[serde(default = "default_candidate_multiplier")]
    pub hybrid_candidate_multiplier: usize,

    /// Keywords recorded per document
    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,

    /// Snippet length for search results
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Snippet length for answer sources
    #[serde(default = "default_source_snippet_chars")]
    pub source_snippet_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8004 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_body_bytes() -> usize { 2 * 1024 * 1024 }
fn default_embedding_provider() -> String { "mock".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 64 }
fn default_concurrent_batches() -> usize { 4 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_llm_timeout() -> u64 { 45 }
fn default_temperature() -> f32 { 0.7 }
fn default_max_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_max_retrieval_docs() -> usize { 10 }
fn default_similarity_threshold() -> f32 { 0.7 }
fn default_semantic_weight() -> f32 { 0.7 }
fn default_lexical_weight() -> f32 { 0.3 }
fn default_lexical_normalization() -> f32 { 10.0 }
fn default_candidate_multiplier() -> usize { 2 }
fn default_keyword_count() -> usize { 10 }
fn default_snippet_chars() -> usize { 200 }
fn default_source_snippet_chars() -> usize { 150 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "coursefind-search".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SEARCH__SIMILARITY_THRESHOLD=0.6
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let search = &self.search;

        if search.max_chunk_size == 0 {
            return Err(invalid("search.max_chunk_size must be positive"));
        }
        if search.chunk_overlap >= search.max_chunk_size {
            return Err(invalid("search.chunk_overlap must be smaller than search.max_chunk_size"));
        }
        if !(0.0..=1.0).contains(&search.similarity_threshold) {
            return Err(invalid("search.similarity_threshold must be within [0, 1]"));
        }
        if search.semantic_weight < 0.0 || search.lexical_weight < 0.0 {
            return Err(invalid("search weights must be non-negative"));
        }
        if search.semantic_weight + search.lexical_weight > 1.0 + 1e-6 {
            return Err(invalid("search weights must not sum to more than 1"));
        }
        if search.lexical_normalization <= 0.0 {
            return Err(invalid("search.lexical_normalization must be positive"));
        }
        if self.embedding.dimension == 0 {
            return Err(invalid("embedding.dimension must be positive"));
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Configuration {
        message: message.to_string(),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_concurrent_batches(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_retrieval_docs: default_max_retrieval_docs(),
            similarity_threshold: default_similarity_threshold(),
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            lexical_normalization: default_lexical_normalization(),
            hybrid_candidate_multiplier: default_candidate_multiplier(),
            keyword_count: default_keyword_count(),
            snippet_chars: default_snippet_chars(),
            source_snippet_chars: default_source_snippet_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}
