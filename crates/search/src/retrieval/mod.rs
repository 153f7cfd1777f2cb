//! Multi-modal retrieval system
//!
//! Provides three retrieval modes:
//! - Semantic search (embedding similarity over the vector index)
//! - Lexical search (BM25 over an in-memory corpus)
//! - Hybrid search (weighted fusion of semantic + lexical scores)

mod bm25;
mod fusion;
mod hybrid;
mod vector;

pub use bm25::Bm25Index;
pub use fusion::WeightedFusion;
pub use hybrid::HybridRetriever;
pub use vector::VectorIndex;

use coursefind_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Free-form chunk metadata
pub type Metadata = serde_json::Map<String, Value>;

/// A chunk as stored in both indices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// `{document_id}_chunk_{index}`
    pub chunk_id: String,

    /// Owning document
    pub document_id: String,

    /// Chunk text
    pub text: String,

    /// Document metadata plus per-chunk fields
    pub metadata: Metadata,
}

/// Retrieved chunk with relevance scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk ID
    pub chunk_id: String,

    /// Document this chunk belongs to
    pub document_id: String,

    /// Chunk content
    pub content: String,

    /// Chunk metadata
    pub metadata: Metadata,

    /// Cosine similarity to the query
    pub similarity_score: Option<f32>,

    /// Raw BM25 score
    pub lexical_score: Option<f32>,

    /// Weighted fusion score (hybrid only)
    pub final_score: Option<f32>,

    /// Relevance score (0.0 - 1.0) for the mode that produced this chunk
    pub score: f32,

    /// Retrieval mode used
    pub retrieval_mode: RetrievalMode,
}

impl RetrievedChunk {
    pub(crate) fn from_indexed(chunk: &IndexedChunk, mode: RetrievalMode) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            content: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            similarity_score: None,
            lexical_score: None,
            final_score: None,
            score: 0.0,
            retrieval_mode: mode,
        }
    }

    /// Document title from metadata, falling back to the document id
    pub fn title(&self) -> &str {
        self.metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&self.document_id)
    }
}

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Vector similarity search
    Semantic,
    /// BM25 lexical search
    Lexical,
    /// Combined hybrid search
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Lexical => "lexical",
            RetrievalMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "semantic" | "vector" => Ok(RetrievalMode::Semantic),
            "lexical" | "keyword" => Ok(RetrievalMode::Lexical),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            other => Err(AppError::validation(
                "search_type",
                format!("search_type must be semantic, lexical or hybrid, got '{}'", other),
            )),
        }
    }
}

/// Metadata equality filter.
///
/// A chunk matches when, for every key, its metadata value equals the filter value,
/// or one side is an array containing the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MetadataFilter(pub HashMap<String, Value>);

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0.iter().all(|(key, expected)| match metadata.get(key) {
            None => false,
            Some(actual) => value_matches(actual, expected),
        })
    }
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Array(items), single) if !single.is_array() => items.contains(single),
        (single, Value::Array(options)) if !single.is_array() => options.contains(single),
        _ => false,
    }
}

/// Whether `filter` admits `metadata`; an absent filter admits everything
pub(crate) fn admits(filter: Option<&MetadataFilter>, metadata: &Metadata) -> bool {
    filter.map_or(true, |f| f.matches(metadata))
}

/// Sort by score descending, chunk id ascending on ties
pub(crate) fn sort_by_score(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

/// Search request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// Retrieval mode
    pub mode: RetrievalMode,

    /// Maximum results to return
    pub limit: usize,

    /// Metadata filter applied before truncation
    pub filter: Option<MetadataFilter>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: RetrievalMode, limit: usize) -> Self {
        Self {
            query: query.into(),
            mode,
            limit,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = (!filter.is_empty()).then_some(filter);
        self
    }
}

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks matching the query
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>>;

    /// Get the retrieval mode
    fn mode(&self) -> RetrievalMode;
}
