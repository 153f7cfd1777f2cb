//! API handlers module

pub mod answer;
pub mod health;
pub mod index;
pub mod search;

use crate::retrieval::{Metadata, RetrievedChunk};
use coursefind_common::errors::{AppError, Result};
use coursefind_common::text::snippet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Kinds of course content the service indexes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Course,
    #[default]
    Lesson,
    Quiz,
    Assignment,
    Discussion,
    Document,
    Video,
    Email,
    All,
}

impl ContentType {
    /// Content type recorded in chunk metadata, `lesson` when absent or unknown
    fn from_metadata(metadata: &Metadata) -> Self {
        metadata
            .get("content_type")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// Search result as returned by `/search`, `/similar` and `/answer` sources
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub relevance_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl SearchResultItem {
    /// Convert a retrieved chunk, with a snippet of `snippet_chars` when requested
    pub fn from_chunk(chunk: RetrievedChunk, snippet_chars: Option<usize>) -> Self {
        let text_field = |key: &str| {
            chunk
                .metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            id: chunk.chunk_id.clone(),
            title: text_field("title").unwrap_or_else(|| "Untitled".to_string()),
            content_type: ContentType::from_metadata(&chunk.metadata),
            snippet: snippet_chars.map(|n| snippet(&chunk.content, n)),
            relevance_score: chunk.score.clamp(0.0, 1.0),
            source_url: text_field("source_url"),
            created_at: text_field("created_at"),
            metadata: chunk.metadata,
        }
    }
}

/// Run derive-based validation, mapping failures to a 400
pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|k| k.to_string()),
    })
}
