//! Indexing handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::{validate_request, ContentType};
use crate::engine::Document;
use crate::retrieval::Metadata;
use crate::AppState;
use coursefind_common::errors::Result;

/// Index request
#[derive(Debug, Deserialize, Validate)]
pub struct IndexRequest {
    #[validate(length(min = 1, max = 256))]
    pub content_id: String,

    #[validate(length(min = 1, max = 1000))]
    pub title: String,

    #[validate(length(min = 1))]
    pub content: String,

    pub content_type: ContentType,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub course_id: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub text_length: usize,
    pub embedding_dimensions: usize,
    pub processing_time_ms: u64,
    pub chunk_count: usize,
}

/// Index response; `status` is "success" or "error"
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub status: String,
    pub content_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_info: Option<ProcessingInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub status: String,
    pub content_id: String,
    pub message: String,
    pub removed_at: DateTime<Utc>,
}

/// Index a document.
///
/// Invalid input is a 400; an upstream failure is reported in the body with
/// `status: "error"`.
pub async fn index_content(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<IndexResponse>> {
    validate_request(&request)?;

    let text_length = request.content.chars().count();
    let content_id = request.content_id.clone();

    // Caller metadata wins over the request-level convenience fields
    let mut metadata = Metadata::new();
    metadata.insert("content_type".to_string(), json!(request.content_type));
    metadata.insert("tags".to_string(), json!(request.tags));
    if let Some(course_id) = request.course_id {
        metadata.insert("course_id".to_string(), json!(course_id));
    }
    if let Some(user_id) = request.user_id {
        metadata.insert("user_id".to_string(), json!(user_id));
    }
    metadata.extend(request.metadata);

    let document = Document {
        id: request.content_id,
        title: request.title,
        content: request.content,
        metadata,
    };

    match state.engine.index_document(document).await {
        Ok(outcome) => Ok(Json(IndexResponse {
            status: "success".to_string(),
            content_id,
            message: "Content successfully indexed".to_string(),
            indexed_at: Some(outcome.indexed_at),
            processing_info: Some(ProcessingInfo {
                text_length,
                embedding_dimensions: outcome.embedding_dimensions,
                processing_time_ms: outcome.processing_time_ms,
                chunk_count: outcome.chunk_count,
            }),
            error: None,
        })),
        Err(e) if e.is_client_error() => Err(e),
        Err(e) => Ok(Json(IndexResponse {
            status: "error".to_string(),
            content_id,
            message: "Failed to index content".to_string(),
            indexed_at: None,
            processing_info: None,
            error: Some(e.to_string()),
        })),
    }
}

/// Remove a document from both indices; unknown ids succeed
pub async fn remove_content(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Json<RemoveResponse> {
    let removed = state.engine.delete_document(&content_id).await;
    tracing::info!(content_id = %content_id, chunks = removed, "Remove requested");

    Json(RemoveResponse {
        status: "success".to_string(),
        content_id,
        message: "Content removed from index".to_string(),
        removed_at: Utc::now(),
    })
}
