//! Search, similar-content and suggestion handlers

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use super::{validate_request, SearchResultItem};
use crate::retrieval::{MetadataFilter, RetrievalMode, SearchRequest};
use crate::AppState;
use coursefind_common::errors::Result;

/// Suggestions attached to every search response
const SEARCH_SUGGESTIONS: usize = 3;

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchBody {
    #[validate(length(min = 1, max = 500))]
    pub query: String,

    /// semantic, lexical (or keyword), hybrid
    #[serde(default = "default_search_type")]
    pub search_type: String,

    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_true")]
    pub include_snippets: bool,

    #[serde(default)]
    pub filters: Option<MetadataFilter>,
}

fn default_search_type() -> String {
    "hybrid".to_string()
}
fn default_max_results() -> usize {
    20
}
fn default_true() -> bool {
    true
}

/// Search response
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub search_id: Uuid,
    pub query: String,
    pub search_type: RetrievalMode,
    pub total_results: usize,
    pub results: Vec<SearchResultItem>,
    pub search_time_ms: f64,
    pub suggestions: Vec<String>,
    pub filters_applied: MetadataFilter,
}

/// Similar content request
#[derive(Debug, Deserialize, Validate)]
pub struct SimilarBody {
    #[validate(length(min = 1))]
    pub content_id: String,

    #[validate(range(min = 1, max = 50))]
    #[serde(default = "default_similar_results")]
    pub max_results: usize,

    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_similar_results() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.7
}

/// Suggestion query string
#[derive(Debug, Deserialize, Validate)]
pub struct SuggestionsQuery {
    #[validate(length(min = 1))]
    pub q: String,

    #[validate(range(min = 1, max = 20))]
    #[serde(default = "default_suggestion_limit")]
    pub limit: usize,
}

fn default_suggestion_limit() -> usize {
    10
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub query: String,
    pub suggestions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Perform a search
pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    validate_request(&body)?;

    let mode: RetrievalMode = body.search_type.parse()?;
    let filters = body.filters.unwrap_or_default();
    let request =
        SearchRequest::new(body.query.clone(), mode, body.max_results).with_filter(filters.clone());

    let chunks = state.engine.search(&request).await?;
    let suggestions = state.engine.suggest(&body.query, SEARCH_SUGGESTIONS).await;

    let snippet_chars = body
        .include_snippets
        .then_some(state.engine.config().snippet_chars);
    let results: Vec<SearchResultItem> = chunks
        .into_iter()
        .map(|chunk| SearchResultItem::from_chunk(chunk, snippet_chars))
        .collect();

    let search_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    tracing::info!(
        query = %body.query,
        mode = %mode,
        results = results.len(),
        latency_ms = search_time_ms,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        search_id: Uuid::new_v4(),
        query: body.query,
        search_type: mode,
        total_results: results.len(),
        results,
        search_time_ms,
        suggestions,
        filters_applied: filters,
    }))
}

/// Find documents similar to an indexed one
pub async fn similar(
    State(state): State<AppState>,
    Json(body): Json<SimilarBody>,
) -> Result<Json<Vec<SearchResultItem>>> {
    validate_request(&body)?;

    let snippet_chars = Some(state.engine.config().snippet_chars);
    let results = state
        .engine
        .find_similar(&body.content_id, body.max_results, body.similarity_threshold)
        .await
        .into_iter()
        .map(|chunk| SearchResultItem::from_chunk(chunk, snippet_chars))
        .collect();

    Ok(Json(results))
}

/// Query suggestions for partial input
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionsQuery>,
) -> Result<Json<SuggestionsResponse>> {
    validate_request(&params)?;

    let suggestions = state.engine.suggest(&params.q, params.limit).await;

    Ok(Json(SuggestionsResponse {
        query: params.q,
        suggestions,
        generated_at: Utc::now(),
    }))
}
