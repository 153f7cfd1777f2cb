//! Health and service information handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::CorpusStats;
use crate::AppState;
use coursefind_common::VERSION;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub description: String,
    pub endpoints: BTreeMap<&'static str, &'static str>,
    pub search_capabilities: Vec<&'static str>,
    pub answer_lengths: Vec<&'static str>,
    pub embedding_dimensions: usize,
    pub corpus: CorpusStats,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.observability.service_name.clone(),
        version: VERSION.to_string(),
    })
}

/// Service description with live corpus statistics
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let endpoints = BTreeMap::from([
        ("POST /search", "Search indexed content (semantic, lexical or hybrid)"),
        ("POST /answer", "Generate a grounded answer from indexed content"),
        ("POST /index", "Index content for search"),
        ("DELETE /index/{content_id}", "Remove content from the index"),
        ("POST /similar", "Find content similar to an indexed item"),
        ("GET /suggestions", "Get query suggestions"),
        ("GET /health", "Health check"),
        ("GET /info", "Service information"),
    ]);

    Json(InfoResponse {
        service: state.config.observability.service_name.clone(),
        version: VERSION.to_string(),
        description: "Hybrid semantic and lexical search with grounded answers".to_string(),
        endpoints,
        search_capabilities: vec!["semantic", "lexical", "hybrid"],
        answer_lengths: vec!["short", "medium", "long"],
        embedding_dimensions: state.engine.embedding_dimension(),
        corpus: state.engine.stats().await,
    })
}
