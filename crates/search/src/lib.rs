//! CourseFind Search Service
//!
//! Hybrid retrieval over indexed course content:
//! - Semantic search (in-memory vector index)
//! - Lexical search (BM25)
//! - Hybrid search with weighted score fusion
//! - Grounded answer generation with confidence scoring

pub mod engine;
pub mod handlers;
pub mod middleware;
pub mod retrieval;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use coursefind_common::config::AppConfig;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use engine::SearchEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<SearchEngine>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: Arc<SearchEngine>) -> Self {
        Self { config, engine }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let body_limit = DefaultBodyLimit::max(state.config.server.max_body_bytes);
    let timeout = TimeoutLayer::new(state.config.request_timeout());

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/info", get(handlers::health::info))
        .route("/index", post(handlers::index::index_content))
        .route("/index/{content_id}", delete(handlers::index::remove_content))
        .route("/search", post(handlers::search::search))
        .route("/similar", post(handlers::search::similar))
        .route("/suggestions", get(handlers::search::suggestions))
        .route("/answer", post(handlers::answer::answer))
        .route_layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(body_limit)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::limit_body,
        ))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}
