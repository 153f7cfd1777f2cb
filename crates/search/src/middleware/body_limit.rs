//! Request body size guard

use axum::{
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::{IntoResponse, Response},
};
use coursefind_common::errors::AppError;

use crate::AppState;

/// Reject requests whose declared Content-Length exceeds `server.max_body_bytes`.
///
/// Bodies sent without a length are still capped by `DefaultBodyLimit` while buffering.
pub async fn limit_body(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limit = state.config.server.max_body_bytes;
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(size) if size > limit => AppError::PayloadTooLarge { size, limit }.into_response(),
        _ => next.run(request).await,
    }
}
