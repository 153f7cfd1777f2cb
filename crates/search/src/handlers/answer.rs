//! Answer generation handler

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validate_request, SearchResultItem};
use crate::AppState;
use coursefind_common::context::AnswerLength;
use coursefind_common::errors::Result;

/// Answer request
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerBody {
    #[validate(length(min = 1, max = 500))]
    pub query: String,

    /// Chunk or content ids to answer from, bypassing retrieval
    #[serde(default)]
    pub context_sources: Option<Vec<String>>,

    /// short, medium or long
    #[serde(default = "default_answer_length")]
    pub answer_length: String,

    #[serde(default = "default_true")]
    pub include_sources: bool,
}

fn default_answer_length() -> String {
    "medium".to_string()
}
fn default_true() -> bool {
    true
}

/// Answer response
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer_id: Uuid,
    pub query: String,
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<SearchResultItem>,
    pub related_questions: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Generate a grounded answer
pub async fn answer(
    State(state): State<AppState>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<AnswerResponse>> {
    validate_request(&body)?;
    let length: AnswerLength = body.answer_length.parse()?;

    let generated = state
        .engine
        .generate_answer(&body.query, body.context_sources.as_deref(), length)
        .await?;

    let sources = if body.include_sources {
        let snippet_chars = Some(state.engine.config().source_snippet_chars);
        generated
            .sources
            .into_iter()
            .map(|chunk| SearchResultItem::from_chunk(chunk, snippet_chars))
            .collect()
    } else {
        Vec::new()
    };

    Ok(Json(AnswerResponse {
        answer_id: Uuid::new_v4(),
        query: body.query,
        answer: generated.answer.answer,
        confidence: generated.answer.confidence,
        sources,
        related_questions: generated.answer.related_questions,
        generated_at: Utc::now(),
        error: generated.answer.error,
    }))
}
