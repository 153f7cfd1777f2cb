//! Answer Synthesizer - Generates grounded answers from retrieved chunks
//!
//! Provides:
//! - Context-grounded answer generation with a length-dependent token budget
//! - Retrieval-based confidence scoring
//! - Related question suggestions
//! - A fixed apology answer when the language model fails or times out

use crate::errors::{AppError, Result};
use crate::llm::{Completion, CompletionRequest, LanguageModel};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Answer returned when retrieval finds nothing relevant enough
pub const NOT_ENOUGH_INFORMATION: &str = "I don't have enough relevant information to answer your question. \
     Please try rephrasing or ask about a different topic.";

/// Answer returned when the language model call fails
pub const FALLBACK_ANSWER: &str = "I apologize, but I'm unable to generate an answer at this time. \
     Please try rephrasing your question.";

/// Chunks placed in the prompt
pub const MAX_CONTEXT_CHUNKS: usize = 5;

/// Characters kept from each chunk in the prompt
const MAX_CHUNK_CHARS: usize = 500;

/// Context sources needed for full source-count confidence
const FULL_SOURCE_COUNT: f32 = 5.0;

/// Characters of context given to the related-questions call
const RELATED_CONTEXT_CHARS: usize = 300;

const MAX_RELATED_QUESTIONS: usize = 3;

/// Requested answer size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl AnswerLength {
    /// Output token budget for the model call
    pub fn max_tokens(&self) -> usize {
        match self {
            AnswerLength::Short => 200,
            AnswerLength::Medium => 500,
            AnswerLength::Long => 1000,
        }
    }

    fn guideline(&self) -> &'static str {
        match self {
            AnswerLength::Short => "Provide a brief, concise answer (1-2 sentences).",
            AnswerLength::Medium => "Provide a comprehensive answer (1-2 paragraphs).",
            AnswerLength::Long => "Provide a detailed, thorough answer with examples if available.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLength::Short => "short",
            AnswerLength::Medium => "medium",
            AnswerLength::Long => "long",
        }
    }
}

impl FromStr for AnswerLength {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(AnswerLength::Short),
            "medium" => Ok(AnswerLength::Medium),
            "long" => Ok(AnswerLength::Long),
            other => Err(AppError::validation(
                "answer_length",
                format!("answer_length must be short, medium or long, got '{}'", other),
            )),
        }
    }
}

/// A retrieved chunk handed to the synthesizer
#[derive(Debug, Clone)]
pub struct SynthesisContext {
    pub chunk_id: String,
    pub title: String,
    pub content: String,
    pub similarity_score: f32,
}

/// Synthesized answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    /// Generated answer text
    pub answer: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// Follow-up questions, possibly empty
    pub related_questions: Vec<String>,

    /// Tokens consumed by the answer call
    pub tokens_used: usize,

    /// Set when the fallback answer was returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SynthesizedAnswer {
    /// The fixed answer for queries without relevant context
    pub fn not_enough_information() -> Self {
        Self {
            answer: NOT_ENOUGH_INFORMATION.to_string(),
            confidence: 0.0,
            related_questions: Vec::new(),
            tokens_used: 0,
            error: None,
        }
    }

    fn fallback(error: &AppError) -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            confidence: 0.0,
            related_questions: Vec::new(),
            tokens_used: 0,
            error: Some(error.to_string()),
        }
    }

    /// Whether the model call failed and the apology was returned
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Synthesizer for generating answers
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
    timeout: Duration,
}

impl AnswerSynthesizer {
    /// Create a new synthesizer
    pub fn new(model: Arc<dyn LanguageModel>, temperature: f32, timeout: Duration) -> Self {
        Self {
            model,
            temperature,
            timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Generate an answer grounded in `contexts`.
    ///
    /// Never fails: a model error or timeout yields [`FALLBACK_ANSWER`] with
    /// confidence 0.0 and the error recorded.
    pub async fn generate(
        &self,
        query: &str,
        contexts: &[SynthesisContext],
        length: AnswerLength,
    ) -> SynthesizedAnswer {
        let context_text = build_context(contexts);

        let request = CompletionRequest {
            system_prompt: system_prompt(length),
            user_prompt: format!(
                "Context information:\n{}\n\nQuestion: {}\n\n\
                 Please provide a helpful answer based on the context above. \
                 If you reference specific information, mention which source it comes from.",
                context_text, query
            ),
            max_tokens: length.max_tokens(),
            temperature: self.temperature,
        };

        let completion = match self.call_model(request).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, model = self.model.model_name(), "Answer generation failed");
                return SynthesizedAnswer::fallback(&e);
            }
        };

        let related_questions = self.related_questions(query, &context_text).await;
        let confidence = calculate_confidence(contexts);

        debug!(
            confidence,
            tokens = completion.tokens_used,
            sources = contexts.len().min(MAX_CONTEXT_CHUNKS),
            "Answer synthesized"
        );

        SynthesizedAnswer {
            answer: completion.text.trim().to_string(),
            confidence,
            related_questions,
            tokens_used: completion.tokens_used,
            error: None,
        }
    }

    /// Ask for up to three follow-up questions; empty on any failure
    async fn related_questions(&self, query: &str, context_text: &str) -> Vec<String> {
        let excerpt: String = context_text.chars().take(RELATED_CONTEXT_CHARS).collect();
        let request = CompletionRequest {
            system_prompt: "You suggest follow-up questions for students.".to_string(),
            user_prompt: format!(
                "Based on this question: \"{}\"\nAnd this context: {}...\n\n\
                 Generate 3 related questions that a student might ask next. \
                 Return only the questions, one per line.\n\nRelated questions:",
                query, excerpt
            ),
            max_tokens: 150,
            temperature: 0.8,
        };

        match self.call_model(request).await {
            Ok(completion) => parse_questions(&completion.text),
            Err(e) => {
                debug!(error = %e, "Related question generation failed");
                Vec::new()
            }
        }
    }

    async fn call_model(&self, request: CompletionRequest) -> Result<Completion> {
        match tokio::time::timeout(self.timeout, self.model.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::LanguageModelTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn system_prompt(length: AnswerLength) -> String {
    format!(
        "You are a helpful educational assistant. Answer questions based only on the provided context. \
         If the context doesn't contain enough information to answer the question, say so clearly. \
         Do not use knowledge outside the context. {}",
        length.guideline()
    )
}

/// Labeled, truncated context block built from the top chunks
fn build_context(contexts: &[SynthesisContext]) -> String {
    contexts
        .iter()
        .take(MAX_CONTEXT_CHUNKS)
        .enumerate()
        .map(|(i, ctx)| {
            let content: String = ctx.content.chars().take(MAX_CHUNK_CHARS).collect();
            format!("Source {} - {}:\n{}\n", i + 1, ctx.title, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `0.7 * mean similarity + 0.3 * min(n / 5, 1)`, clamped to [0, 1] and rounded to two places
pub fn calculate_confidence(contexts: &[SynthesisContext]) -> f32 {
    if contexts.is_empty() {
        return 0.0;
    }

    let mean_similarity =
        contexts.iter().map(|c| c.similarity_score).sum::<f32>() / contexts.len() as f32;
    let coverage = (contexts.len() as f32 / FULL_SOURCE_COUNT).min(1.0);

    let confidence = (0.7 * mean_similarity + 0.3 * coverage).clamp(0.0, 1.0);
    (confidence * 100.0).round() / 100.0
}

fn list_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"^\d+[.)]\s*").expect("valid list marker pattern"))
}

fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .map(|line| list_marker().replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .take(MAX_RELATED_QUESTIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed answer, then fails every later call
    struct OneShotModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for OneShotModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Completion {
                    text: "  Recursion is a function calling itself [Source 1].  ".to_string(),
                    tokens_used: 42,
                })
            } else {
                Err(AppError::LanguageModelError {
                    message: "quota exceeded".to_string(),
                })
            }
        }

        fn model_name(&self) -> &str {
            "one-shot"
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion> {
            Err(AppError::LanguageModelError {
                message: "connection refused".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Completion::default())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn context(score: f32) -> SynthesisContext {
        SynthesisContext {
            chunk_id: "doc-1_chunk_0".to_string(),
            title: "Recursion Basics".to_string(),
            content: "Recursion is when a function calls itself until a base case.".to_string(),
            similarity_score: score,
        }
    }

    fn synthesizer(model: Arc<dyn LanguageModel>) -> AnswerSynthesizer {
        AnswerSynthesizer::new(model, 0.7, Duration::from_secs(2))
    }

    #[test]
    fn test_confidence_formula() {
        // 0.7 * 0.9 + 0.3 * (1 / 5)
        assert!((calculate_confidence(&[context(0.9)]) - 0.69).abs() < 1e-6);

        let five: Vec<_> = (0..5).map(|_| context(1.0)).collect();
        assert_eq!(calculate_confidence(&five), 1.0);
    }

    #[test]
    fn test_confidence_bounds() {
        assert_eq!(calculate_confidence(&[]), 0.0);

        for scores in [vec![-0.4, -1.0], vec![1.0; 12], vec![0.0], vec![0.3, 0.8, 0.75]] {
            let contexts: Vec<_> = scores.into_iter().map(context).collect();
            let confidence = calculate_confidence(&contexts);
            assert!((0.0..=1.0).contains(&confidence), "confidence {}", confidence);
        }
    }

    #[test]
    fn test_context_is_limited_and_truncated() {
        let mut long = context(0.8);
        long.content = "x".repeat(2000);
        let contexts: Vec<_> = (0..8).map(|_| long.clone()).collect();

        let block = build_context(&contexts);
        assert!(block.contains("Source 5 - Recursion Basics:"));
        assert!(!block.contains("Source 6"));
        assert!(!block.contains(&"x".repeat(MAX_CHUNK_CHARS + 1)));
    }

    #[test]
    fn test_answer_length_budgets() {
        assert_eq!(AnswerLength::Short.max_tokens(), 200);
        assert_eq!(AnswerLength::default().max_tokens(), 500);
        assert_eq!("LONG".parse::<AnswerLength>().unwrap(), AnswerLength::Long);
        assert!("epic".parse::<AnswerLength>().is_err());
    }

    #[test]
    fn test_parse_questions() {
        let text = "1. What is a base case?\n\n- ignored bullet\n2) Why use recursion?\n\
                    3. When does recursion overflow?\n4. One too many?";
        assert_eq!(
            parse_questions(text),
            vec![
                "What is a base case?",
                "Why use recursion?",
                "When does recursion overflow?"
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_with_mock_model() {
        let answer = synthesizer(Arc::new(MockLanguageModel))
            .generate("What is recursion?", &[context(0.9)], AnswerLength::Short)
            .await;

        assert!(answer.answer.contains("What is recursion?"));
        assert_eq!(answer.related_questions.len(), 3);
        assert!(answer.error.is_none());
        assert!(answer.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_related_question_failure_is_not_fatal() {
        let model = Arc::new(OneShotModel {
            calls: AtomicUsize::new(0),
        });
        let answer = synthesizer(model)
            .generate("What is recursion?", &[context(0.9)], AnswerLength::Medium)
            .await;

        assert_eq!(answer.answer, "Recursion is a function calling itself [Source 1].");
        assert_eq!(answer.tokens_used, 42);
        assert!(answer.related_questions.is_empty());
        assert!(!answer.is_fallback());
    }

    #[tokio::test]
    async fn test_model_failure_returns_apology() {
        let answer = synthesizer(Arc::new(FailingModel))
            .generate("What is recursion?", &[context(0.9)], AnswerLength::Medium)
            .await;

        assert_eq!(answer.answer, FALLBACK_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_model_timeout_returns_apology() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(SlowModel), 0.7, Duration::from_millis(20));
        let answer = synthesizer
            .generate("What is recursion?", &[context(0.9)], AnswerLength::Long)
            .await;

        assert_eq!(answer.answer, FALLBACK_ANSWER);
        assert!(answer.is_fallback());
    }
}
