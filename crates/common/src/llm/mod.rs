//! Generative language model clients
//!
//! A single-turn chat completion interface with an OpenAI-compatible
//! implementation and an offline mock used when no API key is configured.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One system + user exchange
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Model output
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tokens_used: usize,
}

/// Trait for generative text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a single completion
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI chat completions client
pub struct OpenAIChatModel {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

impl OpenAIChatModel {
    /// Create a new chat client
    pub fn new(config: LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LanguageModelTimeout {
                        timeout_ms: self.config.timeout_secs * 1000,
                    }
                } else {
                    AppError::LanguageModelError {
                        message: format!("LLM API request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LanguageModelError {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::LanguageModelError {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        let tokens_used = chat_response.usage.map(|u| u.total_tokens).unwrap_or(0);
        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LanguageModelError {
                message: "Empty response from LLM".to_string(),
            })?;

        Ok(Completion { text, tokens_used })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Offline model that echoes the question back in a grounded-sounding template
pub struct MockLanguageModel;

impl MockLanguageModel {
    fn question_from(prompt: &str) -> Option<&str> {
        let start = prompt.find("Question:")?;
        let rest = &prompt[start + "Question:".len()..];
        let line = rest.lines().next()?.trim();
        (!line.is_empty()).then_some(line)
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let text = if request.user_prompt.contains("Related questions:") {
            "What are common examples of this topic?\n\
             How does this concept relate to earlier lessons?\n\
             What mistakes do students often make here?"
                .to_string()
        } else {
            match Self::question_from(&request.user_prompt) {
                Some(question) => format!(
                    "Based on the provided course material, here is an answer to \"{}\": \
                     the sources describe the key ideas involved [Source 1]. \
                     [Mock response - LLM API key not configured]",
                    question
                ),
                None => "Based on the provided course material, the answer requires further \
                         investigation. [Mock response - LLM API key not configured]"
                    .to_string(),
            }
        };

        let tokens_used = (request.user_prompt.len() + text.len()) / 4;
        Ok(Completion { text, tokens_used })
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create a language model client based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match (config.provider.as_str(), config.api_key.as_deref()) {
        ("openai", Some(key)) if !key.is_empty() => {
            Ok(Arc::new(OpenAIChatModel::new(config.clone(), key.to_string())?))
        }
        ("openai", _) => {
            tracing::warn!("llm.api_key not set, answers will use the mock model");
            Ok(Arc::new(MockLanguageModel))
        }
        ("mock", _) => Ok(Arc::new(MockLanguageModel)),
        (other, _) => Err(AppError::Configuration {
            message: format!("Unknown llm provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user_prompt: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            user_prompt: user_prompt.to_string(),
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_mock_answer_mentions_question() {
        let model = MockLanguageModel;
        let completion = model
            .complete(request("Context information:\n...\n\nQuestion: What is recursion?\n"))
            .await
            .unwrap();
        assert!(completion.text.contains("What is recursion?"));
        assert!(completion.tokens_used > 0);
    }

    #[tokio::test]
    async fn test_mock_related_questions_are_lines() {
        let model = MockLanguageModel;
        let completion = tokio_test::assert_ok!(model.complete(request("Related questions:")).await);
        assert_eq!(completion.text.lines().count(), 3);
    }

    #[test]
    fn test_factory_falls_back_to_mock_without_key() {
        let model = create_language_model(&LlmConfig::default()).unwrap();
        assert_eq!(model.model_name(), "mock-llm");
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_language_model(&config).is_err());
    }
}
