//! Text-classification backend — `classify(system, user, temperature) -> text`
//!
//! Provides a `ClassifierBackend` trait with one implementation:
//! - **ChatCompletionClient** — any OpenAI-compatible `/chat/completions` endpoint
//!
//! Callers decide what a response means; [`parse_yes_no`] is the fail-closed
//! reading used by the classification gate.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::ClassifierSettings;

// ============================================================================
// ClassifierBackend trait
// ============================================================================

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Run one completion. An empty string is a valid (negative) answer.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, ClassifierError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// True only when the trimmed response starts with `YES` (any case).
pub fn parse_yes_no(response: &str) -> bool {
    response.trim().to_uppercase().starts_with("YES")
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing completion in response")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ClassifierConfig {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            base_url,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }

    pub fn from_settings(settings: &ClassifierSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
            ..Self::new(
                settings.api_key.clone(),
                settings.model.clone(),
                settings.base_url.clone(),
            )
        }
    }
}

/// Build the configured backend.
pub fn create_classifier(
    settings: &ClassifierSettings,
) -> Result<Box<dyn ClassifierBackend>, ClassifierError> {
    Ok(Box::new(ChatCompletionClient::new(
        ClassifierConfig::from_settings(settings),
    )?))
}

// ============================================================================
// Chat completion API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// ChatCompletionClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    config: ClassifierConfig,
}

impl ChatCompletionClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        if config.api_key.is_empty() {
            return Err(ClassifierError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom endpoint (for testing / self-hosted gateways)
    pub fn with_base_url(
        config: ClassifierConfig,
        base_url: String,
    ) -> Result<Self, ClassifierError> {
        Self::new(ClassifierConfig { base_url, ..config })
    }

    async fn complete_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, ClassifierError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Classifier API error");

            return Err(ClassifierError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or(ClassifierError::EmptyResponse)
    }
}

#[async_trait]
impl ClassifierBackend for ChatCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, ClassifierError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms.max(1))
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || {
            self.complete_once(system_prompt, user_prompt, temperature)
        })
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All classifier retry attempts failed"
                );
                Err(ClassifierError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

// ============================================================================
// TESTS
// ============================================================================
