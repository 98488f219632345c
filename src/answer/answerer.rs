//! Core `AnswerService` trait and `ApiAnswerer` implementation.
//!
//! `ApiAnswerer` calls any OpenAI-compatible `/v1/chat/completions` endpoint
//! (Ollama in OpenAI mode, OpenAI, Groq, LM Studio, vLLM).
//! All connection details come from [`AnswerConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use thiserror::Error;

use crate::answer::prompt::PromptBuilder;
use crate::config::AnswerConfig;

// ---------------------------------------------------------------------------
// AnswerError
// ---------------------------------------------------------------------------

/// Errors that can occur while producing an answer.
#[derive(Debug, Clone, Error)]
pub enum AnswerError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("answer endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request did not complete within the configured timeout.
    #[error("answer request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse answer response: {0}")]
    Parse(String),

    /// The service returned no usable text.
    #[error("answer service returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for AnswerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnswerError::Timeout
        } else {
            AnswerError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// AnswerService trait
// ---------------------------------------------------------------------------

/// Turns a transcribed question into an answer.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn AnswerService>`.  An implementation must never return an empty
/// string as success; use [`AnswerError::EmptyResponse`].
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(&self, query: &str) -> Result<String, AnswerError>;
}

// ---------------------------------------------------------------------------
// ApiAnswerer
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ApiAnswerer {
    client: reqwest::Client,
    config: AnswerConfig,
    prompt_builder: PromptBuilder,
}

impl ApiAnswerer {
    /// Build an `ApiAnswerer` from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.  A default client is used if the builder fails.
    pub fn from_config(config: &AnswerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            prompt_builder: PromptBuilder::new(config.system_prompt.as_deref()),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, query: &str) -> serde_json::Value {
        let (system_msg, user_msg) = self.prompt_builder.build_chat(query);
        serde_json::json!({
            "model":       self.config.model,
            "messages": [
                { "role": "system", "content": system_msg },
                { "role": "user",   "content": user_msg   }
            ],
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens
        })
    }
}

/// Pull `choices[0].message.content` out of a chat-completion response.
fn extract_content(json: &serde_json::Value) -> Result<String, AnswerError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(AnswerError::EmptyResponse)?
        .trim();

    if content.is_empty() {
        return Err(AnswerError::EmptyResponse);
    }
    Ok(content.to_string())
}

#[async_trait]
impl AnswerService for ApiAnswerer {
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is a non-empty string.
    async fn answer(&self, query: &str) -> Result<String, AnswerError> {
        let url = self.endpoint();
        log::debug!("answer: POST {url} (model {})", self.config.model);

        let mut req = self.client.post(&url).json(&self.request_body(query));

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnswerError::Parse(e.to_string()))?;

        extract_content(&json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
