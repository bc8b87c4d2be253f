use std::time::Duration;

use async_trait::async_trait;
use lgtm_core::{LgtmError, LlmConfig, LlmError};
use serde::Serialize;
use tracing::{debug, error, info};

/// A model that turns a system/user prompt pair into raw text.
///
/// [`LlmClient`] is the production implementation; tests substitute fakes.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Identifier of the model answering requests.
    fn model(&self) -> &str;

    /// Run one completion and return the raw text of the first choice.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LgtmError>;
}

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use lgtm_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Review this code".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use lgtm_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenRouter, OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use lgtm_core::LlmConfig;
/// use lgtm_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// The request timeout comes from `config.timeout_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, LgtmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Send a chat completion request and return the text response.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Auth`] when no API key is configured or the
    /// provider rejects it, [`LlmError::Timeout`] when the deadline passes, and
    /// [`LlmError::Transport`] for every other failure.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LgtmError> {
        let Some(api_key) = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
        else {
            error!("LLM API key is missing");
            return Err(LlmError::Auth("no API key configured".into()).into());
        };

        let url = completions_url(&self.config.base_url);
        let body = request_body(&self.config, &messages);
        let timeout = self.config.timeout_secs;

        info!(model = %self.config.model, "sending request to LLM provider");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(&e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body_text, "LLM API error");
            return Err(status_error(status.as_u16(), &body_text).into());
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| request_error(&e, timeout))?;

        let content = extract_content(&response_body)?;
        info!("received response from LLM provider");
        debug!(raw = %content.chars().take(200).collect::<String>(), "raw LLM response");
        Ok(content)
    }
}

#[async_trait]
impl CompletionModel for LlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LgtmError> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: system_prompt.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: user_prompt.to_string(),
            },
        ];
        self.chat(messages).await
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

fn request_body(config: &LlmConfig, messages: &[ChatMessage]) -> serde_json::Value {
    serde_json::json!({
        "model": config.model,
        "messages": messages,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
    })
}

fn request_error(e: &reqwest::Error, timeout_secs: u64) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout_secs)
    } else {
        LlmError::Transport(format!("request failed: {e}"))
    }
}

fn status_error(status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(format!("provider returned {status}: {body}")),
        _ => LlmError::Transport(format!("LLM API error {status}: {body}")),
    }
}

fn extract_content(response_body: &serde_json::Value) -> Result<String, LlmError> {
    response_body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmError::Transport(format!("unexpected response structure: {response_body}")))
}
