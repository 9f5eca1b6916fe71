use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use restock_core::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation request timed out after {0}s")]
    Timeout(u64),
    #[error("generation transport failure: {0}")]
    Transport(String),
    #[error("generation endpoint returned status {0}")]
    Status(u16),
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

/// Narrow port to the text-generation collaborator: prompt in, prose out.
/// The selection core has no dependency on any particular backend and tests
/// run against deterministic stubs.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Strip the model's delimited deliberation block.
///
/// When the raw output carries both an opening and a closing marker, the
/// usable text is everything strictly after the LAST closing marker. Every
/// caller of the generation port applies this identically.
pub fn strip_deliberation(raw: &str) -> &str {
    if raw.contains(THINK_OPEN) {
        if let Some(index) = raw.rfind(THINK_CLOSE) {
            return raw[index + THINK_CLOSE.len()..].trim();
        }
    }
    raw.trim()
}

/// OpenAI-compatible `/chat/completions` client. Transport failures are
/// retried up to `max_retries` times; HTTP error statuses and malformed
/// bodies are not, since re-sending the same request would not help.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage { role: "user".to_owned(), content: prompt.to_owned() }],
        };

        let mut builder = self.http.post(format!("{}/chat/completions", self.base_url));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.json(&request).send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| LlmError::MalformedResponse(error.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("response carried no choices".to_owned()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(content) => {
                    debug!(
                        event_name = "llm.complete.ok",
                        attempt,
                        content_len = content.len(),
                        "generation call succeeded"
                    );
                    return Ok(content);
                }
                Err(error @ (LlmError::Timeout(_) | LlmError::Transport(_)))
                    if attempt < self.max_retries =>
                {
                    attempt += 1;
                    warn!(
                        event_name = "llm.complete.retry",
                        attempt,
                        error = %error,
                        "generation transport failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: String,
}
