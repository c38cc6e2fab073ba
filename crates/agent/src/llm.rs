use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadflow_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    /// Ask the provider for a JSON object instead of prose.
    pub json_output: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("completion provider returned an empty response")]
    EmptyResponse,
    #[error("completion output malformed: {0}")]
    Malformed(String),
    #[error("completion client misconfigured: {0}")]
    Configuration(String),
}

impl CompletionError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Text-completion service consumed by the conversation pipeline.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Runs one completion bounded by `limit`. A timeout is reported as an error, never a hang.
pub async fn complete_within(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    limit: Duration,
) -> Result<String, CompletionError> {
    match tokio::time::timeout(limit, client.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(CompletionError::Timeout { after_ms: limit.as_millis() as u64 }),
    }
}

/// A completion client bound to one model, temperature and time limit.
#[derive(Clone)]
pub struct CompletionStep {
    client: Arc<dyn CompletionClient>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionStep {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self { client, model: model.into(), temperature, timeout }
    }

    pub async fn run(
        &self,
        messages: Vec<ChatMessage>,
        json_output: bool,
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            messages,
            model: self.model.clone(),
            temperature: self.temperature,
            json_output,
        };
        complete_within(self.client.as_ref(), &request, self.timeout).await
    }
}

pub struct HttpCompletionClient {
    provider: LlmProvider,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    client: Client,
}

impl HttpCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key.as_ref().map(|key| key.expose_secret().to_string());
        if matches!(config.provider, LlmProvider::OpenAi | LlmProvider::Anthropic)
            && api_key.as_deref().map(str::trim).unwrap_or_default().is_empty()
        {
            return Err(CompletionError::Configuration(format!(
                "an api key is required for provider `{}`",
                config.provider.as_str()
            )));
        }

        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) if !url.trim().is_empty() => url.trim_end_matches('/').to_string(),
            (_, LlmProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (_, LlmProvider::Anthropic) => ANTHROPIC_DEFAULT_BASE_URL.to_string(),
            (_, LlmProvider::Ollama) => {
                return Err(CompletionError::Configuration(
                    "a base url is required for the ollama provider".to_string(),
                ))
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CompletionError::Configuration(e.to_string()))?;

        Ok(Self { provider: config.provider, base_url, api_key, max_retries: config.max_retries, client })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::Ollama => format!("{}/api/chat", self.base_url),
        }
    }

    async fn send_once(&self, body: &Value) -> Result<Value, CompletionError> {
        let mut builder = self.client.post(self.endpoint()).json(body);
        match self.provider {
            LlmProvider::OpenAi => {
                if let Some(key) = &self.api_key {
                    builder = builder.bearer_auth(key);
                }
            }
            LlmProvider::Anthropic => {
                if let Some(key) = &self.api_key {
                    builder = builder.header("x-api-key", key);
                }
                builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
            }
            LlmProvider::Ollama => {}
        }

        let response = builder.send().await.map_err(|e| CompletionError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Provider { status: status.as_u16(), body });
        }
        response.json::<Value>().await.map_err(|e| CompletionError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = request_body(self.provider, request);
        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(payload) => return extract_text(self.provider, &payload),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.completion.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "retrying completion request"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Builds the provider-specific request payload.
pub fn request_body(provider: LlmProvider, request: &CompletionRequest) -> Value {
    match provider {
        LlmProvider::OpenAi => {
            let mut body = json!({
                "model": request.model,
                "messages": request.messages,
                "temperature": request.temperature,
            });
            if request.json_output {
                body["response_format"] = json!({ "type": "json_object" });
            }
            body
        }
        LlmProvider::Anthropic => {
            let system = request
                .messages
                .iter()
                .filter(|message| message.role == MessageRole::System)
                .map(|message| message.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let messages = request
                .messages
                .iter()
                .filter(|message| message.role != MessageRole::System)
                .collect::<Vec<_>>();
            let mut body = json!({
                "model": request.model,
                "max_tokens": ANTHROPIC_MAX_TOKENS,
                "messages": messages,
                "temperature": request.temperature,
            });
            if !system.is_empty() {
                body["system"] = Value::String(system);
            }
            body
        }
        LlmProvider::Ollama => {
            let mut body = json!({
                "model": request.model,
                "messages": request.messages,
                "stream": false,
                "options": { "temperature": request.temperature },
            });
            if request.json_output {
                body["format"] = Value::String("json".to_string());
            }
            body
        }
    }
}

/// Pulls the generated text out of a provider response.
pub fn extract_text(provider: LlmProvider, payload: &Value) -> Result<String, CompletionError> {
    let text = match provider {
        LlmProvider::OpenAi => payload.pointer("/choices/0/message/content").and_then(Value::as_str),
        LlmProvider::Anthropic => payload
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks.iter().find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            })
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str),
        LlmProvider::Ollama => payload.pointer("/message/content").and_then(Value::as_str),
    };

    match text.map(str::trim) {
        Some(text) if !text.is_empty() => {
            debug!(provider = provider.as_str(), chars = text.len(), "completion received");
            Ok(text.to_string())
        }
        Some(_) => Err(CompletionError::EmptyResponse),
        None => Err(CompletionError::Malformed(format!(
            "no text content in {} response",
            provider.as_str()
        ))),
    }
}
