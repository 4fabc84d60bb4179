//! Provider adapters
//!
//! Uniform `call(messages, max_tokens, temperature) -> text` over each
//! backend. Two HTTP adapters cover the configured wire protocols:
//! - OpenAI-compatible `/v1/chat/completions` (OpenAI, Groq, DeepSeek, ...)
//! - Ollama `/api/chat`
//!
//! Non-2xx statuses, transport failures, malformed bodies and empty content
//! all map to `ProviderError::Rejected`.

use async_trait::async_trait;
use coach_common::{ChatMessage, ProviderConfig, ProviderKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Transport-level HTTP timeout. The gateway enforces the tighter per-call
/// timeout on top of this.
const HTTP_TIMEOUT_SECS: u64 = 120;

/// Failure of a single provider attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("{provider} rejected the request: {reason}")]
    Rejected { provider: String, reason: String },

    #[error("{provider} skipped: circuit open")]
    CircuitOpen { provider: String },
}

impl ProviderError {
    pub fn rejected(provider: &str, reason: impl Into<String>) -> Self {
        ProviderError::Rejected {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider, .. }
            | ProviderError::Rejected { provider, .. }
            | ProviderError::CircuitOpen { provider } => provider,
        }
    }
}

/// Generative-AI backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider name used for breakers, stats and logs
    fn name(&self) -> &str;

    async fn call(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

fn map_transport_error(provider: &str, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            after_ms: HTTP_TIMEOUT_SECS * 1000,
        }
    } else {
        ProviderError::rejected(provider, format!("request failed: {}", e))
    }
}

async fn read_json(provider: &str, response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(ProviderError::rejected(
            provider,
            format!("HTTP {}: {}", status, snippet),
        ));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ProviderError::rejected(provider, format!("malformed body: {}", e)))
}

fn non_empty(provider: &str, content: Option<&str>) -> Result<String, ProviderError> {
    match content.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ProviderError::rejected(provider, "empty response")),
    }
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

pub struct OpenAiCompatibleProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            http_client: http_client(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        debug!(provider = %self.name, model = %self.model, "chat completion request");

        let mut request = self.http_client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&self.name, e))?;
        let value = read_json(&self.name, response).await?;

        let content = value
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str());
        non_empty(&self.name, content)
    }
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaProvider {
    name: String,
    endpoint: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(name: &str, endpoint: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http_client: http_client(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.endpoint);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": max_tokens,
                "temperature": temperature,
            },
        });

        debug!(provider = %self.name, model = %self.model, "ollama chat request");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.name, e))?;
        let value = read_json(&self.name, response).await?;

        let content = value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str());
        non_empty(&self.name, content)
    }
}

/// Build an adapter for a configured provider. Returns None when the
/// provider requires an API key that is not available.
pub fn build_provider(config: &ProviderConfig) -> Option<Arc<dyn ProviderAdapter>> {
    match config.kind {
        ProviderKind::OpenaiCompatible => {
            let api_key = config.api_key();
            if config.api_key_env.is_some() && api_key.is_none() {
                warn!(
                    provider = %config.name,
                    "API key variable {} is unset, provider disabled",
                    config.api_key_env.as_deref().unwrap_or_default()
                );
                return None;
            }
            Some(Arc::new(OpenAiCompatibleProvider::new(
                &config.name,
                &config.endpoint,
                &config.model,
                api_key,
            )))
        }
        ProviderKind::Ollama => Some(Arc::new(OllamaProvider::new(
            &config.name,
            &config.endpoint,
            &config.model,
        ))),
    }
}
