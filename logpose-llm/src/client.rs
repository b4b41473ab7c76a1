//! LLM Client: unified interface for OpenAI-compatible and Ollama backends.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Anything that turns instructions plus a conversation window into text.
///
/// The session is generic over this so tests can script responses.
pub trait Generate {
    /// Produce free text for `request`.
    fn generate(&self, request: &LlmRequest) -> impl Future<Output = Result<LlmResponse, LlmError>> + Send;

    /// Whether a backend is configured at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Provider backend for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama chat API.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat-completions API.
    OpenAiCompatible {
        /// Server root, e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend; every call fails with [`LlmError::Unavailable`].
    None,
}

impl LlmProvider {
    /// Build a provider from its configured name.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown provider name or an
    /// OpenAI-compatible provider without a key.
    pub fn from_parts(kind: &str, base_url: &str, api_key: Option<String>) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match kind.trim().to_ascii_lowercase().as_str() {
            "openai" => {
                let api_key = api_key
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| LlmError::ConfigError("openai provider needs an API key".into()))?;
                Ok(Self::OpenAiCompatible { base_url, api_key })
            }
            "ollama" => Ok(Self::Ollama { base_url }),
            "none" | "" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Ollama { .. } => "ollama",
            Self::OpenAiCompatible { .. } => "openai",
            Self::None => "none",
        }
    }
}

/// HTTP client bound to one provider and one model.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// Create a client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Configured backend.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let (url, body, bearer) = match &self.provider {
            LlmProvider::None => return Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => (
                format!("{base_url}/api/chat"),
                ollama_body(&self.model, request),
                None,
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                format!("{base_url}/v1/chat/completions"),
                openai_body(&self.model, request),
                Some(api_key.as_str()),
            ),
        };

        let mut builder = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(request.timeout_ms));
        if let Some(key) = bearer {
            builder = builder.bearer_auth(key);
        }

        let start = Instant::now();
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(request.timeout_ms)
            } else {
                LlmError::from(e)
            }
        })?;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let status = resp.status();
        if !status.is_success() {
            let detail: String = resp.text().await.unwrap_or_default().chars().take(200).collect();
            return Err(LlmError::RequestFailed(format!("HTTP {status}: {detail}")));
        }

        let json: Value = resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;
        let (text, tokens) = match self.provider {
            LlmProvider::Ollama { .. } => (ollama_text(&json), json["eval_count"].as_u64()),
            _ => (openai_text(&json), json["usage"]["completion_tokens"].as_u64()),
        };
        let text = text
            .ok_or_else(|| LlmError::ParseError(format!("no message content in response: {json}")))?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(LlmResponse {
            text: text.to_string(),
            tokens_generated: u32::try_from(tokens.unwrap_or(0)).unwrap_or(u32::MAX),
            latency_ms,
            model: self.model.clone(),
        })
    }
}

impl Generate for LlmClient {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        if matches!(self.provider, LlmProvider::None) {
            return Err(LlmError::Unavailable("No LLM provider configured".into()));
        }

        let attempts = self.max_retries + 1;
        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                debug!(attempt = attempt + 1, attempts, "retrying generation call");
            }
            match self.send_once(request).await {
                Ok(response) => {
                    debug!(
                        provider = self.provider.name(),
                        model = %response.model,
                        latency_ms = response.latency_ms,
                        tokens = response.tokens_generated,
                        "generation complete"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(provider = self.provider.name(), error = %e, "generation call failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if attempts == 1 => Err(e),
            Some(e) => Err(LlmError::RetriesExhausted {
                attempts,
                last_error: e.to_string(),
            }),
            None => Err(LlmError::Unavailable("no attempt was made".into())),
        }
    }

    fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }
}

/// Chat-completions body for an OpenAI-compatible server.
#[must_use]
pub fn openai_body(model: &str, request: &LlmRequest) -> Value {
    json!({
        "model": model,
        "messages": request.chat_messages(),
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    })
}

/// Chat body for an Ollama server.
#[must_use]
pub fn ollama_body(model: &str, request: &LlmRequest) -> Value {
    json!({
        "model": model,
        "messages": request.chat_messages(),
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        }
    })
}

fn openai_text(json: &Value) -> Option<&str> {
    json["choices"][0]["message"]["content"].as_str()
}

fn ollama_text(json: &Value) -> Option<&str> {
    json["message"]["content"].as_str()
}
