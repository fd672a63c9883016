//! Backend for OpenAI-compatible chat completion APIs.
//!
//! One client covers all three supported providers, since Groq and Ollama
//! both speak the OpenAI wire shape. The differences live entirely in
//! [`OpenAiConfig`]: base URL, default model, timeout, and whether an API
//! key is sent at all.

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{ChatMessage, CompletionRequest, CompletionResponse, Usage};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key, `None` for keyless local services like Ollama.
    pub api_key: Option<String>,

    /// Endpoint base URL, up to and including the `/v1` segment.
    pub base_url: String,

    /// Pinned model. When set it overrides the model named in each request.
    pub model: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retry budget for transient failures.
    pub max_retries: u32,

    /// Initial backoff between retries, doubled each attempt.
    pub retry_backoff: Duration,

    /// Provider name, used in logs and health checks.
    pub name: String,
}

impl OpenAiConfig {
    /// Settings for the real OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: "openai".to_string(),
        }
    }

    /// Settings for Groq's OpenAI-compatible endpoint.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_GROQ_BASE.to_string(),
            model: Some("llama-3.3-70b-versatile".to_string()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: "groq".to_string(),
        }
    }

    /// Settings for a local Ollama server. No key, and a generous timeout
    /// because local inference can be slow on first token.
    pub fn ollama() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OLLAMA_BASE.to_string(),
            model: None,
            timeout: Duration::from_secs(600),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: "ollama".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completion client for any OpenAI-compatible provider.
#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Flatten a request into the wire shape. The optional system prompt
    /// becomes the leading message, and a pinned config model wins over
    /// the model named in the request.
    fn wire_request(&self, request: &CompletionRequest) -> ChatBody {
        let system = request.system.iter().map(|s| WireMessage {
            role: "system".to_string(),
            content: s.clone(),
        });
        let turns = request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        });

        ChatBody {
            model: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            messages: system.chain(turns).collect(),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
        }
    }

    async fn read_response(response: Response) -> Result<CompletionResponse> {
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body = response.text().await?;
        let parsed: ChatCompletion =
            serde_json::from_str(&body).map_err(|e| LlmError::Serialization(e.to_string()))?;

        Ok(parsed.into())
    }

    /// Map a failed HTTP response onto the error taxonomy. The Retry-After
    /// header is captured before the body is consumed so rate-limit errors
    /// keep their wait hint.
    async fn error_from_response(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(&body) else {
            return LlmError::Backend(format!("HTTP {}: {}", status, body));
        };

        let message = parsed.error.message;
        match status.as_u16() {
            401 => LlmError::Auth(format!("Authentication failed: {}", message)),
            429 => LlmError::RateLimit(RateLimitInfo::from_response(
                &message,
                retry_after.as_deref(),
            )),
            500..=599 => LlmError::Backend(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.wire_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = %body.messages.len(),
            "Sending OpenAI-compatible request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self
                    .authorize(self.client.post(self.completions_url()))
                    .json(&body)
                    .send()
                    .await?;

                Self::read_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<()> {
        // Ollama exposes a models listing, which is cheaper than inference.
        if self.config.name == "ollama" {
            let models_url = format!("{}/models", self.config.base_url.trim_end_matches("/v1"));
            let response = self.client.get(&models_url).send().await?;
            if response.status().is_success() {
                return Ok(());
            }
        }

        // Hosted APIs get a one-token ping instead.
        let model = self
            .config
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let request = CompletionRequest::new(model, vec![ChatMessage::user("ping")], 1);

        match self.complete(request).await {
            Ok(_) => Ok(()),
            // Being throttled proves the endpoint and key both work.
            Err(LlmError::RateLimit(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Construct a backend behind the trait object the agent consumes.
pub fn create_shared_backend(config: OpenAiConfig) -> Result<Arc<dyn LlmBackend>> {
    Ok(Arc::new(OpenAiBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, serde::Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
struct ChatCompletion {
    id: String,
    choices: Vec<Choice>,
    model: String,
    usage: Option<WireUsage>,
}

impl From<ChatCompletion> for CompletionResponse {
    fn from(resp: ChatCompletion) -> Self {
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let (input, output) = resp
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));

        CompletionResponse {
            id: resp.id,
            model: resp.model,
            content,
            usage: Usage {
                input_tokens: input,
                output_tokens: output,
            },
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, serde::Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, serde::Deserialize)]
struct ApiError {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
