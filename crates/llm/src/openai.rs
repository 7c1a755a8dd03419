//! OpenAI chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use domain::{BackendError, Generation, GenerationBackend, GenerationRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{client, endpoint, post_json};
use crate::{Pricing, DEFAULT_TIMEOUT};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Model used when none is configured.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Connection and pricing settings for [`OpenAiBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSettings {
    /// Bearer token.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// API root, without the `/v1/...` path.
    pub base_url: String,
    /// Prices used to compute [`domain::UsageInfo::cost`].
    pub pricing: Pricing,
    /// Overall HTTP timeout.
    pub timeout: Duration,
}

impl OpenAiSettings {
    /// Settings with the default model, endpoint and timeout, and zero prices.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
            pricing: Pricing::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API root (tests point this at a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the pricing table.
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Overrides the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// [`GenerationBackend`] backed by `POST /v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    settings: OpenAiSettings,
    http: Client,
}

impl OpenAiBackend {
    /// Declared name used for attribution.
    pub const NAME: &'static str = "OpenAI";

    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// [`BackendError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: OpenAiSettings) -> Result<Self, BackendError> {
        let http = client(settings.timeout)?;
        Ok(Self { settings, http })
    }

    /// The settings this backend was built with.
    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[tracing::instrument(skip_all, fields(backend = Self::NAME, model = %self.settings.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        let body = ChatCompletionRequest {
            model: &self.settings.model,
            messages: [ChatMessage {
                role: "user",
                content: request.prompt(),
            }],
            temperature: request.temperature(),
            max_tokens: request.max_tokens(),
        };

        let url = endpoint(&self.settings.base_url, "v1/chat/completions");
        let response: ChatCompletionResponse = post_json(
            self.http.post(url).bearer_auth(&self.settings.api_key),
            &body,
        )
        .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        let usage = response.usage.map(|usage| {
            self.settings.pricing.usage(
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens,
            )
        });

        Ok(Generation { content, usage })
    }
}
