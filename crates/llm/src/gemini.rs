//! Google Gemini `generateContent` backend.

use std::time::Duration;

use async_trait::async_trait;
use domain::{BackendError, Generation, GenerationBackend, GenerationRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{client, endpoint, post_json};
use crate::{Pricing, DEFAULT_TIMEOUT};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Connection and pricing settings for [`GeminiBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    /// API key, sent as the `key` query parameter.
    pub api_key: String,
    /// Model identifier, used in the request path.
    pub model: String,
    /// API root, without the `/v1beta/...` path.
    pub base_url: String,
    /// Prices used to compute [`domain::UsageInfo::cost`].
    pub pricing: Pricing,
    /// Overall HTTP timeout.
    pub timeout: Duration,
}

impl GeminiSettings {
    /// Settings with the default model, endpoint and timeout, and zero prices.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            pricing: Pricing::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the model; a leading `models/` is accepted.
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

    fn model_name(&self) -> &str {
        let model = self.model.trim();
        model.strip_prefix("models/").unwrap_or(model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    fn for_request(request: &GenerationRequest) -> Option<Self> {
        if request.temperature().is_none() && request.max_tokens().is_none() {
            return None;
        }
        Some(Self {
            temperature: request.temperature(),
            max_output_tokens: request.max_tokens(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

/// [`GenerationBackend`] backed by `POST /v1beta/models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    settings: GeminiSettings,
    http: Client,
}

impl GeminiBackend {
    /// Declared name used for attribution.
    pub const NAME: &'static str = "Gemini";

    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// [`BackendError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: GeminiSettings) -> Result<Self, BackendError> {
        let http = client(settings.timeout)?;
        Ok(Self { settings, http })
    }

    /// The settings this backend was built with.
    pub fn settings(&self) -> &GeminiSettings {
        &self.settings
    }

    fn generate_url(&self) -> String {
        endpoint(
            &self.settings.base_url,
            &format!("v1beta/models/{}:generateContent", self.settings.model_name()),
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[tracing::instrument(skip_all, fields(backend = Self::NAME, model = %self.settings.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [RequestPart {
                    text: request.prompt(),
                }],
            }],
            generation_config: GenerationConfig::for_request(request),
        };

        let response: GenerateContentResponse = post_json(
            self.http
                .post(self.generate_url())
                .query(&[("key", self.settings.api_key.as_str())]),
            &body,
        )
        .await?;

        // Text of the first candidate; multi-part answers are concatenated.
        let content: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        let usage = response.usage_metadata.map(|usage| {
            self.settings.pricing.usage(
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count,
            )
        });

        Ok(Generation { content, usage })
    }
}
