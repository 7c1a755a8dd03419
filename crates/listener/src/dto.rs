//! JSON bodies of the HTTP API.

use domain::{GenerationResponse, Timestamp, UsageInfo, User};
use serde::{Deserialize, Serialize};

/// Body of `POST /generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub user_id: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// `0` means unset.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Answer to `POST /generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReply {
    pub content: String,
    pub provider_used: String,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageBody>,
}

impl GenerateReply {
    pub fn new(response: GenerationResponse, processing_time_ms: u64) -> Self {
        Self {
            provider_used: response.provenance.label().to_string(),
            content: response.content,
            processing_time_ms,
            usage: response.usage.map(UsageBody::from),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UsageBody {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl From<UsageInfo> for UsageBody {
    fn from(usage: UsageInfo) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens.as_u64(),
            completion_tokens: usage.completion_tokens.as_u64(),
            total_tokens: usage.total_tokens.as_u64(),
            cost_usd: usage.cost.as_f64(),
        }
    }
}

/// Body of `POST /users`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterBody {
    pub name: String,
}

/// Answer to `POST /users`.
#[derive(Debug, Clone, Serialize)]
pub struct UserReply {
    pub id: String,
    pub name: String,
    pub created_at: Timestamp,
}

impl From<User> for UserReply {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            created_at: user.created_at,
        }
    }
}

/// Answer to `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReply {
    pub status: &'static str,
    pub service: &'static str,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}
