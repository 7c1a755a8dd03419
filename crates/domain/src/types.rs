//! Shared value types for the gateway domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. temperatures are finite and within
//! `[0.0, 2.0]`, costs are non-negative) and flow through the orchestration
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GatewayError, RecordId, UserId};

// ---------------------------------------------------------------------------
// Token and cost types
// ---------------------------------------------------------------------------

/// Number of tokens consumed by a generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

// ---------------------------------------------------------------------------

/// Monetary cost of a generation call, expressed in US dollars.
///
/// Backends compute it from their pricing tables; the gateway only records it.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TokenCost(f64);

impl TokenCost {
    /// Creates a [`TokenCost`] from a raw float value (USD).
    ///
    /// Returns `None` if `value` is negative, infinite, or NaN.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`TokenCost`] of exactly zero.
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying `f64` value (USD).
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` if this cost is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl std::fmt::Display for TokenCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.6}", self.0)
    }
}

impl std::ops::Add for TokenCost {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

// ---------------------------------------------------------------------------

/// Token usage and cost reported by a backend for one call.
///
/// Absent on a [`GenerationResponse`] when the backend does not report usage
/// or when the content was served from cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    /// Tokens in the prompt.
    pub prompt_tokens: TokenCount,
    /// Tokens in the generated completion.
    pub completion_tokens: TokenCount,
    /// Total tokens as reported by the backend (not necessarily the sum).
    pub total_tokens: TokenCount,
    /// Cost of the call computed from the backend's pricing.
    pub cost: TokenCost,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Upper bound accepted for [`GenerationRequest::max_tokens`].
pub const MAX_OUTPUT_TOKENS: u32 = 128_000;

/// Accepted range for [`GenerationRequest::temperature`].
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

/// A validated generation request.
///
/// Immutable once constructed; the only way to build one is
/// [`GenerationRequest::new`] followed by the `with_*` refinements, each of
/// which validates its input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    user_id: Option<UserId>,
    prompt: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Creates a request for `prompt`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] if the prompt is empty or whitespace.
    pub fn new(prompt: impl Into<String>) -> Result<Self, GatewayError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(GatewayError::invalid_argument("prompt is required"));
        }
        Ok(Self {
            user_id: None,
            prompt,
            temperature: None,
            max_tokens: None,
        })
    }

    /// Declares the requester on whose behalf the generation is made.
    #[must_use]
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the sampling temperature.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] if `temperature` is not finite or
    /// lies outside [`TEMPERATURE_RANGE`].
    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, GatewayError> {
        if !temperature.is_finite() || !TEMPERATURE_RANGE.contains(&temperature) {
            return Err(GatewayError::invalid_argument(format!(
                "temperature must be within [{}, {}], got {temperature}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            )));
        }
        self.temperature = Some(temperature);
        Ok(self)
    }

    /// Sets the maximum number of output tokens.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] if `max_tokens` is zero or exceeds
    /// [`MAX_OUTPUT_TOKENS`].
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Result<Self, GatewayError> {
        if max_tokens == 0 || max_tokens > MAX_OUTPUT_TOKENS {
            return Err(GatewayError::invalid_argument(format!(
                "max_tokens must be within [1, {MAX_OUTPUT_TOKENS}], got {max_tokens}"
            )));
        }
        self.max_tokens = Some(max_tokens);
        Ok(self)
    }

    /// The declared requester, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// The prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The sampling temperature, if set.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// The output-token cap, if set.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What a backend produces for one successful call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub content: String,
    /// Usage reported by the backend, if it reports any.
    pub usage: Option<UsageInfo>,
}

/// Label identifying where a [`GenerationResponse`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Produced by the backend with this declared name.
    Backend(String),
    /// Served from the response cache.
    Cache,
}

impl Provenance {
    /// Provenance label of cached responses.
    pub const CACHE_LABEL: &'static str = "cache";

    /// Returns the label reported to callers: the backend name, or `"cache"`.
    pub fn label(&self) -> &str {
        match self {
            Provenance::Backend(name) => name,
            Provenance::Cache => Self::CACHE_LABEL,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The orchestrator's answer to a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated (or cached) text.
    pub content: String,
    /// Usage of the backend call; `None` for cache hits.
    pub usage: Option<UsageInfo>,
    /// Which backend produced the content, or the cache.
    pub provenance: Provenance,
}

// ---------------------------------------------------------------------------
// Persistence records
// ---------------------------------------------------------------------------

/// A registered requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identity.
    pub id: UserId,
    /// Display name given at registration.
    pub name: String,
    /// When the requester was registered.
    pub created_at: Timestamp,
}

/// One completed request, as appended to the usage log.
///
/// Built by the orchestrator after a successful backend call and handed over
/// to the store; usage fields are zero when the backend reported none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLogRecord {
    /// Record identity, generated at construction.
    pub id: RecordId,
    /// Requester, if the request declared one.
    pub user_id: Option<UserId>,
    /// Prompt text.
    pub prompt: String,
    /// Declared name of the backend that answered.
    pub backend: String,
    /// Generated text.
    pub response: String,
    /// Wall-clock time spent in the backend call.
    pub latency_ms: u64,
    /// Token usage and cost (zero when not reported).
    pub usage: UsageInfo,
    /// When the record was created.
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_blank_prompt() {
        let err = GenerationRequest::new("   ").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument { .. }));
    }

    #[test]
    fn request_bounds_temperature_and_max_tokens() {
        let request = GenerationRequest::new("hello").unwrap();
        assert!(request.clone().with_temperature(0.0).is_ok());
        assert!(request.clone().with_temperature(2.5).is_err());
        assert!(request.clone().with_temperature(f32::NAN).is_err());
        assert!(request.clone().with_max_tokens(0).is_err());
        assert!(request.clone().with_max_tokens(MAX_OUTPUT_TOKENS + 1).is_err());

        let request = request.with_max_tokens(256).unwrap();
        assert_eq!(request.max_tokens(), Some(256));
    }

    #[test]
    fn provenance_labels() {
        assert_eq!(Provenance::Cache.label(), "cache");
        assert_eq!(Provenance::Backend("OpenAI".into()).label(), "OpenAI");
    }

    #[test]
    fn token_cost_rejects_negative_and_nan() {
        assert!(TokenCost::new(-0.1).is_none());
        assert!(TokenCost::new(f64::NAN).is_none());
        assert_eq!(TokenCost::new(0.001).unwrap().to_string(), "$0.001000");
    }
}
