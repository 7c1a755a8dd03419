//! Cache key derivation.

use domain::GenerationRequest;

/// Derives the cache key for `request` when `backend` was explicitly named.
///
/// The key is `"{backend}:{user}:{prompt}"`, with absent parts rendered as
/// empty strings. Including the requester keeps one user's cached answers
/// invisible to another; including the backend keeps an explicit request for
/// one provider from being served another provider's output.
///
/// Sampling parameters are deliberately not part of the key.
pub fn derive_cache_key(backend: Option<&str>, request: &GenerationRequest) -> String {
    format!(
        "{}:{}:{}",
        backend.unwrap_or_default(),
        request.user_id().map(|id| id.as_str()).unwrap_or_default(),
        request.prompt()
    )
}
