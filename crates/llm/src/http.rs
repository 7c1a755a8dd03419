//! Shared request/response plumbing for the backend clients.

use std::time::Duration;

use domain::BackendError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Builds a client with the given overall request timeout.
pub(crate) fn client(timeout: Duration) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Transport(e.to_string()))
}

/// Sends `body` as JSON and decodes a successful response as `R`.
///
/// Non-2xx responses become [`BackendError::Status`] with the body text,
/// undecodable bodies become [`BackendError::Decode`].
pub(crate) async fn post_json<B, R>(request: RequestBuilder, body: &B) -> Result<R, BackendError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    let status = response.status();
    debug!(status = status.as_u16(), "backend responded");
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Joins `base` and `path` without doubling the separator.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
