//! Mapping of gateway errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::GatewayError;
use tracing::warn;

use crate::dto::ErrorBody;

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// The orchestrator refused or failed the request.
    Gateway(GatewayError),
    /// The body could not be read as the expected JSON.
    MalformedBody(String),
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self::Gateway(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedBody(rejection.body_text())
    }
}

/// HTTP status for each [`GatewayError`] variant.
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::InvalidArgument { .. } | GatewayError::BackendNotConfigured { .. } => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::Identity { .. } => StatusCode::FORBIDDEN,
        GatewayError::NoBackendsConfigured | GatewayError::StorageUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GatewayError::BackendFailure { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::DispatchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Gateway(error) => {
                let status = status_for(&error);
                if status.is_server_error() {
                    warn!(code = error.code(), %error, "request failed");
                }
                (
                    status,
                    ErrorBody {
                        error: error.code(),
                        message: error.to_string(),
                    },
                )
            }
            ApiError::MalformedBody(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "malformed_body",
                    message,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}
