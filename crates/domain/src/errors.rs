//! Error taxonomy for the gateway domain.
//!
//! [`GatewayError`] is what callers of the orchestrator see. Collaborator-level
//! errors ([`BackendError`], [`StoreError`], [`CacheError`]) are produced by the
//! adapters behind the port traits in [`crate::ports`]; the orchestrator either
//! wraps them into a [`GatewayError`] or absorbs them, never both.
//!
//! There is no retry classification here: nothing in the gateway retries.

use std::time::Duration;

use thiserror::Error;

use crate::UserId;

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure reported by a generation backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The request never produced an HTTP response (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text, for diagnostics.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// The backend answered successfully but produced no content.
    #[error("backend returned no content")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------

/// Failure reported by the usage-log / user store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The requested user does not exist.
    #[error("user '{0}' not found")]
    NotFound(UserId),

    /// Any other storage failure (connection, query, constraint).
    #[error("storage error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------

/// Failure reported by the response cache.
///
/// Never surfaced to callers: lookups degrade to a miss, writes are dropped.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Errors returned to callers of the orchestrator.
///
/// Validation and selection errors are produced before any external call is
/// made. Only [`GatewayError::BackendFailure`] and
/// [`GatewayError::DispatchTimeout`] are produced after a backend has been
/// contacted.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required argument was missing or out of range.
    ///
    /// Produced by: request construction, registration with an empty name.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Human-readable description of the problem.
        message: String,
    },

    /// The requester identity is missing or could not be resolved.
    #[error("identity error: {reason}")]
    Identity {
        /// The identity that failed to resolve, if one was declared.
        user_id: Option<UserId>,
        /// Why resolution failed.
        reason: String,
    },

    /// The caller named a backend that is not in the registry.
    #[error("backend '{backend}' not configured")]
    BackendNotConfigured {
        /// The requested backend name.
        backend: String,
    },

    /// The caller named no backend and no backend of the priority list is
    /// registered.
    #[error("no backends configured")]
    NoBackendsConfigured,

    /// A persistence collaborator required by the operation is absent.
    #[error("{what} not configured")]
    StorageUnavailable {
        /// Which collaborator is missing (e.g. `"user storage"`).
        what: &'static str,
    },

    /// The chosen backend failed. Propagated as-is; never retried.
    #[error("backend '{backend}' failed: {source}")]
    BackendFailure {
        /// Declared name of the backend that failed.
        backend: String,
        /// What the backend reported.
        #[source]
        source: BackendError,
    },

    /// The backend call did not complete within the configured dispatch timeout.
    #[error("backend '{backend}' did not respond within {after:?}")]
    DispatchTimeout {
        /// Declared name of the backend that timed out.
        backend: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The store failed while serving a registration or lookup.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Shorthand for [`GatewayError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Terse machine-readable classification of this error.
    ///
    /// Transport adapters expose it to callers and map it onto their own
    /// status codes.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidArgument { .. } => "invalid_argument",
            GatewayError::Identity { .. } => "identity_error",
            GatewayError::BackendNotConfigured { .. } => "backend_not_configured",
            GatewayError::NoBackendsConfigured => "no_backends_configured",
            GatewayError::StorageUnavailable { .. } => "storage_unavailable",
            GatewayError::BackendFailure { .. } => "backend_failure",
            GatewayError::DispatchTimeout { .. } => "dispatch_timeout",
            GatewayError::Store(_) => "storage_error",
        }
    }
}
