//! Nexus HTTP transport.
//!
//! Exposes the orchestrator over HTTP+JSON:
//!
//! | Route | Method | Purpose |
//! |-------|--------|---------|
//! | `/generate` | POST | run a generation request |
//! | `/users` | POST | register a requester |
//! | `/health` | GET | liveness |
//! | `/metrics` | GET | counter snapshot |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Decodes bodies, maps [`domain::GatewayError`] onto
//! status codes, and nothing else. All request semantics belong to the
//! [`orchestrator`] crate.

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

pub mod dto;
pub mod error;
pub mod routes;

pub use error::{status_for, ApiError};
pub use routes::{router, AppState, SERVICE_NAME};

/// Serves `state` on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish once `shutdown` fires.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http listener started");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
