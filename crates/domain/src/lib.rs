//! Core domain for the Nexus generation gateway.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, error type and port trait used throughout the gateway. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business types + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`UserId`, `BackendName`, `RecordId`) |
//! | [`types`] | Value types (`GenerationRequest`, `UsageInfo`, `UsageLogRecord`, etc.) |
//! | [`errors`] | Gateway error taxonomy and collaborator errors |
//! | [`ports`] | `GenerationBackend`, `ResponseCache`, `UsageLogStore` |

pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{BackendError, CacheError, GatewayError, StoreError};
pub use identifiers::{BackendName, RecordId, UserId};
pub use ports::{GenerationBackend, ResponseCache, UsageLogStore};
pub use types::{
    Generation, GenerationRequest, GenerationResponse, Provenance, Timestamp, TokenCost,
    TokenCount, UsageInfo, UsageLogRecord, User, MAX_OUTPUT_TOKENS, TEMPERATURE_RANGE,
};
