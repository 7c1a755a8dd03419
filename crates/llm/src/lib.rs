//! Nexus generation backends.
//!
//! Implements [`domain::GenerationBackend`] for the OpenAI chat-completions API
//! and the Gemini `generateContent` API. The orchestrator sees only the trait;
//! everything about endpoints, auth, JSON shapes and pricing lives here.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and cost computation. No retries: a failed call is reported once as a
//! [`domain::BackendError`] and the orchestrator propagates it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`openai`] | [`OpenAiBackend`], [`OpenAiSettings`] |
//! | [`gemini`] | [`GeminiBackend`], [`GeminiSettings`] |
//! | [`pricing`] | [`Pricing`] |

use std::time::Duration;

pub mod gemini;
pub mod openai;
pub mod pricing;

mod http;

pub use gemini::{GeminiBackend, GeminiSettings};
pub use openai::{OpenAiBackend, OpenAiSettings};
pub use pricing::Pricing;

/// Registry key under which the OpenAI backend is registered.
pub const OPENAI_KEY: &str = "openai";

/// Registry key under which the Gemini backend is registered.
pub const GEMINI_KEY: &str = "gemini";

/// HTTP timeout applied when the settings do not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
