//! Chat-completion upstream.
//!
//! Defines the provider trait and error types, plus the OpenAI-compatible
//! client implementation. The generation pipeline only ever sees
//! [`ChatProvider`]; everything HTTP-shaped stays in `client`.

pub mod client;
pub mod types;

use std::future::Future;
use std::pin::Pin;

pub use self::client::OpenAiClient;
pub use self::types::{ChatMessage, Completion, CompletionRequest, MessageRole, Usage};

/// Errors that can occur during a completion call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Trait the generation service calls through.
///
/// Async methods return boxed futures so the trait is dyn-compatible (can be
/// used as `Arc<dyn ChatProvider>`). No `async_trait` macro is needed.
pub trait ChatProvider: Send + Sync {
    /// Non-streaming chat completion. The credential is supplied per call
    /// because it arrives with each inbound request.
    fn complete(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + '_>>;
}
