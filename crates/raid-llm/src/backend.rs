//! LLM backend trait

use crate::types::{GenerateOptions, LlmMessage, LlmResponse};

/// Result type for model operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Model backend error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// A model provider capable of turning a transcript into a completion.
///
/// Streaming is deliberately absent; the reasoning loop consumes whole
/// responses.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Generate a completion for the given transcript.
    async fn generate(
        &self,
        messages: &[LlmMessage],
        options: &GenerateOptions,
    ) -> LlmResult<LlmResponse>;

    /// Cheap reachability probe. `false` means the backend cannot serve
    /// requests right now.
    async fn health_check(&self) -> bool;
}
