use async_trait::async_trait;

use super::types::{GenerateRequest, GenerateResponse, LlmError};

/// Process-wide handle to the language model provider. Initialized once
/// at startup and shared immutably across requests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single generation call. No internal retries; a failed call
    /// surfaces immediately to the caller.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;

    /// Embed a piece of text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}
