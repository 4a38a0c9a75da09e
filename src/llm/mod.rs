//! Language model client: the narrow seam between the chat pipeline and
//! the Gemini API.

mod client;
mod gemini;
mod types;

#[cfg(test)]
pub mod mock;

pub use client::LlmClient;
pub use gemini::GeminiClient;
pub use types::{
    Candidate, ChatMessage, GenerateRequest, GenerateResponse, GenerationConfig, LlmError, Prompt,
    PromptFeedback, ResponseIssue,
};
