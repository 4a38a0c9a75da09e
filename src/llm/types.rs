use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::GenerationDefaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Either `"user"` or `"model"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            content: content.into(),
        }
    }
}

/// What is sent to the model: a single flat prompt string, or a
/// role-tagged message sequence that preserves speaker turns.
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    Messages(Vec<ChatMessage>),
}

#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i64>,
    pub max_output_tokens: Option<i64>,
}

impl From<&GenerationDefaults> for GenerationConfig {
    fn from(defaults: &GenerationDefaults) -> Self {
        Self {
            temperature: Some(defaults.temperature),
            top_p: Some(defaults.top_p),
            top_k: Some(defaults.top_k),
            max_output_tokens: Some(defaults.max_output_tokens),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: Prompt,
    pub system_instruction: Option<String>,
    /// Overrides the client's defaults when set.
    pub config: Option<GenerationConfig>,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Prompt::Text(prompt.into()),
            system_instruction: None,
            config: None,
        }
    }

    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            prompt: Prompt::Messages(messages),
            system_instruction: None,
            config: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

/// Why a response carried no usable text even though the call itself
/// succeeded at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseIssue {
    NoCandidates { block_reason: Option<String> },
    StoppedEarly { finish_reason: String },
}

impl GenerateResponse {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(text.into()),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        }
    }

    /// Extracts the answer text, distinguishing the no-candidate case
    /// from a candidate whose generation halted before producing text.
    pub fn text(&self) -> Result<String, ResponseIssue> {
        let Some(candidate) = self.candidates.first() else {
            return Err(ResponseIssue::NoCandidates {
                block_reason: self
                    .prompt_feedback
                    .as_ref()
                    .and_then(|f| f.block_reason.clone()),
            });
        };

        match &candidate.content {
            Some(content) if !content.is_empty() => Ok(content.clone()),
            _ => Err(ResponseIssue::StoppedEarly {
                finish_reason: candidate
                    .finish_reason
                    .clone()
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider refused the request outright. Callers map this to a
    /// fixed user-facing safety message rather than falling back.
    #[error("generation blocked by safety filter: {reason}")]
    SafetyBlocked { reason: String },
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm api error ({status}): {message}")]
    Api { status: u16, message: String },
}
