use crate::llm::{GenerateResponse, LlmError, ResponseIssue};

/// Result of one chain invocation. Soft failures are values, not
/// errors, so the orchestrator can fall back without unwinding; only a
/// provider-level safety block propagates as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Answer(String),
    Failed(String),
}

impl ChainOutcome {
    /// Maps a raw generation result onto the outcome taxonomy:
    /// no-candidate and early-stop responses, as well as transport/API
    /// errors, become `Failed`; a safety block passes through.
    pub fn from_generation(
        result: Result<GenerateResponse, LlmError>,
    ) -> Result<Self, LlmError> {
        match result {
            Ok(response) => Ok(match response.text() {
                Ok(text) => ChainOutcome::Answer(text),
                Err(ResponseIssue::NoCandidates { block_reason }) => {
                    ChainOutcome::Failed(match block_reason {
                        Some(reason) => format!(
                            "response blocked due to safety settings (reason: {reason})"
                        ),
                        None => "model returned no response".to_string(),
                    })
                }
                Err(ResponseIssue::StoppedEarly { finish_reason }) => ChainOutcome::Failed(
                    format!("response generation stopped prematurely (reason: {finish_reason})"),
                ),
            }),
            Err(LlmError::SafetyBlocked { reason }) => Err(LlmError::SafetyBlocked { reason }),
            Err(other) => Ok(ChainOutcome::Failed(other.to_string())),
        }
    }

    /// Compatibility rendering for contexts that want a flat string.
    /// The `Error:` prefix matches what older clients pattern-match on.
    pub fn into_text(self) -> String {
        match self {
            ChainOutcome::Answer(text) => text,
            ChainOutcome::Failed(reason) => format!("Error: {reason}"),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChainOutcome::Failed(_))
    }
}
