//! General conversation chain: persona instruction + history + query,
//! sent as a role-tagged message sequence so the model can track
//! speaker turns.

use std::sync::Arc;

use super::outcome::ChainOutcome;
use crate::llm::{ChatMessage, GenerateRequest, LlmClient, LlmError};

pub struct GeneralChatChain {
    client: Arc<dyn LlmClient>,
    system_instruction: String,
}

impl GeneralChatChain {
    pub fn new(client: Arc<dyn LlmClient>, system_instruction: String) -> Self {
        if !system_instruction
            .to_lowercase()
            .contains("respond in the same language")
        {
            tracing::warn!("System message may be missing the language instruction");
        }

        Self {
            client,
            system_instruction,
        }
    }

    pub async fn answer_conversationally(
        &self,
        history: &[ChatMessage],
        query: &str,
    ) -> Result<ChainOutcome, LlmError> {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .cloned()
            .collect();

        let query = query.trim();
        if !query.is_empty() {
            messages.push(ChatMessage::user(query));
        }

        if messages.is_empty() {
            tracing::error!("Cannot generate response: no usable messages after filtering");
            return Ok(ChainOutcome::Failed(
                "cannot generate response without valid input message(s)".to_string(),
            ));
        }

        let request = GenerateRequest::messages(messages)
            .with_system_instruction(self.system_instruction.clone());

        ChainOutcome::from_generation(self.client.generate(request).await)
    }
}
