//! Retrieval-augmented answer chain.
//!
//! A RAG turn is single-shot and stateless across turns: the grounding
//! context dominates over conversational memory, so no history is sent.

use std::sync::Arc;

use super::outcome::ChainOutcome;
use crate::llm::{GenerateRequest, LlmClient, LlmError};
use crate::rag::{DocumentIndex, RetrievedChunk};

const NO_CONTEXT_SENTINEL: &str = "No relevant context found in documents.";

const RAG_TEMPLATE: &str = "Answer the following question using the provided context. Try to \
base your answer directly on the information found.
If the context clearly doesn't contain the information needed to answer, state that the \
provided documents do not seem to contain the answer.
***Importantly, present the answer in the same language as the QUESTION is asked.***

CONTEXT:
{context}

QUESTION:
{question}

ANSWER:";

pub struct RagChain {
    index: Arc<dyn DocumentIndex>,
    client: Arc<dyn LlmClient>,
    top_k: usize,
}

impl RagChain {
    pub fn new(index: Arc<dyn DocumentIndex>, client: Arc<dyn LlmClient>, top_k: usize) -> Self {
        Self {
            index,
            client,
            top_k,
        }
    }

    /// Retrieves supporting passages and asks the model to answer
    /// strictly from them. Retrieval and generation problems surface as
    /// `ChainOutcome::Failed`, never as a panic or plain error; only a
    /// provider safety block propagates.
    pub async fn answer_with_context(&self, query: &str) -> Result<ChainOutcome, LlmError> {
        let chunks = match self.index.similarity_search(query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(err) => {
                tracing::warn!("[RAG] Retrieval failed: {}", err);
                return Ok(ChainOutcome::Failed(format!("retrieval failed: {err}")));
            }
        };

        if chunks.is_empty() {
            tracing::warn!("[RAG] Retriever returned no chunks for the query");
        } else {
            tracing::debug!("[RAG] Retrieved {} chunks", chunks.len());
        }

        let context = format_chunks(&chunks);
        let prompt = RAG_TEMPLATE
            .replace("{context}", &context)
            .replace("{question}", query);

        ChainOutcome::from_generation(self.client.generate(GenerateRequest::text(prompt)).await)
    }
}

fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "--- Context from: {} (Chunk {}) ---\n{}",
                chunk.source,
                i + 1,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
