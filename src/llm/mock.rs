//! Scripted [`LlmClient`] for chain and orchestrator tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::LlmClient;
use super::types::{GenerateRequest, GenerateResponse, LlmError};

#[derive(Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<GenerateResponse, LlmError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    embedding: Vec<f32>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            embedding: vec![1.0, 0.0, 0.0],
            ..Default::default()
        }
    }

    /// Replies are returned in order; once exhausted, every call gets a
    /// plain "OK" response.
    pub fn with_replies(replies: Vec<Result<GenerateResponse, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            embedding: vec![1.0, 0.0, 0.0],
        }
    }

    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self::with_replies(
            texts
                .into_iter()
                .map(|t| Ok(GenerateResponse::with_text(t)))
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GenerateResponse::with_text("OK")))
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embedding.clone())
    }
}
