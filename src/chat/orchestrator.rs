//! Top-level turn handling: classify, dispatch, fall back, title.
//!
//! `handle_turn` never returns an error: every failure mode inside the
//! pipeline degrades to a fixed user-facing answer. The only fatal
//! condition is a service that failed to initialize, which the web
//! layer reports before this code runs.

use std::sync::Arc;

use chrono::Utc;

use super::classifier::{QueryClassifier, RouteDecision};
use super::general::GeneralChatChain;
use super::outcome::ChainOutcome;
use super::rag_chain::RagChain;
use crate::core::config::AppConfig;
use crate::history::HistoryStore;
use crate::llm::{ChatMessage, GenerateRequest, GenerationConfig, LlmClient, LlmError};

pub const EMPTY_QUERY_REPLY: &str = "Please enter a query.";
pub const SAFETY_REPLY: &str =
    "I cannot provide a response to this query due to safety guidelines.";
pub const GENERIC_APOLOGY: &str =
    "Sorry, a processing error occurred while handling your request.";
pub const FALLBACK_APOLOGY: &str = "Sorry, I encountered an issue generating a response.";
pub const RAG_UNAVAILABLE_DISCLAIMER: &str =
    "(Note: I tried to search documents for this, but couldn't access them.)";

const TITLE_TEMPLATE: &str = "Summarize the main topic of this user message in 2-5 keywords or \
a very short phrase (e.g., 'VSCode Shortcuts', 'Project Inquiry', 'Document Search'). Keep it \
concise and relevant. User Message: '{message}'. Summary Title:";

/// The final answer for one turn, plus the generated title when this
/// was the first message of a session.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub answer: String,
    pub generated_title: Option<String>,
}

impl TurnReply {
    fn canned(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            generated_title: None,
        }
    }

    /// Canned error/safety answers are not worth persisting as part of
    /// the conversation.
    pub fn should_persist(&self) -> bool {
        !matches!(
            self.answer.as_str(),
            EMPTY_QUERY_REPLY | SAFETY_REPLY | GENERIC_APOLOGY
        )
    }
}

pub struct ChatService {
    client: Arc<dyn LlmClient>,
    classifier: QueryClassifier,
    general: GeneralChatChain,
    rag: Option<RagChain>,
    history: HistoryStore,
    history_limit: i64,
    classifier_history_limit: i64,
}

impl ChatService {
    pub fn new(
        client: Arc<dyn LlmClient>,
        history: HistoryStore,
        rag: Option<RagChain>,
        config: &AppConfig,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(client.clone()),
            general: GeneralChatChain::new(client.clone(), config.system_message.clone()),
            client,
            rag,
            history,
            history_limit: config.history_limit,
            classifier_history_limit: config.classifier_history_limit,
        }
    }

    pub fn rag_available(&self) -> bool {
        self.rag.is_some()
    }

    pub async fn handle_turn(&self, query: &str, session_id: &str) -> TurnReply {
        let query = query.trim();
        if query.is_empty() {
            tracing::warn!("[{}] Received empty user query", session_id);
            return TurnReply::canned(EMPTY_QUERY_REPLY);
        }

        // Title is generated before dispatch so it can be returned even
        // though persistence happens afterward. Two concurrent first
        // messages may both get here; last write wins on the title.
        let generated_title = self.title_for_first_message(session_id, query).await;

        match self.dispatch(query, session_id).await {
            Ok(answer) => TurnReply {
                answer,
                generated_title,
            },
            Err(LlmError::SafetyBlocked { reason }) => {
                tracing::warn!("[{}] Generation blocked by safety filter: {}", session_id, reason);
                TurnReply::canned(SAFETY_REPLY)
            }
            Err(err) => {
                tracing::error!("[{}] Critical error during turn handling: {}", session_id, err);
                TurnReply::canned(GENERIC_APOLOGY)
            }
        }
    }

    async fn dispatch(&self, query: &str, session_id: &str) -> Result<String, LlmError> {
        let short_history = self
            .load_history(session_id, self.classifier_history_limit)
            .await;
        let long_history = self.load_history(session_id, self.history_limit).await;

        let decision = self.classifier.classify(&short_history, query).await;
        tracing::info!("[{}] Router decision: {:?}", session_id, decision);

        let mut answer: Option<String> = None;

        if decision == RouteDecision::SearchDocs {
            match &self.rag {
                Some(rag) => match rag.answer_with_context(query).await? {
                    ChainOutcome::Answer(text) => answer = Some(text),
                    ChainOutcome::Failed(reason) => {
                        tracing::warn!(
                            "[{}] RAG chain failed ({}); falling back to general chat",
                            session_id,
                            reason
                        );
                    }
                },
                None => {
                    tracing::warn!(
                        "[{}] Router chose SEARCH_DOCS but retrieval is unavailable",
                        session_id
                    );
                    let text = match self
                        .general
                        .answer_conversationally(&long_history, query)
                        .await?
                    {
                        ChainOutcome::Answer(text) => text,
                        ChainOutcome::Failed(reason) => {
                            tracing::warn!("[{}] General chain failed: {}", session_id, reason);
                            FALLBACK_APOLOGY.to_string()
                        }
                    };
                    answer = Some(format!("{RAG_UNAVAILABLE_DISCLAIMER}\n\n{text}"));
                }
            }
        }

        let answer = match answer {
            Some(text) => text,
            None => match self
                .general
                .answer_conversationally(&long_history, query)
                .await?
            {
                ChainOutcome::Answer(text) => text,
                ChainOutcome::Failed(reason) => {
                    tracing::warn!("[{}] General chain failed: {}", session_id, reason);
                    FALLBACK_APOLOGY.to_string()
                }
            },
        };

        Ok(answer)
    }

    /// History loads degrade to an empty slice; a broken store never
    /// fails the turn.
    async fn load_history(&self, session_id: &str, limit: i64) -> Vec<ChatMessage> {
        match self.history.load_recent(session_id, limit).await {
            Ok(messages) => messages
                .into_iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            Err(err) => {
                tracing::error!("[{}] Failed to load history: {}", session_id, err);
                Vec::new()
            }
        }
    }

    async fn title_for_first_message(&self, session_id: &str, query: &str) -> Option<String> {
        let is_first = match self.history.count_prior_messages(session_id).await {
            Ok(count) => count == 0,
            Err(err) => {
                tracing::error!("[{}] First-message check failed: {}", session_id, err);
                false
            }
        };

        if !is_first {
            return None;
        }

        tracing::info!("[{}] First message; generating session title", session_id);
        let title = self.generate_title(query).await;
        match &title {
            Some(title) => tracing::info!("[{}] Generated title: '{}'", session_id, title),
            None => tracing::warn!("[{}] Title generation produced nothing", session_id),
        }
        title
    }

    /// Best-effort: one low-temperature call with a small token cap;
    /// any failure yields `None` and never blocks the turn.
    async fn generate_title(&self, first_message: &str) -> Option<String> {
        let prompt = TITLE_TEMPLATE.replace("{message}", first_message);
        let request = GenerateRequest::text(prompt).with_config(GenerationConfig {
            temperature: Some(0.2),
            max_output_tokens: Some(25),
            ..GenerationConfig::default()
        });

        let response = match self.client.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("Title generation call failed: {}", err);
                return None;
            }
        };

        let raw = response.text().ok()?;
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '"' && *c != '*')
            .collect();

        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    /// Persists one exchange. Write failures are logged and swallowed;
    /// a broken store degrades to a stateless conversation.
    pub async fn persist_exchange(
        &self,
        session_id: &str,
        user_message: &str,
        answer: &str,
        generated_title: Option<String>,
    ) {
        let now = Utc::now();
        let entries = [
            crate::history::NewMessage::new("user", user_message, now)
                .with_generated_title(generated_title),
            crate::history::NewMessage::new("model", answer, now),
        ];

        if let Err(err) = self.history.append(session_id, &entries).await {
            tracing::error!("[{}] Failed to save messages: {}", session_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use crate::llm::mock::MockLlmClient;
    use crate::llm::{GenerateResponse, LlmError};
    use crate::rag::{DocumentIndex, RetrievedChunk};
    use async_trait::async_trait;

    struct FixedIndex {
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl DocumentIndex for FixedIndex {
        async fn similarity_search(
            &self,
            _query: &str,
            k: usize,
        ) -> Result<Vec<RetrievedChunk>, ApiError> {
            Ok(self.chunks.iter().take(k).cloned().collect())
        }

        async fn count(&self) -> Result<usize, ApiError> {
            Ok(self.chunks.len())
        }
    }

    async fn test_history() -> HistoryStore {
        let tmp = std::env::temp_dir().join(format!(
            "docchat-orchestrator-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        HistoryStore::new(tmp).await.unwrap()
    }

    fn service(
        client: Arc<MockLlmClient>,
        history: HistoryStore,
        rag: Option<RagChain>,
    ) -> ChatService {
        ChatService::new(client, history, rag, &AppConfig::default())
    }

    fn rag_chain(client: Arc<MockLlmClient>, chunks: Vec<RetrievedChunk>) -> RagChain {
        RagChain::new(Arc::new(FixedIndex { chunks }), client, 5)
    }

    fn chunk(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            source: "doc.pdf".to_string(),
            score: 0.9,
        }
    }

    async fn seed_session(history: &HistoryStore, session_id: &str) {
        history
            .append(
                session_id,
                &[
                    crate::history::NewMessage::new("user", "earlier question", Utc::now()),
                    crate::history::NewMessage::new("model", "earlier answer", Utc::now()),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_query_short_circuits_with_zero_model_calls() {
        let client = Arc::new(MockLlmClient::new());
        let chat = service(client.clone(), test_history().await, None);

        let reply = chat.handle_turn("   ", "s1").await;
        assert_eq!(reply.answer, EMPTY_QUERY_REPLY);
        assert!(reply.generated_title.is_none());
        assert_eq!(client.call_count(), 0);
        assert!(!reply.should_persist());
    }

    #[tokio::test]
    async fn first_message_gets_a_title_and_second_does_not() {
        let history = test_history().await;
        let client = Arc::new(MockLlmClient::with_texts(vec![
            "\"Trip Planning\"", // title
            "GENERAL_CHAT",      // classifier
            "Happy to help!",    // general chain
        ]));
        let chat = service(client.clone(), history.clone(), None);

        let reply = chat.handle_turn("help me plan a trip", "s1").await;
        assert_eq!(reply.answer, "Happy to help!");
        assert_eq!(reply.generated_title.as_deref(), Some("Trip Planning"));

        chat.persist_exchange("s1", "help me plan a trip", &reply.answer, reply.generated_title)
            .await;

        let client2 = Arc::new(MockLlmClient::with_texts(vec![
            "GENERAL_CHAT",
            "Of course.",
        ]));
        let chat2 = service(client2, history, None);
        let reply2 = chat2.handle_turn("and a hotel?", "s1").await;
        assert_eq!(reply2.answer, "Of course.");
        assert!(reply2.generated_title.is_none());
    }

    #[tokio::test]
    async fn title_generation_failure_is_non_fatal() {
        let client = Arc::new(MockLlmClient::with_replies(vec![
            Err(LlmError::Transport("timeout".to_string())), // title
            Ok(GenerateResponse::with_text("GENERAL_CHAT")),
            Ok(GenerateResponse::with_text("Hello!")),
        ]));
        let chat = service(client, test_history().await, None);

        let reply = chat.handle_turn("hi", "fresh").await;
        assert_eq!(reply.answer, "Hello!");
        assert!(reply.generated_title.is_none());
    }

    #[tokio::test]
    async fn search_docs_with_retrieval_available_uses_rag_answer() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_texts(vec![
            "SEARCH_DOCS",
            "Refunds take 14 days.",
        ]));
        let rag = rag_chain(client.clone(), vec![chunk("Refunds take 14 days.")]);
        let chat = service(client, history, Some(rag));

        let reply = chat.handle_turn("What is the refund policy?", "s1").await;
        assert_eq!(reply.answer, "Refunds take 14 days.");
        assert!(reply.generated_title.is_none());
    }

    #[tokio::test]
    async fn rag_failure_falls_back_to_general_chat() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_replies(vec![
            Ok(GenerateResponse::with_text("SEARCH_DOCS")),
            Err(LlmError::Api {
                status: 500,
                message: "overloaded".to_string(),
            }), // RAG generation
            Ok(GenerateResponse::with_text("General fallback answer")),
        ]));
        let rag = rag_chain(client.clone(), vec![chunk("some context")]);
        let chat = service(client, history, Some(rag));

        let reply = chat.handle_turn("What does the manual say?", "s1").await;
        assert_eq!(reply.answer, "General fallback answer");
        assert!(!reply.answer.starts_with("Error:"));
    }

    #[tokio::test]
    async fn search_docs_without_retrieval_prepends_disclaimer() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_texts(vec![
            "SEARCH_DOCS",
            "Here is what I know from memory.",
        ]));
        let chat = service(client, history, None);

        let reply = chat.handle_turn("What are the criteria?", "s1").await;
        assert!(reply.answer.starts_with(RAG_UNAVAILABLE_DISCLAIMER));
        assert!(reply.answer.contains("Here is what I know from memory."));
        assert!(!reply.answer.contains("Error:"));
    }

    #[tokio::test]
    async fn disclaimer_path_never_surfaces_an_error_marker() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_replies(vec![
            Ok(GenerateResponse::with_text("SEARCH_DOCS")),
            Err(LlmError::Transport("down".to_string())), // general chain
        ]));
        let chat = service(client, history, None);

        let reply = chat.handle_turn("What are the criteria?", "s1").await;
        assert!(reply.answer.starts_with(RAG_UNAVAILABLE_DISCLAIMER));
        assert!(!reply.answer.contains("Error:"));
        assert!(reply.answer.contains(FALLBACK_APOLOGY));
    }

    #[tokio::test]
    async fn safety_block_yields_fixed_safety_answer() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_replies(vec![
            Ok(GenerateResponse::with_text("GENERAL_CHAT")),
            Err(LlmError::SafetyBlocked {
                reason: "prompt blocked".to_string(),
            }),
        ]));
        let chat = service(client, history, None);

        let reply = chat.handle_turn("something borderline", "s1").await;
        assert_eq!(reply.answer, SAFETY_REPLY);
        assert!(reply.generated_title.is_none());
        assert!(!reply.should_persist());
    }

    #[tokio::test]
    async fn general_chain_soft_failure_substitutes_apology() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_replies(vec![
            Ok(GenerateResponse::with_text("GENERAL_CHAT")),
            Ok(GenerateResponse {
                candidates: vec![],
                prompt_feedback: None,
            }),
        ]));
        let chat = service(client, history, None);

        let reply = chat.handle_turn("hello", "s1").await;
        assert_eq!(reply.answer, FALLBACK_APOLOGY);
    }

    #[tokio::test]
    async fn ambiguous_classification_routes_to_general_chat() {
        let history = test_history().await;
        seed_session(&history, "s1").await;

        let client = Arc::new(MockLlmClient::with_texts(vec![
            "maybe docs? maybe not?",
            "General answer",
        ]));
        // RAG is available, but the ambiguous decision must not reach it.
        let rag = rag_chain(client.clone(), vec![chunk("context")]);
        let chat = service(client.clone(), history, Some(rag));

        let reply = chat.handle_turn("hmm", "s1").await;
        assert_eq!(reply.answer, "General answer");
        // classifier + general chain only
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn persist_exchange_stores_both_roles_with_title() {
        let history = test_history().await;
        let client = Arc::new(MockLlmClient::new());
        let chat = service(client, history.clone(), None);

        chat.persist_exchange("s1", "question", "answer", Some("Title".to_string()))
            .await;

        let messages = history.load_recent("s1", 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "model");
        assert_eq!(history.list_sessions().await.unwrap()[0].title, "Title");
    }
}
