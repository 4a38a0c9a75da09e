//! Routes each query to document search or general conversation.

use std::sync::Arc;

use crate::llm::{ChatMessage, GenerateRequest, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    SearchDocs,
    GeneralChat,
}

const CLASSIFIER_TEMPLATE: &str = "Classify the user's query. Your goal is to decide if the \
query requires searching specific documents for a factual answer.

Output only 'SEARCH_DOCS' if the query asks for specific factual details, definitions, steps, \
criteria, data, or information likely found within uploaded documents (such as educational \
standards, curriculum details, project specifications, user guides, procedures, reports). \
Examples of queries needing SEARCH_DOCS: \"What are the criteria for X?\", \"List the steps \
for Y.\", \"Define Z according to the standard document.\", \"What does document A say about \
topic B?\".

Otherwise, output 'GENERAL_CHAT'. This includes greetings, casual conversation, questions \
about your capabilities, opinions, summarization requests (unless about specific document \
content), or broadly defined topics not referencing specific document details. Examples of \
queries needing GENERAL_CHAT: \"Hello\", \"What can you do?\", \"What is your opinion on X?\".

Chat History:
{chat_history}

User Query: {query}
Classification:";

pub struct QueryClassifier {
    client: Arc<dyn LlmClient>,
}

impl QueryClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// One model call; anything other than a clear SEARCH_DOCS answer
    /// (including transport errors and empty output) resolves to
    /// GeneralChat. Classification never fails.
    pub async fn classify(&self, recent_history: &[ChatMessage], query: &str) -> RouteDecision {
        let history_lines = recent_history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = CLASSIFIER_TEMPLATE
            .replace("{chat_history}", &history_lines)
            .replace("{query}", query);

        let raw = match self.client.generate(GenerateRequest::text(prompt)).await {
            Ok(response) => match response.text() {
                Ok(text) => text,
                Err(issue) => {
                    tracing::warn!("Classifier got unusable response: {:?}", issue);
                    return RouteDecision::GeneralChat;
                }
            },
            Err(err) => {
                tracing::warn!("Classifier call failed: {}; defaulting to general chat", err);
                return RouteDecision::GeneralChat;
            }
        };

        parse_decision(&raw)
    }
}

fn parse_decision(raw: &str) -> RouteDecision {
    let cleaned = raw.trim().to_uppercase();
    if cleaned.contains("SEARCH_DOCS") {
        RouteDecision::SearchDocs
    } else if cleaned.contains("GENERAL_CHAT") {
        RouteDecision::GeneralChat
    } else {
        tracing::warn!(
            "Classifier output uncertain ('{}'); defaulting to GENERAL_CHAT",
            cleaned.chars().take(60).collect::<String>()
        );
        RouteDecision::GeneralChat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::llm::{GenerateResponse, LlmError, Prompt};

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("hello"),
            ChatMessage::model("hi, how can I help?"),
        ]
    }

    #[tokio::test]
    async fn recognizes_search_docs() {
        let client = Arc::new(MockLlmClient::with_texts(vec!["SEARCH_DOCS"]));
        let classifier = QueryClassifier::new(client);
        let decision = classifier.classify(&history(), "What is the refund policy?").await;
        assert_eq!(decision, RouteDecision::SearchDocs);
    }

    #[tokio::test]
    async fn tolerates_decorated_output() {
        let client = Arc::new(MockLlmClient::with_texts(vec![" search_docs\n"]));
        let classifier = QueryClassifier::new(client);
        let decision = classifier.classify(&[], "List the steps").await;
        assert_eq!(decision, RouteDecision::SearchDocs);
    }

    #[tokio::test]
    async fn ambiguous_output_defaults_to_general_chat() {
        let client = Arc::new(MockLlmClient::with_texts(vec!["I'm not sure about this one"]));
        let classifier = QueryClassifier::new(client);
        let decision = classifier.classify(&[], "hmm").await;
        assert_eq!(decision, RouteDecision::GeneralChat);
    }

    #[tokio::test]
    async fn model_error_defaults_to_general_chat() {
        let client = Arc::new(MockLlmClient::with_replies(vec![Err(LlmError::Transport(
            "connection refused".to_string(),
        ))]));
        let classifier = QueryClassifier::new(client);
        let decision = classifier.classify(&[], "anything").await;
        assert_eq!(decision, RouteDecision::GeneralChat);
    }

    #[tokio::test]
    async fn empty_response_defaults_to_general_chat() {
        let client = Arc::new(MockLlmClient::with_replies(vec![Ok(GenerateResponse {
            candidates: vec![],
            prompt_feedback: None,
        })]));
        let classifier = QueryClassifier::new(client);
        let decision = classifier.classify(&[], "anything").await;
        assert_eq!(decision, RouteDecision::GeneralChat);
    }

    #[tokio::test]
    async fn prompt_embeds_history_and_query() {
        let client = Arc::new(MockLlmClient::with_texts(vec!["GENERAL_CHAT"]));
        let classifier = QueryClassifier::new(client.clone());
        classifier.classify(&history(), "what can you do?").await;

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let Prompt::Text(prompt) = &requests[0].prompt else {
            panic!("classifier must send a flat prompt");
        };
        assert!(prompt.contains("user: hello"));
        assert!(prompt.contains("model: hi, how can I help?"));
        assert!(prompt.contains("User Query: what can you do?"));
    }
}
