use std::sync::Arc;

use crate::chat::{ChatService, RagChain};
use crate::core::config::{AppConfig, AppPaths};
use crate::history::HistoryStore;
use crate::llm::{GeminiClient, LlmClient};
use crate::rag::{DocumentIndex, SqliteDocumentIndex};

/// Shared application state. The chat service is `None` when the model
/// backend could not be configured; handlers answer 503 in that case
/// while the history endpoints stay usable.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub history: HistoryStore,
    pub chat: Option<Arc<ChatService>>,
    pub init_error: Option<String>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths);

        let history = HistoryStore::new(paths.history_db_path.clone()).await?;

        let (chat, init_error) = if config.api_key.is_empty() {
            let message = "GEMINI_API_KEY is not set; chat is disabled".to_string();
            tracing::error!("{}", message);
            (None, Some(message))
        } else {
            let client: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(&config));
            let rag = build_rag_chain(&paths, &config, client.clone()).await;
            let service = ChatService::new(client, history.clone(), rag, &config);
            (Some(Arc::new(service)), None)
        };

        Ok(Arc::new(AppState {
            paths,
            config,
            history,
            chat,
            init_error,
        }))
    }
}

/// Retrieval is optional. A missing or empty index disables document
/// search for the lifetime of the process; the router then falls back
/// to general chat with a disclaimer.
async fn build_rag_chain(
    paths: &AppPaths,
    config: &AppConfig,
    client: Arc<dyn LlmClient>,
) -> Option<RagChain> {
    let index = match SqliteDocumentIndex::new(paths.index_db_path.clone(), client.clone()).await {
        Ok(index) => index,
        Err(err) => {
            tracing::warn!("Document index unavailable ({}); RAG is disabled", err);
            return None;
        }
    };

    match index.count().await {
        Ok(0) => {
            tracing::warn!("Document index is empty; RAG is disabled");
            None
        }
        Ok(count) => {
            tracing::info!("Document index ready with {} chunks", count);
            Some(RagChain::new(Arc::new(index), client, config.retrieval_k))
        }
        Err(err) => {
            tracing::warn!("Could not inspect document index ({}); RAG is disabled", err);
            None
        }
    }
}
