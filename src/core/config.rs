//! Application paths and configuration.
//!
//! Configuration is layered: built-in defaults, an optional `config.toml`
//! in the data directory, then environment variables for secrets and
//! deployment-specific tunables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_SESSION_TITLE: &str = "Untitled Chat";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub history_db_path: PathBuf,
    pub index_db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let log_dir = data_dir.join("logs");
        let history_db_path = data_dir.join("chat_history.db");
        let index_db_path = data_dir.join("doc_index.db");
        let config_path = data_dir.join("config.toml");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            history_db_path,
            index_db_path,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOCCHAT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

/// Sampling parameters forwarded to the model on every generation call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub max_output_tokens: i64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Gemini API key. Only sensible to set via `GEMINI_API_KEY`.
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    /// Messages handed to the general chat chain as context.
    pub history_limit: i64,
    /// Messages rendered into the classifier prompt.
    pub classifier_history_limit: i64,
    /// Chunks retrieved per RAG invocation.
    pub retrieval_k: usize,
    pub system_message: String,
    pub generation: GenerationDefaults,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            history_limit: 10,
            classifier_history_limit: 4,
            retrieval_k: 5,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            generation: GenerationDefaults::default(),
            port: 8000,
        }
    }
}

const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful, friendly assistant for answering \
questions and general conversation. Be concise and accurate. If you are unsure, say so. \
Always respond in the same language as the user.";

impl AppConfig {
    /// Loads configuration from `config.toml` (if present) and applies
    /// environment overrides. A malformed file is logged and ignored.
    pub fn load(paths: &AppPaths) -> Self {
        let mut config = read_config_file(&paths.config_path).unwrap_or_default();

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            config.api_key = key;
        }
        if let Ok(model) = env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Ok(model) = env::var("GEMINI_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(limit) = env::var("CHAT_HISTORY_LIMIT") {
            if let Ok(parsed) = limit.parse() {
                config.history_limit = parsed;
            }
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(parsed) = port.parse() {
                config.port = parsed;
            }
        }

        config
    }
}

fn read_config_file(path: &Path) -> Option<AppConfig> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str(&raw) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!("Ignoring malformed {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = AppConfig::default();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.classifier_history_limit, 4);
        assert_eq!(config.retrieval_k, 5);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_limit = 20\nmodel = \"gemini-1.5-pro\"\n").unwrap();

        let config = read_config_file(&path).unwrap();
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.model, "gemini-1.5-pro");
        // Untouched fields keep their defaults
        assert_eq!(config.retrieval_k, 5);
    }

    #[test]
    fn malformed_config_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_limit = [not toml").unwrap();

        assert!(read_config_file(&path).is_none());
    }
}
