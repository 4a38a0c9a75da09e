//! Gemini REST client (`generateContent` / `embedContent`).

use reqwest::Client;
use serde_json::{json, Value};

use async_trait::async_trait;

use super::client::LlmClient;
use super::types::{
    Candidate, ChatMessage, GenerateRequest, GenerateResponse, GenerationConfig, LlmError, Prompt,
    PromptFeedback,
};
use crate::core::config::{AppConfig, GenerationDefaults};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    defaults: GenerationDefaults,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(config: &AppConfig, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            defaults: config.generation.clone(),
            client: Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn embed_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:embedContent?key={}",
            self.base_url, self.embedding_model, self.api_key
        )
    }

    fn build_body(&self, request: &GenerateRequest) -> Value {
        let contents = match &request.prompt {
            Prompt::Text(text) => vec![content_part("user", text)],
            Prompt::Messages(messages) => messages
                .iter()
                .map(|m| content_part(&m.role, &m.content))
                .collect(),
        };

        let config = request
            .config
            .clone()
            .unwrap_or_else(|| GenerationConfig::from(&self.defaults));

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config_json(&config),
            "safetySettings": safety_settings(),
        });

        if let Some(instruction) = &request.system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }

        body
    }
}

fn content_part(role: &str, text: &str) -> Value {
    json!({ "role": role, "parts": [{ "text": text }] })
}

fn generation_config_json(config: &GenerationConfig) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(v) = config.temperature {
        out.insert("temperature".to_string(), json!(v));
    }
    if let Some(v) = config.top_p {
        out.insert("topP".to_string(), json!(v));
    }
    if let Some(v) = config.top_k {
        out.insert("topK".to_string(), json!(v));
    }
    if let Some(v) = config.max_output_tokens {
        out.insert("maxOutputTokens".to_string(), json!(v));
    }
    Value::Object(out)
}

fn safety_settings() -> Value {
    json!([
        { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_ONLY_HIGH" },
        { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
        { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
        { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
    ])
}

fn parse_response(payload: &Value) -> GenerateResponse {
    let candidates = payload["candidates"]
        .as_array()
        .map(|list| {
            list.iter()
                .map(|candidate| {
                    let text = candidate["content"]["parts"]
                        .as_array()
                        .map(|parts| {
                            parts
                                .iter()
                                .filter_map(|part| part["text"].as_str())
                                .collect::<Vec<_>>()
                                .join("")
                        })
                        .filter(|joined| !joined.is_empty());

                    Candidate {
                        content: text,
                        finish_reason: candidate["finishReason"].as_str().map(String::from),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let prompt_feedback = payload.get("promptFeedback").map(|feedback| PromptFeedback {
        block_reason: feedback["blockReason"].as_str().map(String::from),
    });

    GenerateResponse {
        candidates,
        prompt_feedback,
    }
}

fn error_from_status(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect());

    // The API rejects some prompts outright with a safety error instead
    // of returning an empty candidate list.
    let lowered = message.to_lowercase();
    if lowered.contains("safety") || lowered.contains("blocked") {
        return LlmError::SafetyBlocked { reason: message };
    }

    LlmError::Api { status, message }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = self.build_body(&request);

        let res = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &text));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(parse_response(&payload))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({ "content": { "parts": [{ "text": text }] } });

        let res = self
            .client
            .post(self.embed_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &text));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let values = payload["embedding"]["values"]
            .as_array()
            .map(|vals| {
                vals.iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect::<Vec<f32>>()
            })
            .unwrap_or_default();

        if values.is_empty() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: "embedding response contained no values".to_string(),
            });
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candidates_and_feedback() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] },
                "finishReason": "STOP"
            }],
            "promptFeedback": { "blockReason": null }
        });

        let response = parse_response(&payload);
        assert_eq!(response.text().unwrap(), "Hello world");
    }

    #[test]
    fn empty_payload_yields_no_candidates() {
        let response = parse_response(&json!({}));
        assert!(response.candidates.is_empty());
        assert!(response.text().is_err());
    }

    #[test]
    fn safety_errors_map_to_safety_blocked() {
        let body = r#"{"error": {"message": "Request blocked for SAFETY reasons", "status": "INVALID_ARGUMENT"}}"#;
        match error_from_status(400, body) {
            LlmError::SafetyBlocked { reason } => assert!(reason.contains("SAFETY")),
            other => panic!("expected SafetyBlocked, got {other:?}"),
        }
    }

    #[test]
    fn other_errors_map_to_api_error() {
        let body = r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        match error_from_status(400, body) {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("API key"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }
}
