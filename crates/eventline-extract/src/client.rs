//! Calls the extraction model and tolerates its response-shape variance.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ExtractError, ExtractResult};

/// Outcome of a single (possibly retried) extraction call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub extractor_name: String,
    pub used_external_model: bool,
    pub model_name: String,
    pub response_id: Option<String>,
    pub latency_ms: u64,
    /// Number of retries *before* the successful attempt — zero on a
    /// first-try success.
    pub retries: u32,
    pub raw_text: String,
}

#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(&self, prompt: &str) -> ExtractResult<LlmResponse>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPayload {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: MessageContent,
}

/// Tolerates the two response shapes §4.2 requires: a flat string, or a
/// list of content blocks where each `text`-typed block contributes a
/// segment.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
}

/// Extract the model's generated text from a chat-completion-shaped JSON
/// payload's first choice, concatenating non-empty text segments when the
/// content arrived as a list of blocks.
fn extract_output_text(payload: &ChatCompletionPayload) -> Option<String> {
    let content = &payload.choices.first()?.message.content;
    match content {
        MessageContent::Text(s) => Some(s.clone()),
        MessageContent::Blocks(blocks) => {
            let joined: String = blocks
                .iter()
                .filter(|b| matches!(b.block_type.as_deref(), Some("text") | None))
                .filter_map(|b| b.text.as_deref())
                .filter(|t| !t.is_empty())
                .collect();
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
    }
}

pub struct OpenAiExtractionClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
}

const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

impl OpenAiExtractionClient {
    pub fn new(api_key: String, model: String, timeout_seconds: f64, max_retries: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model,
            base_url: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            max_retries,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn call_once(&self, prompt: &str) -> ExtractResult<ChatCompletionPayload> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractError::Provider(format!("{status}: {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        serde_json::from_value(payload).map_err(|e| ExtractError::Provider(e.to_string()))
    }
}

#[async_trait]
impl ExtractionClient for OpenAiExtractionClient {
    async fn extract(&self, prompt: &str) -> ExtractResult<LlmResponse> {
        let start = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            let outcome = match self.call_once(prompt).await {
                Ok(payload) => match extract_output_text(&payload) {
                    Some(raw_text) => Ok(LlmResponse {
                        extractor_name: "openai_chat_completions".to_string(),
                        used_external_model: true,
                        model_name: payload.model.unwrap_or_else(|| self.model.clone()),
                        response_id: payload.id,
                        latency_ms: start.elapsed().as_millis() as u64,
                        retries: attempt,
                        raw_text,
                    }),
                    None => Err(ExtractError::Provider("empty model response".to_string())),
                },
                Err(err) => Err(err),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(attempt, error = %err, "extraction attempt failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractError::Provider("no attempts made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_flat_string_content() {
        let payload: ChatCompletionPayload = serde_json::from_value(json!({
            "id": "resp_1",
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": "{\"a\":1}"}}]
        }))
        .unwrap();
        assert_eq!(extract_output_text(&payload), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extracts_from_content_block_list() {
        let payload: ChatCompletionPayload = serde_json::from_value(json!({
            "id": "resp_1",
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": [{"type": "text", "text": "{\"a\":1}"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_output_text(&payload), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn concatenates_multiple_text_blocks_skipping_empty_ones() {
        let payload: ChatCompletionPayload = serde_json::from_value(json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "part_one"},
                {"type": "text", "text": ""},
                {"type": "text", "text": "part_two"}
            ]}}]
        }))
        .unwrap();
        assert_eq!(extract_output_text(&payload), Some("part_onepart_two".to_string()));
    }

    #[test]
    fn non_text_blocks_are_skipped() {
        let payload: ChatCompletionPayload = serde_json::from_value(json!({
            "choices": [{"message": {"content": [
                {"type": "refusal", "text": "nope"},
                {"type": "text", "text": "kept"}
            ]}}]
        }))
        .unwrap();
        assert_eq!(extract_output_text(&payload), Some("kept".to_string()));
    }

    #[test]
    fn returns_none_when_no_choices() {
        let payload: ChatCompletionPayload = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(extract_output_text(&payload), None);
    }
}
