//! Anthropic Messages API provider over reqwest.

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::LlmError;

use super::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    StreamChunk,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicProvider {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (tests point this at a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the Messages API request body. System messages are pulled out
    /// into the top-level `system` field.
    fn request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut system = String::new();
        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&msg.content);
                }
                Role::User => messages.push(json!({"role": "user", "content": msg.content})),
                Role::Assistant => {
                    messages.push(json!({"role": "assistant", "content": msg.content}))
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(request, stream))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                provider: "anthropic".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(response)
    }
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::MaxTokens,
        Some("tool_use") => FinishReason::ToolUse,
        _ => FinishReason::Other,
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self.send(&request, false).await?;
        let data: serde_json::Value =
            response.json().await.map_err(|e| LlmError::MalformedResponse {
                provider: "anthropic".to_string(),
                reason: e.to_string(),
            })?;

        let content = data["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .ok_or_else(|| LlmError::MalformedResponse {
                provider: "anthropic".to_string(),
                reason: "no text content block".to_string(),
            })?
            .to_string();

        Ok(CompletionResponse {
            content,
            input_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
            finish_reason: parse_finish_reason(data["stop_reason"].as_str()),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream, LlmError> {
        let response = self.send(&request, true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamChunk, LlmError>>(32);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buf = String::new();
            // Tool-use blocks arrive as a start event plus partial JSON
            // deltas; assembled and emitted on block stop.
            let mut tool_name: Option<String> = None;
            let mut tool_json = String::new();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmError::RequestFailed {
                                provider: "anthropic".to_string(),
                                reason: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };

                    match event["type"].as_str() {
                        Some("content_block_start") => {
                            if event["content_block"]["type"] == "tool_use" {
                                tool_name = event["content_block"]["name"]
                                    .as_str()
                                    .map(String::from);
                                tool_json.clear();
                            }
                        }
                        Some("content_block_delta") => match event["delta"]["type"].as_str() {
                            Some("text_delta") => {
                                if let Some(text) = event["delta"]["text"].as_str() {
                                    if tx
                                        .send(Ok(StreamChunk::TextDelta(text.to_string())))
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                            }
                            Some("input_json_delta") => {
                                if let Some(partial) = event["delta"]["partial_json"].as_str() {
                                    tool_json.push_str(partial);
                                }
                            }
                            _ => {}
                        },
                        Some("content_block_stop") => {
                            if let Some(name) = tool_name.take() {
                                let arguments = serde_json::from_str(&tool_json)
                                    .unwrap_or(serde_json::Value::Null);
                                if tx
                                    .send(Ok(StreamChunk::ToolUse { name, arguments }))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        Some("message_stop") => {
                            let _ = tx.send(Ok(StreamChunk::Done)).await;
                            return;
                        }
                        Some("error") => {
                            let reason = event["error"]["message"]
                                .as_str()
                                .unwrap_or("unknown stream error")
                                .to_string();
                            let _ = tx
                                .send(Err(LlmError::RequestFailed {
                                    provider: "anthropic".to_string(),
                                    reason,
                                }))
                                .await;
                            return;
                        }
                        _ => {}
                    }
                }
            }
            // Transport ended without message_stop; still close the turn.
            let _ = tx.send(Ok(StreamChunk::Done)).await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
