//! Provider trait and chat types — the abstract completion capability.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 4096,
            temperature: 1.0,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Why a completion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    ToolUse,
    Other,
}

/// A non-streaming completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// One incremental event from a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental text content.
    TextDelta(String),
    /// The model invoked a tool with fully-assembled arguments.
    ToolUse {
        name: String,
        arguments: serde_json::Value,
    },
    /// The backend executed a tool and produced a result payload.
    ToolResult {
        name: String,
        result: serde_json::Value,
    },
    /// The turn completed.
    Done,
}

/// A finite stream of completion chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, LlmError>>;

/// Abstract completion backend: accepts a prompt and produces either a
/// materialized response or a chunk stream.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The model identifier this provider calls.
    fn model_name(&self) -> &str;

    /// Run a completion and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Run a completion and return incremental chunks as they arrive.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream, LlmError>;
}
