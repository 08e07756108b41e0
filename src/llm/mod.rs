//! LLM integration for Questline.
//!
//! The completion backend is abstract: `LlmProvider` accepts a prompt and
//! produces either a materialized response or a chunk stream. The shipped
//! implementation talks to the Anthropic Messages API over reqwest.

mod anthropic;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use provider::{
    ChatMessage, ChunkStream, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    Role, StreamChunk,
};

use std::sync::Arc;

use crate::config::ServiceConfig;

/// Create the LLM provider from service configuration.
pub fn create_provider(config: &ServiceConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using Anthropic (model: {})", config.model);
    Arc::new(AnthropicProvider::new(
        config.api_key.clone(),
        config.model.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_uses_configured_model() {
        let config = ServiceConfig {
            model: "claude-3-5-haiku-latest".to_string(),
            ..Default::default()
        };
        let provider = create_provider(&config);
        assert_eq!(provider.model_name(), "claude-3-5-haiku-latest");
    }
}
