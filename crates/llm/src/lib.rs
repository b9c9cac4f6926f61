pub mod bedrock;
pub mod models;
pub mod openai;

pub use bedrock::BedrockChatClient;
pub use models::{ChatMessage, ChatRole, ModelConfig, StreamEvent};
pub use openai::OpenAiChatClient;

use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{info, warn};
use rag_core::config::LlmConfig;
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Starts a streamed completion. Retries and model fallback happen
    /// before the first event is returned.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<EventStream>;

    /// Runs a completion to the end and returns the concatenated text.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut stream = self.stream(messages).await?;
        let mut answer = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::ContentBlockDelta { text } => answer.push_str(&text),
                StreamEvent::Error { message } => {
                    return Err(anyhow::anyhow!("LLM stream error: {}", message))
                }
                _ => {}
            }
        }

        Ok(answer)
    }

    fn model_name(&self) -> &str;
}

pub async fn create_chat_provider(cfg: &LlmConfig) -> Result<Box<dyn ChatProvider>> {
    let model_config = ModelConfig::from(cfg);

    match cfg.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
            if api_key.is_empty() {
                warn!("OPENAI_API_KEY is not set; chat requests will be rejected");
            }
            let base_url = cfg
                .base_url
                .clone()
                .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string());
            info!(
                "Using OpenAI-compatible chat model {} (fallback {})",
                model_config.primary_model, model_config.fallback_model
            );
            Ok(Box::new(OpenAiChatClient::new(
                model_config,
                api_key,
                base_url,
            )?))
        }
        "bedrock" => {
            info!(
                "Using Bedrock chat model {} (fallback {})",
                model_config.primary_model, model_config.fallback_model
            );
            let client = match &cfg.aws_region {
                Some(region) => BedrockChatClient::new_with_region(model_config, region).await?,
                None => BedrockChatClient::new(model_config).await?,
            };
            Ok(Box::new(client))
        }
        other => Err(anyhow::anyhow!("Unknown LLM provider '{}'", other)),
    }
}
