use crate::models::{ChatMessage, ChatRole, ModelConfig, StreamEvent};
use crate::{ChatProvider, EventStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::{
    operation::converse_stream::ConverseStreamOutput,
    types::{
        ContentBlock, ContentBlockDelta, ConversationRole,
        ConverseStreamOutput as ConverseStreamOutputType, InferenceConfiguration, Message,
        SystemContentBlock,
    },
    Client,
};
use log::{error, info, warn};
use std::time::Duration;

/// Chat client for AWS Bedrock's Converse streaming API.
pub struct BedrockChatClient {
    client: Client,
    config: ModelConfig,
}

impl BedrockChatClient {
    pub async fn new(config: ModelConfig) -> Result<Self> {
        info!("Initializing BedrockChatClient");
        let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let client = Client::new(&aws_config);

        Ok(Self { client, config })
    }

    pub async fn new_with_region(config: ModelConfig, region: &str) -> Result<Self> {
        info!("Initializing BedrockChatClient in region {}", region);
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        let client = Client::new(&aws_config);

        Ok(Self { client, config })
    }

    async fn try_converse(&self, messages: &[ChatMessage], model: &str) -> Result<EventStream> {
        let (system, bedrock_messages) = convert_to_bedrock_messages(messages)?;

        info!("Sending request to Bedrock model: {}", model);
        let response = self
            .client
            .converse_stream()
            .model_id(model)
            .inference_config(
                InferenceConfiguration::builder()
                    .max_tokens(self.config.max_tokens as i32)
                    .temperature(self.config.temperature)
                    .build(),
            )
            .set_system(if system.is_empty() {
                None
            } else {
                Some(system)
            })
            .set_messages(Some(bedrock_messages))
            .send()
            .await
            .map_err(|e| {
                error!("Bedrock send error: {:?}", e);
                anyhow::anyhow!("Failed to send request to Bedrock: {}", e)
            })?;

        info!("Received response from Bedrock model: {}", model);

        Ok(Box::pin(process_bedrock_stream(response)))
    }
}

#[async_trait]
impl ChatProvider for BedrockChatClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<EventStream> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.config.max_retries {
            let model = if attempt == 0 {
                &self.config.primary_model
            } else {
                &self.config.fallback_model
            };

            match self.try_converse(&messages, model).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!("Bedrock request to {} failed: {:#}", model, e);
                    last_error = Some(e);
                    attempt += 1;

                    if attempt <= self.config.max_retries {
                        let delay = Duration::from_millis(1000 * (2_u64.pow(attempt - 1)));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Bedrock request failed")))
    }

    fn model_name(&self) -> &str {
        &self.config.primary_model
    }
}

fn process_bedrock_stream(
    response: ConverseStreamOutput,
) -> impl futures::Stream<Item = Result<StreamEvent>> + Send + 'static {
    let mut stream = response.stream;

    async_stream::stream! {
        loop {
            match stream.recv().await {
                Ok(Some(stream_event)) => match stream_event {
                    ConverseStreamOutputType::MessageStart(_) => {
                        yield Ok(StreamEvent::MessageStart);
                    }
                    ConverseStreamOutputType::ContentBlockStart(_) => {
                        yield Ok(StreamEvent::ContentBlockStart);
                    }
                    ConverseStreamOutputType::ContentBlockDelta(delta) => {
                        if let Some(ContentBlockDelta::Text(text)) = delta.delta() {
                            yield Ok(StreamEvent::ContentBlockDelta { text: text.clone() });
                        }
                    }
                    ConverseStreamOutputType::ContentBlockStop(_) => {
                        yield Ok(StreamEvent::ContentBlockStop);
                    }
                    ConverseStreamOutputType::MessageStop(_) => {
                        yield Ok(StreamEvent::MessageStop);
                        break;
                    }
                    // Metadata and future event kinds carry no text.
                    _ => {}
                },
                Ok(None) => break,
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    break;
                }
            }
        }
    }
}

/// Splits system prompts out into Bedrock system blocks and maps the rest
/// to conversation messages.
fn convert_to_bedrock_messages(
    messages: &[ChatMessage],
) -> Result<(Vec<SystemContentBlock>, Vec<Message>)> {
    let mut system = Vec::new();
    let mut bedrock_messages = Vec::new();

    for msg in messages {
        let role = match msg.role {
            ChatRole::System => {
                system.push(SystemContentBlock::Text(msg.content.clone()));
                continue;
            }
            ChatRole::User => ConversationRole::User,
            ChatRole::Assistant => ConversationRole::Assistant,
        };

        let bedrock_message = Message::builder()
            .role(role)
            .content(ContentBlock::Text(msg.content.clone()))
            .build()
            .context("Failed to build Bedrock message")?;

        bedrock_messages.push(bedrock_message);
    }

    Ok((system, bedrock_messages))
}
