use crate::models::{ChatMessage, ModelConfig, StreamEvent};
use crate::{ChatProvider, EventStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatClient {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// One parsed line of a streamed chat completion.
#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, event names and blank separators carry no content.
        return Ok(SseLine::Skip);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    let payload: ChunkPayload =
        serde_json::from_str(data).context("Failed to parse chat completion chunk")?;
    if let Some(err) = payload.error {
        return Err(anyhow::anyhow!("Chat completion stream error: {}", err.message));
    }

    let text: String = payload
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();

    if text.is_empty() {
        Ok(SseLine::Skip)
    } else {
        Ok(SseLine::Content(text))
    }
}

impl OpenAiChatClient {
    pub fn new(config: ModelConfig, api_key: String, base_url: String) -> Result<Self> {
        info!("Initializing OpenAiChatClient for {}", base_url);
        // No total timeout: it would also cut off long streamed answers.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn try_open_stream(&self, messages: &[ChatMessage], model: &str) -> Result<EventStream> {
        let request = ChatRequest {
            model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let idle_timeout = Duration::from_secs(self.config.timeout_secs);

        info!("Sending request to chat model: {}", model);
        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();
        let response = tokio::time::timeout(idle_timeout, send)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Chat completions API did not respond within {}s",
                    idle_timeout.as_secs()
                )
            })?
            .context("Failed to send request to chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat completions API returned {}: {}", status, error_text);
            return Err(anyhow::anyhow!(
                "Chat completions API returned error {}: {}",
                status,
                error_text
            ));
        }

        let mut bytes = Box::pin(response.bytes_stream());

        Ok(Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::MessageStart);
            yield Ok(StreamEvent::ContentBlockStart);

            let mut buffer: Vec<u8> = Vec::new();
            let mut done = false;

            'read: loop {
                let chunk = match tokio::time::timeout(idle_timeout, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => {
                        yield Err(anyhow::anyhow!("Stream error: {}", e));
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        yield Err(anyhow::anyhow!(
                            "Chat completions stream stalled for {}s",
                            idle_timeout.as_secs()
                        ));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        Ok(SseLine::Content(text)) => {
                            yield Ok(StreamEvent::ContentBlockDelta { text });
                        }
                        Ok(SseLine::Done) => {
                            done = true;
                            break 'read;
                        }
                        Ok(SseLine::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if !done {
                match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    Ok(SseLine::Content(text)) => {
                        yield Ok(StreamEvent::ContentBlockDelta { text });
                    }
                    Ok(SseLine::Done) => {
                        done = true;
                    }
                    _ => {}
                }
            }
            if !done {
                yield Err(anyhow::anyhow!("Chat completions stream ended before [DONE]"));
                return;
            }

            yield Ok(StreamEvent::ContentBlockStop);
            yield Ok(StreamEvent::MessageStop);
        }))
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<EventStream> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.config.max_retries {
            let model = if attempt == 0 {
                &self.config.primary_model
            } else {
                &self.config.fallback_model
            };

            match self.try_open_stream(&messages, model).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!("Chat request to {} failed: {:#}", model, e);
                    last_error = Some(e);
                    attempt += 1;

                    if attempt <= self.config.max_retries {
                        let delay = Duration::from_millis(1000 * (2_u64.pow(attempt - 1)));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Chat request failed")))
    }

    fn model_name(&self) -> &str {
        &self.config.primary_model
    }
}
