use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CohereConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Width of the returned vectors, when known up front.
    pub dimensions: Option<usize>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CohereConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "embed-english-v3.0".to_string(),
            base_url: "https://api.cohere.ai".to_string(),
            dimensions: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Cohere v3 models embed passages and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    SearchDocument,
    SearchQuery,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    texts: Vec<String>,
    model: String,
    input_type: InputType,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct CohereClient {
    config: CohereConfig,
    client: Client,
}

impl CohereClient {
    pub fn new(config: CohereConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Configured width, otherwise the published width of the model family.
    pub fn embedding_dimension(&self) -> usize {
        match self.config.dimensions {
            Some(dimensions) => dimensions,
            None if self.config.model.contains("light") => 384,
            None => 1024,
        }
    }

    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.embed_with_type(texts, InputType::SearchDocument).await
    }

    pub async fn embed_query(&self, text: String) -> Result<Vec<f32>> {
        self.embed_with_type(vec![text], InputType::SearchQuery)
            .await?
            .into_iter()
            .next()
            .context("Cohere API returned no embedding for query")
    }

    async fn embed_with_type(
        &self,
        texts: Vec<String>,
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.try_embed(&texts, input_type).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    warn!("Cohere embedding attempt {} failed: {:#}", attempt + 1, e);
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = Duration::from_millis(1000 * (2_u64.pow(attempt)));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Cohere embedding failed")))
    }

    async fn try_embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            texts: texts.to_vec(),
            model: self.config.model.clone(),
            input_type,
        };

        debug!("Requesting {} Cohere embeddings", texts.len());

        let response = self
            .client
            .post(format!("{}/v1/embed", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Cohere API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Cohere API returned error {}: {}",
                status,
                error_text
            ));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse Cohere API response")?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Cohere API returned {} embeddings for {} texts",
                embed_response.embeddings.len(),
                texts.len()
            ));
        }

        Ok(embed_response.embeddings)
    }
}
