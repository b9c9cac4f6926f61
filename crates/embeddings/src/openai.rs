use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Requested output size. Only the text-embedding-3 family honours it.
    pub dimensions: Option<usize>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            dimensions: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingClient {
    config: OpenAiEmbeddingConfig,
    client: Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn embedding_dimension(&self) -> usize {
        if let Some(dim) = self.config.dimensions {
            return dim;
        }
        match self.config.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.try_embed(&texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    warn!("OpenAI embedding attempt {} failed: {:#}", attempt + 1, e);
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = Duration::from_millis(1000 * (2_u64.pow(attempt)));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("OpenAI embedding failed")))
    }

    async fn try_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };

        debug!(
            "Requesting {} embeddings from {} with model {}",
            texts.len(),
            self.config.base_url,
            self.config.model
        );

        let response = self
            .client
            .post(format!(
                "{}/embeddings",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI embeddings API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "OpenAI embeddings API returned error {}: {}",
                status,
                error_text
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI embeddings response")?;

        order_by_index(body.data, texts.len())
    }
}

/// The API may return items out of order; results must line up with inputs.
fn order_by_index(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(anyhow::anyhow!(
            "OpenAI embeddings API returned {} embeddings for {} texts",
            data.len(),
            expected
        ));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in data {
        let slot = slots
            .get_mut(item.index)
            .with_context(|| format!("Embedding index {} out of range", item.index))?;
        *slot = Some(item.embedding);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.with_context(|| format!("Missing embedding for input {}", i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use tokio_test::assert_err;

    async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client_for(base_url: String, dimensions: Option<usize>) -> OpenAiEmbeddingClient {
        OpenAiEmbeddingClient::new(OpenAiEmbeddingConfig {
            api_key: "sk-test".to_string(), // pragma: allowlist secret
            base_url,
            dimensions,
            max_retries: 0,
            ..OpenAiEmbeddingConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn should_report_dimension_for_known_models() {
        let small = client_for("http://localhost".to_string(), None);
        assert_eq!(small.embedding_dimension(), 1536);

        let large = OpenAiEmbeddingClient::new(OpenAiEmbeddingConfig {
            model: "text-embedding-3-large".to_string(),
            ..OpenAiEmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(large.embedding_dimension(), 3072);

        let custom = client_for("http://localhost".to_string(), Some(256));
        assert_eq!(custom.embedding_dimension(), 256);
    }

    #[test]
    fn should_omit_dimensions_when_not_configured() {
        let input = vec!["hello".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
            dimensions: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"][0], "hello");
    }

    #[test]
    fn should_reorder_embeddings_by_index() {
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: vec![2.0],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![1.0],
            },
        ];

        let ordered = order_by_index(data, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn should_reject_out_of_range_index() {
        let data = vec![EmbeddingData {
            index: 3,
            embedding: vec![1.0],
        }];

        assert!(order_by_index(data, 1).is_err());
    }

    #[tokio::test]
    async fn should_return_empty_embeddings_for_empty_input() {
        let client = client_for("http://127.0.0.1:1".to_string(), None);
        assert!(client.embed(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_embed_against_compatible_server() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["dimensions"], 2);
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                let data: Vec<Value> = inputs
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(i, _)| json!({ "index": i, "embedding": [i as f32, 1.0] }))
                    .collect();
                Json(json!({ "object": "list", "data": data }))
            }),
        );
        let client = client_for(spawn_mock(router).await, Some(2));

        let result = client
            .embed(vec!["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]]
        );
    }

    #[tokio::test]
    async fn should_surface_api_errors() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "bad key" } })),
                )
            }),
        );
        let client = client_for(spawn_mock(router).await, None);

        let err = assert_err!(client.embed(vec!["a".to_string()]).await);

        assert!(err.to_string().contains("401"));
    }
}
