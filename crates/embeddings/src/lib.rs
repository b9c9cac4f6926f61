pub mod chunker;
pub mod cohere;
pub mod fallback;
pub mod openai;

pub use chunker::{ChunkConfig, TextChunk, TextChunker};
pub use cohere::{CohereClient, CohereConfig};
pub use fallback::FallbackEmbeddingProvider;
pub use openai::{OpenAiEmbeddingClient, OpenAiEmbeddingConfig};
pub use rag_core::config::EmbeddingConfig;

use anyhow::Result;
use tracing::{info, warn};

type EmbedFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>>;
type EmbedQueryFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + 'a>>;

pub trait EmbeddingProvider: Send + Sync {
    /// Embeds document passages, one vector per input text.
    fn embed(&self, texts: Vec<String>) -> EmbedFuture<'_>;

    /// Embeds a search query. Providers with asymmetric models override this.
    fn embed_query(&self, text: String) -> EmbedQueryFuture<'_> {
        Box::pin(async move {
            self.embed(vec![text])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("No embedding generated for query"))
        })
    }

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

impl EmbeddingProvider for OpenAiEmbeddingClient {
    fn embed(&self, texts: Vec<String>) -> EmbedFuture<'_> {
        Box::pin(self.embed(texts))
    }
    fn dimension(&self) -> usize {
        self.embedding_dimension()
    }
    fn name(&self) -> &str {
        "openai"
    }
}

impl EmbeddingProvider for CohereClient {
    fn embed(&self, texts: Vec<String>) -> EmbedFuture<'_> {
        Box::pin(self.embed(texts))
    }
    fn embed_query(&self, text: String) -> EmbedQueryFuture<'_> {
        Box::pin(self.embed_query(text))
    }
    fn dimension(&self) -> usize {
        self.embedding_dimension()
    }
    fn name(&self) -> &str {
        "cohere"
    }
}

impl EmbeddingProvider for FallbackEmbeddingProvider {
    fn embed(&self, texts: Vec<String>) -> EmbedFuture<'_> {
        Box::pin(self.embed(texts))
    }
    fn dimension(&self) -> usize {
        self.embedding_dimension()
    }
    fn name(&self) -> &str {
        "fallback"
    }
}

pub fn create_embedding_provider(cfg: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match cfg.provider.as_str() {
        "openai" => {
            let mut openai_cfg = OpenAiEmbeddingConfig {
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                dimensions: cfg.dimensions,
                ..OpenAiEmbeddingConfig::default()
            };
            if let Some(model) = &cfg.model {
                openai_cfg.model = model.clone();
            }
            if let Some(base_url) = cfg
                .base_url
                .clone()
                .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            {
                openai_cfg.base_url = base_url;
            }
            if openai_cfg.api_key.is_empty() {
                warn!("OPENAI_API_KEY is not set; embedding requests will be rejected");
            }
            info!("Using OpenAI embeddings with model {}", openai_cfg.model);
            Ok(Box::new(OpenAiEmbeddingClient::new(openai_cfg)?))
        }
        "cohere" => {
            let mut cohere_cfg = CohereConfig {
                api_key: std::env::var("COHERE_API_KEY").unwrap_or_default(),
                dimensions: cfg.dimensions,
                ..CohereConfig::default()
            };
            if let Some(model) = &cfg.model {
                cohere_cfg.model = model.clone();
            }
            if let Some(base_url) = &cfg.base_url {
                cohere_cfg.base_url = base_url.clone();
            }
            info!("Using Cohere embeddings with model {}", cohere_cfg.model);
            Ok(Box::new(CohereClient::new(cohere_cfg)?))
        }
        other => {
            warn!(
                "Embedding provider '{}' is not a hosted provider, using offline fallback embeddings",
                other
            );
            let dim = cfg
                .dimensions
                .unwrap_or(FallbackEmbeddingProvider::STANDARD_DIMENSION);
            Ok(Box::new(FallbackEmbeddingProvider::new(dim)))
        }
    }
}
