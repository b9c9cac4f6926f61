pub mod file;
pub mod index;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod session_store;
pub mod store;

pub use file::FileIndex;
pub use index::{cosine_similarity, VectorIndex};
pub use memory::InMemoryIndex;
pub use migrations::run_migrations;
pub use models::{Chunk, SearchResult, SourceSummary};
pub use session_store::RedisSessionStore;
pub use store::PgVectorStore;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rag_core::config::{SessionBackend, SessionConfig, VectorBackend, VectorStoreConfig};
use rag_core::{ConversationStore, InMemorySessionStore};

/// Opens the configured vector index. `dimension`, when known, pins the
/// accepted embedding length.
pub async fn open_vector_index(
    cfg: &VectorStoreConfig,
    dimension: Option<usize>,
) -> Result<Arc<dyn VectorIndex>> {
    match cfg.backend {
        VectorBackend::Memory => {
            tracing::info!("Using in-memory vector index");
            Ok(match dimension {
                Some(dim) => Arc::new(InMemoryIndex::with_dimension(dim)),
                None => Arc::new(InMemoryIndex::new()),
            })
        }
        VectorBackend::File => {
            let path = cfg
                .path
                .as_deref()
                .context("vector_store.path is required for the file backend")?;
            tracing::info!("Using file-backed vector index at {}", path);
            Ok(Arc::new(FileIndex::open(path, dimension).await?))
        }
        VectorBackend::Pgvector => {
            let url = cfg
                .url
                .as_deref()
                .context("vector_store.url is required for the pgvector backend")?;
            tracing::info!("Using PostgreSQL pgvector index");
            Ok(Arc::new(
                PgVectorStore::connect_with_dimensions(url, dimension).await?,
            ))
        }
    }
}

/// Opens the configured conversation store.
pub async fn open_session_store(cfg: &SessionConfig) -> Result<Arc<dyn ConversationStore>> {
    let ttl = cfg.ttl_seconds.map(Duration::from_secs);
    match cfg.backend {
        SessionBackend::Memory => {
            tracing::info!(
                "Using in-memory session store (history limit {})",
                cfg.history_limit
            );
            let store = InMemorySessionStore::new(cfg.history_limit);
            Ok(match ttl {
                Some(ttl) => Arc::new(store.with_ttl(ttl)),
                None => Arc::new(store),
            })
        }
        SessionBackend::Redis => {
            let url = cfg
                .redis_url
                .as_deref()
                .context("session.redis_url is required for the redis backend")?;
            Ok(Arc::new(
                RedisSessionStore::connect(url, cfg.history_limit, ttl).await?,
            ))
        }
    }
}
