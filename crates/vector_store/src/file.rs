use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::index::VectorIndex;
use crate::memory::IndexState;
use crate::models::{Chunk, SearchResult, SourceSummary};

/// In-memory index persisted as a JSON snapshot after every mutation.
pub struct FileIndex {
    path: PathBuf,
    state: RwLock<IndexState>,
}

impl FileIndex {
    /// Opens the snapshot at `path`. A missing file means an empty index.
    pub async fn open(path: impl Into<PathBuf>, dimension: Option<usize>) -> Result<Self> {
        let path = path.into();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut state: IndexState = serde_json::from_slice(&bytes).with_context(|| {
                    format!("Failed to parse vector index snapshot {}", path.display())
                })?;
                if let Some(configured) = dimension {
                    if state.dimension.is_some_and(|d| d != configured) {
                        anyhow::bail!(
                            "Snapshot {} holds {}-dimensional vectors but {} were configured",
                            path.display(),
                            state.dimension.unwrap_or_default(),
                            configured
                        );
                    }
                    state.dimension = Some(configured);
                    state.pinned = true;
                }
                info!(
                    "Loaded {} chunks from vector index snapshot {}",
                    state.chunks.len(),
                    path.display()
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No vector index snapshot at {}, starting empty",
                    path.display()
                );
                IndexState::with_dimension(dimension)
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read vector index snapshot {}", path.display())
                })
            }
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &IndexState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let bytes = serde_json::to_vec(state).context("Failed to serialize vector index")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(
            "Persisted {} chunks to {}",
            state.chunks.len(),
            self.path.display()
        );
        Ok(())
    }
}

// Mutations run against a copy of the state, which replaces the live state
// only once the snapshot is on disk.
#[async_trait]
impl VectorIndex for FileIndex {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let added = next.add(chunks)?;
        if added > 0 {
            self.persist(&next).await?;
            *state = next;
        }
        Ok(added)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.state.read().await.search(query, k)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.chunks.len())
    }

    async fn sources(&self) -> Result<Vec<SourceSummary>> {
        Ok(self.state.read().await.sources())
    }

    async fn remove_source(&self, source_file: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let removed = next.remove_source(source_file);
        if removed > 0 {
            self.persist(&next).await?;
            *state = next;
        }
        Ok(removed)
    }

    async fn replace_source(&self, source_file: &str, chunks: Vec<Chunk>) -> Result<(usize, usize)> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let counts = next.replace_source(source_file, chunks)?;
        self.persist(&next).await?;
        *state = next;
        Ok(counts)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.clear();
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }
}
