use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::index::{cosine_similarity, VectorIndex};
use crate::models::{Chunk, SearchResult, SourceSummary};

/// Chunks plus the dimension they were embedded with. Shared by the
/// in-memory and file-backed indexes; the latter snapshots it as JSON.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct IndexState {
    pub(crate) dimension: Option<usize>,
    #[serde(default)]
    pub(crate) pinned: bool,
    pub(crate) chunks: Vec<Chunk>,
}

impl IndexState {
    pub(crate) fn with_dimension(dimension: Option<usize>) -> Self {
        Self {
            dimension,
            pinned: dimension.is_some(),
            chunks: Vec::new(),
        }
    }

    fn check_dimension(&self, len: usize, what: &str) -> Result<()> {
        if let Some(expected) = self.dimension {
            if len != expected {
                bail!(
                    "{} embedding dimension mismatch: expected {}, got {}",
                    what,
                    expected,
                    len
                );
            }
        }
        Ok(())
    }

    pub(crate) fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        let Some(first) = chunks.first() else {
            return Ok(0);
        };
        let dimension = self.dimension.unwrap_or(first.embedding.len());
        if dimension == 0 {
            bail!("Cannot index chunks with empty embeddings");
        }

        // Validate the whole batch before touching the index.
        for chunk in &chunks {
            if chunk.embedding.len() != dimension {
                bail!(
                    "Chunk embedding dimension mismatch: expected {}, got {}",
                    dimension,
                    chunk.embedding.len()
                );
            }
        }

        self.dimension = Some(dimension);
        let added = chunks.len();
        self.chunks.extend(chunks);
        Ok(added)
    }

    pub(crate) fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(vec![]);
        }
        self.check_dimension(query.len(), "Query")?;

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(query, &chunk.embedding)))
            .collect();

        // Stable sort keeps insertion order between equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchResult::new(self.chunks[i].clone(), score))
            .collect())
    }

    pub(crate) fn sources(&self) -> Vec<SourceSummary> {
        let mut by_source: BTreeMap<&str, (usize, BTreeSet<u32>)> = BTreeMap::new();
        for chunk in &self.chunks {
            let entry = by_source.entry(chunk.source_file.as_str()).or_default();
            entry.0 += 1;
            entry.1.insert(chunk.page);
        }

        by_source
            .into_iter()
            .map(|(source_file, (chunks, pages))| SourceSummary {
                source_file: source_file.to_string(),
                chunks,
                pages: pages.len(),
            })
            .collect()
    }

    pub(crate) fn remove_source(&mut self, source_file: &str) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|chunk| chunk.source_file != source_file);
        before - self.chunks.len()
    }

    /// Removes `source_file` and adds `chunks` as one step. On error the
    /// state is left untouched.
    pub(crate) fn replace_source(&mut self, source_file: &str, chunks: Vec<Chunk>) -> Result<(usize, usize)> {
        let mut next = self.clone();
        let removed = next.remove_source(source_file);
        if next.chunks.is_empty() && !next.pinned {
            next.dimension = None;
        }
        let added = next.add(chunks)?;
        *self = next;
        Ok((removed, added))
    }

    pub(crate) fn clear(&mut self) {
        self.chunks.clear();
        if !self.pinned {
            self.dimension = None;
        }
    }
}

/// Brute-force cosine search over chunks held in process memory.
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index that only accepts vectors of `dimension` length.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            state: RwLock::new(IndexState::with_dimension(Some(dimension))),
        }
    }

    pub async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let added = self.state.write().await.add(chunks)?;
        debug!("Added {} chunks to in-memory index", added);
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
        Ok(self.state.write().await.remove_source(source_file))
    }

    async fn replace_source(&self, source_file: &str, chunks: Vec<Chunk>) -> Result<(usize, usize)> {
        let (removed, added) = self.state.write().await.replace_source(source_file, chunks)?;
        debug!(
            "Replaced {} chunks of {} with {}",
            removed, source_file, added
        );
        Ok((removed, added))
    }

    async fn clear(&self) -> Result<()> {
        self.state.write().await.clear();
        Ok(())
    }
}
