use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, SearchResult, SourceSummary};

/// Storage and nearest-neighbour lookup for embedded chunks.
///
/// Every backend fixes its embedding dimension on the first insert (or up
/// front when configured) and rejects vectors of any other length.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stores the chunks and returns how many were added.
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Returns at most `k` results ordered by descending score.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn sources(&self) -> Result<Vec<SourceSummary>>;

    /// Deletes every chunk of `source_file` and returns how many were removed.
    async fn remove_source(&self, source_file: &str) -> Result<usize>;

    /// Swaps every chunk of `source_file` for `chunks` and returns
    /// `(removed, added)`. When the new chunks are rejected the old ones stay.
    ///
    /// The default runs two separate calls; backends override it to make the
    /// swap atomic.
    async fn replace_source(&self, source_file: &str, chunks: Vec<Chunk>) -> Result<(usize, usize)> {
        let removed = self.remove_source(source_file).await?;
        let added = self.add(chunks).await?;
        Ok((removed, added))
    }

    async fn clear(&self) -> Result<()>;
}

/// Cosine similarity in [-1, 1]. Zero vectors and mismatched lengths score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_score_identical_vectors_as_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn should_score_orthogonal_vectors_as_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn should_score_opposite_vectors_as_minus_one() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn should_ignore_magnitude() {
        let sim = cosine_similarity(&[1.0, 1.0], &[10.0, 10.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn should_return_zero_for_zero_vector_or_length_mismatch() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
