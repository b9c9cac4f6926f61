use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A piece of a source document together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: Uuid,
    pub source_file: String,
    pub page: u32,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(
        source_file: impl Into<String>,
        page: u32,
        chunk_index: usize,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_file: source_file.into(),
            page,
            chunk_index,
            text: text.into(),
            embedding,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Cosine similarity to the query, in [-1, 1].
    pub score: f32,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

/// Per-document totals for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_file: String,
    pub chunks: usize,
    pub pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_chunk_with_uuid_and_timestamp() {
        let embedding = vec![0.1, 0.2, 0.3];
        let chunk = Chunk::new("handbook.pdf", 4, 2, "chunk content", embedding.clone());

        assert_eq!(chunk.source_file, "handbook.pdf");
        assert_eq!(chunk.page, 4);
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.text, "chunk content");
        assert_eq!(chunk.embedding, embedding);
        assert!(!chunk.id.is_nil());
        assert!(chunk.created_at <= Utc::now());
    }

    #[test]
    fn should_give_each_chunk_a_distinct_id() {
        let a = Chunk::new("a.pdf", 1, 0, "same", vec![1.0]);
        let b = Chunk::new("a.pdf", 1, 0, "same", vec![1.0]);

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn should_serialize_and_deserialize_chunk() {
        let chunk = Chunk::new("test.txt", 1, 0, "test content", vec![0.5, -0.5]);

        let json = serde_json::to_string(&chunk).unwrap();
        let deserialized: Chunk = serde_json::from_str(&json).unwrap();

        assert_eq!(chunk, deserialized);
    }

    #[test]
    fn should_create_search_result() {
        let chunk = Chunk::new("test.txt", 1, 0, "test content", vec![0.1]);

        let result = SearchResult::new(chunk.clone(), 0.95);

        assert_eq!(result.chunk, chunk);
        assert_eq!(result.score, 0.95);
    }
}
