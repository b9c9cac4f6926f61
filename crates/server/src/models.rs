use rag_core::ConversationMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vector_store::{SearchResult, SourceSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// A retrieved chunk cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_file: String,
    pub page: u32,
    pub chunk_index: usize,
    pub score: f32,
    pub excerpt: String,
}

const EXCERPT_CHARS: usize = 200;

impl From<&SearchResult> for SourceRef {
    fn from(result: &SearchResult) -> Self {
        Self {
            source_file: result.chunk.source_file.clone(),
            page: result.chunk.page,
            chunk_index: result.chunk.chunk_index,
            score: result.score,
            excerpt: result.chunk.text.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub session_id: Uuid,
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub file_name: String,
    pub pages: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub documents: Vec<SourceSummary>,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub file_name: String,
    pub removed_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub messages: Vec<ConversationMessage>,
}
