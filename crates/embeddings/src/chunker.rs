use serde::Serialize;

/// A text chunk with its position inside the page it came from.
/// `start_pos` and `end_pos` are character offsets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    pub content: String,
    pub start_pos: usize,
    pub end_pos: usize,
    pub chunk_id: usize,
    pub page: u32,
}

/// Configuration for text chunking, in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap_size: 200,
        }
    }
}

impl From<&rag_core::config::ChunkingConfig> for ChunkConfig {
    fn from(cfg: &rag_core::config::ChunkingConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            overlap_size: cfg.overlap,
        }
    }
}

/// Splits text into fixed-size character windows that overlap.
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        self.chunk_page(1, text)
    }

    pub fn chunk_page(&self, page: u32, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.overlap_size.min(size - 1);

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let mut end = (start + size).min(total);

            // Prefer ending on whitespace if it keeps at least half a window.
            if end < total {
                if let Some(ws) = (start + 1..end).rev().find(|&i| chars[i].is_whitespace()) {
                    if ws > start + size / 2 {
                        end = ws;
                    }
                }
            }

            let content: String = chars[start..end].iter().collect();
            let content = content.trim();
            if !content.is_empty() {
                chunks.push(TextChunk {
                    content: content.to_string(),
                    start_pos: start,
                    end_pos: end,
                    chunk_id: chunks.len(),
                    page,
                });
            }

            if end >= total {
                break;
            }

            let mut next = end.saturating_sub(overlap);
            if next <= start {
                next = end;
            }
            // Start the next window on a word boundary.
            while next < end && !chars[next - 1].is_whitespace() {
                next += 1;
            }
            start = next;
        }

        chunks
    }

    /// Simple token approximation: split by whitespace
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
