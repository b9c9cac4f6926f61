use crate::errors::RagError;
use crate::models::{Answer, DocumentsResponse, HistoryResponse, IngestReport, RemovedResponse, SourceRef};
use crate::prompt::build_messages;
use crate::sse::{
    create_error_event, create_session_event, create_sources_event,
    create_stream_end_event, create_streaming_content_event,
};
use anyhow::{Context, Result};
use axum::response::sse::Event;
use documents::DocumentLoader;
use embeddings::{create_embedding_provider, ChunkConfig, EmbeddingProvider, TextChunker};
use futures::{Stream, StreamExt};
use llm::{create_chat_provider, ChatMessage, ChatProvider, StreamEvent};
use log::{debug, info, warn};
use rag_core::{Config, ConversationMessage, ConversationStore};
use std::convert::Infallible;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;
use vector_store::{open_session_store, open_vector_index, Chunk, SearchResult, VectorIndex};

pub type SseEventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub struct RagService {
    config: Config,
    loader: DocumentLoader,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    sessions: Arc<dyn ConversationStore>,
    llm: Arc<dyn ChatProvider>,
}

impl std::fmt::Debug for RagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("config", &self.config)
            .field("embedder", &self.embedder.name())
            .field("llm", &self.llm.model_name())
            .finish_non_exhaustive()
    }
}

/// Everything needed to call the model for one question.
struct PreparedQuery {
    session_id: Uuid,
    question: String,
    results: Vec<SearchResult>,
    messages: Vec<ChatMessage>,
}

impl RagService {
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate().map_err(RagError::from)?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(
            create_embedding_provider(&config.embedding)
                .context("Failed to create embedding provider")?,
        );

        // Unless configured, the first insert fixes the index dimension.
        let index = open_vector_index(
            &config.vector_store.with_env_overrides(),
            config.embedding.dimensions,
        )
        .await
        .context("Failed to open vector index")?;

        let sessions = open_session_store(&config.session.with_env_overrides())
            .await
            .context("Failed to open session store")?;

        let llm: Arc<dyn ChatProvider> = Arc::from(
            create_chat_provider(&config.llm.with_env_overrides())
                .await
                .context("Failed to create chat provider")?,
        );

        info!(
            "RAG service ready: embeddings via {} ({} dims), chat model {}",
            embedder.name(),
            embedder.dimension(),
            llm.model_name()
        );

        Ok(Self::with_components(config, embedder, index, sessions, llm))
    }

    // Dependency-injection friendly constructor for testing and composition
    pub fn with_components(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        sessions: Arc<dyn ConversationStore>,
        llm: Arc<dyn ChatProvider>,
    ) -> Self {
        let chunker = TextChunker::new(ChunkConfig::from(&config.chunking));
        Self {
            config,
            loader: DocumentLoader::new(),
            chunker,
            embedder,
            index,
            sessions,
            llm,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parses, chunks, embeds and indexes one document. Chunks from an
    /// earlier upload under the same name are replaced.
    pub async fn ingest_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<IngestReport, RagError> {
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| RagError::Validation(format!("invalid file name '{}'", file_name)))?
            .to_string();

        let document = self.loader.load_bytes(&file_name, bytes).await?;

        let text_chunks: Vec<_> = document
            .pages
            .iter()
            .flat_map(|page| self.chunker.chunk_page(page.number, &page.text))
            .collect();
        debug!(
            "Split {} ({} pages) into {} chunks",
            file_name,
            document.page_count(),
            text_chunks.len()
        );

        let mut embeddings = Vec::with_capacity(text_chunks.len());
        for batch in text_chunks.chunks(self.config.embedding.batch_size().max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self
                .embedder
                .embed(texts)
                .await
                .map_err(RagError::embedding)?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        let chunks: Vec<Chunk> = text_chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, embedding))| {
                Chunk::new(file_name.as_str(), chunk.page, i, chunk.content, embedding)
            })
            .collect();

        let (replaced, added) = self
            .index
            .replace_source(&file_name, chunks)
            .await
            .map_err(RagError::vector_store)?;
        if replaced > 0 {
            info!("Replaced {} existing chunks of {}", replaced, file_name);
        }

        info!(
            "Ingested {}: {} pages, {} chunks",
            file_name,
            document.page_count(),
            added
        );

        Ok(IngestReport {
            file_name,
            pages: document.page_count(),
            chunks: added,
        })
    }

    /// Ingests every supported file in the configured document directory and
    /// returns how many were indexed.
    pub async fn load_documents(&self) -> Result<usize> {
        let documents_dir = Path::new(&self.config.data.document_dir);

        if !documents_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Documents directory does not exist: {}",
                self.config.data.document_dir
            ));
        }

        let mut dir_entries = tokio::fs::read_dir(documents_dir)
            .await
            .context("Failed to read documents directory")?;

        let mut paths = Vec::new();
        while let Some(entry) = dir_entries
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let path = entry.path();
            let supported = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(DocumentLoader::is_supported)
                .unwrap_or(false);
            if path.is_file() && supported {
                paths.push(path);
            } else {
                debug!("Skipping {}", path.display());
            }
        }
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            match self.ingest_bytes(&file_name, bytes).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Skipping {}: {}", file_name, e),
            }
        }

        info!(
            "Loaded {} documents from {}",
            loaded, self.config.data.document_dir
        );
        Ok(loaded)
    }

    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<SearchResult>, RagError> {
        let query = self
            .embedder
            .embed_query(question.to_string())
            .await
            .map_err(RagError::embedding)?;

        self.index
            .search(&query, k)
            .await
            .map_err(RagError::vector_store)
    }

    async fn prepare(
        &self,
        session_id: Option<Uuid>,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<PreparedQuery, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question must not be empty".to_string()));
        }
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be greater than zero".to_string()));
        }

        let session_id = session_id.unwrap_or_else(Uuid::new_v4);
        let results = self.retrieve(question, top_k).await?;
        let history = self
            .sessions
            .history(&session_id)
            .await
            .map_err(RagError::session)?;

        debug!(
            "Session {}: {} retrieved chunks, {} history messages",
            session_id,
            results.len(),
            history.len()
        );

        let messages = build_messages(
            question,
            &history,
            &results,
            self.config.retrieval.max_context_chars,
        );

        Ok(PreparedQuery {
            session_id,
            question: question.to_string(),
            results,
            messages,
        })
    }

    async fn record_exchange(&self, session_id: &Uuid, question: &str, answer: &str) -> Result<(), RagError> {
        self.sessions
            .append(session_id, ConversationMessage::user(question))
            .await
            .map_err(RagError::session)?;
        self.sessions
            .append(session_id, ConversationMessage::assistant(answer))
            .await
            .map_err(RagError::session)
    }

    pub async fn answer(
        &self,
        session_id: Option<Uuid>,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Answer, RagError> {
        let prepared = self.prepare(session_id, question, top_k).await?;

        let answer = self
            .llm
            .complete(prepared.messages)
            .await
            .map_err(RagError::llm)?;

        self.record_exchange(&prepared.session_id, &prepared.question, &answer)
            .await?;

        Ok(Answer {
            session_id: prepared.session_id,
            answer,
            sources: prepared.results.iter().map(SourceRef::from).collect(),
        })
    }

    /// Validation and retrieval failures are returned before any event is
    /// sent; model failures become an `error_event` inside the stream.
    pub async fn answer_stream(
        self: Arc<Self>,
        session_id: Option<Uuid>,
        question: String,
        top_k: Option<usize>,
    ) -> Result<SseEventStream, RagError> {
        let prepared = self.prepare(session_id, &question, top_k).await?;
        let sources: Vec<SourceRef> = prepared.results.iter().map(SourceRef::from).collect();
        let service = self;

        let stream = async_stream::stream! {
            yield Ok(create_session_event(&prepared.session_id));
            yield Ok(create_sources_event(&sources));

            let mut llm_stream = match service.llm.stream(prepared.messages).await {
                Ok(stream) => stream,
                Err(e) => {
                    yield Ok(create_error_event(&RagError::llm(e)));
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(event) = llm_stream.next().await {
                match event {
                    Ok(StreamEvent::ContentBlockDelta { text }) => {
                        if !text.is_empty() {
                            answer.push_str(&text);
                            yield Ok(create_streaming_content_event(&text));
                        }
                    }
                    Ok(StreamEvent::MessageStop) => break,
                    Ok(StreamEvent::Error { message }) => {
                        yield Ok(create_error_event(&RagError::Llm(message)));
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        yield Ok(create_error_event(&RagError::llm(e)));
                        return;
                    }
                }
            }

            if let Err(e) = service
                .record_exchange(&prepared.session_id, &prepared.question, &answer)
                .await
            {
                yield Ok(create_error_event(&e));
                return;
            }

            yield Ok(create_stream_end_event());
        };

        Ok(Box::pin(stream))
    }

    pub async fn history(&self, session_id: Uuid) -> Result<HistoryResponse, RagError> {
        let messages = self
            .sessions
            .history(&session_id)
            .await
            .map_err(RagError::session)?;
        Ok(HistoryResponse {
            session_id,
            messages,
        })
    }

    pub async fn reset_session(&self, session_id: Uuid) -> Result<(), RagError> {
        let deleted = self
            .sessions
            .delete(&session_id)
            .await
            .map_err(RagError::session)?;
        if !deleted {
            return Err(RagError::NotFound(format!("session {}", session_id)));
        }
        info!("Reset session {}", session_id);
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<usize, RagError> {
        self.sessions
            .purge_expired()
            .await
            .map_err(RagError::session)
    }

    pub async fn documents(&self) -> Result<DocumentsResponse, RagError> {
        let documents = self.index.sources().await.map_err(RagError::vector_store)?;
        let total_chunks = self.index.len().await.map_err(RagError::vector_store)?;
        Ok(DocumentsResponse {
            documents,
            total_chunks,
        })
    }

    pub async fn remove_document(&self, file_name: &str) -> Result<RemovedResponse, RagError> {
        let removed_chunks = self
            .index
            .remove_source(file_name)
            .await
            .map_err(RagError::vector_store)?;
        if removed_chunks == 0 {
            return Err(RagError::NotFound(format!("document {}", file_name)));
        }
        info!("Removed {} chunks of {}", removed_chunks, file_name);
        Ok(RemovedResponse {
            file_name: file_name.to_string(),
            removed_chunks,
        })
    }

    /// Empties the index and returns how many chunks it held.
    pub async fn clear_documents(&self) -> Result<usize, RagError> {
        let count = self.index.len().await.map_err(RagError::vector_store)?;
        self.index.clear().await.map_err(RagError::vector_store)?;
        info!("Cleared {} chunks from the index", count);
        Ok(count)
    }
}
