use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use documents::DocumentError;
use rag_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("LLM service error: {0}")]
    Llm(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Session management error: {0}")]
    Session(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Unsupported document: {0}")]
    UnsupportedDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl RagError {
    /// Returns the appropriate HTTP status code for this error
    pub fn http_status_code(&self) -> u16 {
        match self {
            RagError::Embedding(_) => 500,
            RagError::Llm(_) => 503, // Service Unavailable (can retry)
            RagError::VectorStore(_) => 500,
            RagError::Session(_) => 500,
            RagError::Document(_) => 422, // parsed but unusable
            RagError::UnsupportedDocument(_) => 415,
            RagError::Config(_) => 500,
            RagError::Validation(_) => 400,
            RagError::NotFound(_) => 404,
        }
    }

    /// Returns true if the error is potentially recoverable with a retry
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Embedding(_) => true, // embedding API might be temporarily down
            RagError::Llm(_) => true,
            RagError::VectorStore(_) => true, // connection can be re-established
            RagError::Session(_) => true,
            RagError::Document(_) => false,
            RagError::UnsupportedDocument(_) => false,
            RagError::Config(_) => false,
            RagError::Validation(_) => false,
            RagError::NotFound(_) => false,
        }
    }

    /// Converts error to SSE event format
    pub fn to_sse_event_data(&self) -> String {
        serde_json::json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
            "http_status": self.http_status_code(),
        })
        .to_string()
    }

    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        RagError::Embedding(format!("{:#}", err))
    }

    pub(crate) fn llm(err: anyhow::Error) -> Self {
        RagError::Llm(format!("{:#}", err))
    }

    pub(crate) fn vector_store(err: anyhow::Error) -> Self {
        RagError::VectorStore(format!("{:#}", err))
    }

    pub(crate) fn session(err: anyhow::Error) -> Self {
        RagError::Session(format!("{:#}", err))
    }
}

impl From<DocumentError> for RagError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Unsupported(_) => RagError::UnsupportedDocument(err.to_string()),
            other => RagError::Document(other.to_string()),
        }
    }
}

impl From<ConfigError> for RagError {
    fn from(err: ConfigError) -> Self {
        RagError::Config(err.to_string())
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
