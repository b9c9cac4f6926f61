use crate::errors::RagError;
use crate::models::{Answer, DocumentsResponse, HistoryResponse, IngestReport, QueryRequest, RemovedResponse};
use crate::rag::{RagService, SseEventStream};
use crate::sse::create_sse_stream;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::info;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub fn create_app(service: Arc<RagService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/documents", get(list_documents).delete(clear_documents))
        .route("/documents/:file_name", delete(remove_document))
        .route("/query", post(query))
        .route("/query/stream", post(query_stream))
        .route("/sessions/:id/history", get(session_history))
        .route("/sessions/:id", delete(reset_session))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn multipart_error(err: MultipartError) -> Response {
    log::warn!("Rejected upload: {}", err.body_text());
    let body = Json(json!({
        "error": err.body_text(),
        "retryable": false,
    }));
    (err.status(), body).into_response()
}

async fn upload(
    State(service): State<Arc<RagService>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, Response> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, data));
    }

    let (file_name, data) = upload.ok_or_else(|| {
        RagError::Validation("multipart field 'file' is required".to_string()).into_response()
    })?;
    if file_name.is_empty() {
        return Err(RagError::Validation("uploaded file has no name".to_string()).into_response());
    }

    info!("Received upload {} ({} bytes)", file_name, data.len());
    let report = service
        .ingest_bytes(&file_name, data.to_vec())
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(report))
}

async fn list_documents(
    State(service): State<Arc<RagService>>,
) -> Result<Json<DocumentsResponse>, RagError> {
    Ok(Json(service.documents().await?))
}

async fn clear_documents(State(service): State<Arc<RagService>>) -> Result<Json<Value>, RagError> {
    let removed = service.clear_documents().await?;
    Ok(Json(json!({ "removed_chunks": removed })))
}

async fn remove_document(
    State(service): State<Arc<RagService>>,
    Path(file_name): Path<String>,
) -> Result<Json<RemovedResponse>, RagError> {
    Ok(Json(service.remove_document(&file_name).await?))
}

async fn query(
    State(service): State<Arc<RagService>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Answer>, RagError> {
    let answer = service
        .answer(request.session_id, &request.question, request.top_k)
        .await?;
    Ok(Json(answer))
}

async fn query_stream(
    State(service): State<Arc<RagService>>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<SseEventStream>, RagError> {
    let events = service
        .answer_stream(request.session_id, request.question, request.top_k)
        .await?;
    Ok(create_sse_stream(events))
}

async fn session_history(
    State(service): State<Arc<RagService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, RagError> {
    Ok(Json(service.history(id).await?))
}

async fn reset_session(
    State(service): State<Arc<RagService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RagError> {
    service.reset_session(id).await?;
    Ok(Json(json!({ "session_id": id, "reset": true })))
}
