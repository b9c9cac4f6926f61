use crate::errors::RagError;
use crate::models::SourceRef;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use uuid::Uuid;

pub fn create_sse_stream<S>(events: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive-text"),
    )
}

pub fn create_session_event(session_id: &Uuid) -> Event {
    let data = serde_json::json!({
        "session_id": session_id
    });

    Event::default().event("session").data(data.to_string())
}

pub fn create_sources_event(sources: &[SourceRef]) -> Event {
    let data = serde_json::json!({
        "sources": sources
    });

    Event::default().event("sources").data(data.to_string())
}

pub fn create_streaming_content_event(content: &str) -> Event {
    let data = serde_json::json!({
        "content": content,
        "type": "delta"
    });

    Event::default()
        .event("content_delta")
        .data(data.to_string())
}

pub fn create_stream_end_event() -> Event {
    Event::default().event("stream_end").data("{}")
}

pub fn create_error_event(error: &RagError) -> Event {
    Event::default()
        .event("error_event")
        .data(error.to_sse_event_data())
}
