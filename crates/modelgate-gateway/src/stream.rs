//! Streaming translator: resolved content fragments → OpenAI SSE chunks.
//!
//! Emission order is fixed: one chunk per fragment (the first carries the
//! role marker), a synthetic empty/stop chunk after the backend stream ends,
//! then the `[DONE]` sentinel. A mid-stream backend error replaces further
//! content with a single error event; content already sent stands.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use modelgate_llm::BackendError;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::rounds::ContentStream;
use crate::wire::{ChatCompletionChunk, ChunkChoice, ChunkDelta, unix_now};

const CHANNEL_CAPACITY: usize = 16;

/// Translate a backend stream into SSE frame strings.
///
/// Each yielded item is one complete `data:` frame. Fragments are forwarded
/// in emission order with no buffering beyond one fragment.
pub fn translate(request_id: &str, model: &str, upstream: ContentStream) -> ReceiverStream<String> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let chunk_id = format!("chatcmpl-{request_id}");
    let request_id = request_id.to_owned();
    let model = model.to_owned();
    tokio::spawn(async move {
        let created = unix_now();
        let mut upstream = upstream;
        let mut first = true;
        while let Some(item) = upstream.next().await {
            match item {
                Ok(fragment) => {
                    let chunk = chunk_frame(&chunk_id, created, &model, first, Some(fragment), None);
                    first = false;
                    if tx.send(chunk).await.is_err() {
                        return; // client went away
                    }
                }
                Err(e) => {
                    // Headers are committed; log and emit a best-effort
                    // in-stream error event, keeping content already sent.
                    tracing::error!(request_id = %request_id, error = %e, "backend stream failed mid-response");
                    let _ = tx.send(error_frame(&e)).await;
                    return;
                }
            }
        }
        let stop = chunk_frame(&chunk_id, created, &model, first, None, Some("stop"));
        if tx.send(stop).await.is_ok() {
            let _ = tx.send("data: [DONE]\n\n".to_owned()).await;
        }
    });
    ReceiverStream::new(rx)
}

/// Wrap the frame stream in an SSE response with proxy buffering disabled.
#[must_use]
pub fn sse_response(frames: ReceiverStream<String>) -> Response {
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

fn chunk_frame(
    id: &str,
    created: u64,
    model: &str,
    first: bool,
    content: Option<String>,
    finish_reason: Option<&'static str>,
) -> String {
    let chunk = ChatCompletionChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk",
        created,
        model: model.to_owned(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: first.then_some("assistant"),
                content,
            },
            finish_reason,
        }],
    };
    let json = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_owned());
    format!("data: {json}\n\n")
}

fn error_frame(e: &BackendError) -> String {
    let event = serde_json::json!({
        "error": { "message": e.to_string(), "type": "api_error" }
    });
    format!("data: {event}\n\n")
}
