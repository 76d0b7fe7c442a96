use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use eventsource_stream::Eventsource;
use futures_core::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::backend::{ChatStream, StreamEvent};
use crate::error::BackendError;
use crate::message::ToolCallRequest;

/// Convert an upstream OpenAI-style streaming response into a `ChatStream`.
///
/// Text deltas pass through one-to-one. Tool-call deltas arrive fragmented
/// (index-keyed id/name/argument pieces) and are accumulated; each call is
/// surfaced as a single complete event once the upstream marks the turn
/// finished or the stream ends.
pub(crate) fn upstream_sse_to_stream(response: reqwest::Response) -> ChatStream {
    let events = response
        .bytes_stream()
        .eventsource()
        .map(|event| match event {
            Ok(event) => Ok(event.data),
            Err(e) => Err(BackendError::SseParse(e.to_string())),
        });
    Box::pin(EventTranslator::new(Box::pin(events)))
}

type RawEventStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

struct EventTranslator {
    inner: RawEventStream,
    parser: ChunkParser,
    queue: VecDeque<Result<StreamEvent, BackendError>>,
    finished: bool,
}

impl EventTranslator {
    fn new(inner: RawEventStream) -> Self {
        Self {
            inner,
            parser: ChunkParser::default(),
            queue: VecDeque::new(),
            finished: false,
        }
    }
}

impl Stream for EventTranslator {
    type Item = Result<StreamEvent, BackendError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.queue.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => this.queue.extend(this.parser.ingest(&data)),
                Poll::Ready(Some(Err(e))) => this.queue.push_back(Err(e)),
                Poll::Ready(None) => {
                    this.finished = true;
                    this.queue.extend(this.parser.flush().into_iter().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Stateful parser for upstream SSE `data:` payloads. Holds the tool-call
/// fragments of the current turn until they can be emitted whole.
#[derive(Default)]
struct ChunkParser {
    partial: Vec<PartialToolCall>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ChunkParser {
    fn ingest(&mut self, data: &str) -> Vec<Result<StreamEvent, BackendError>> {
        if data == "[DONE]" {
            return self.flush().into_iter().map(Ok).collect();
        }

        let chunk: UpstreamStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                return vec![Err(BackendError::SseParse(format!(
                    "failed to parse SSE data: {e}"
                )))];
            }
        };

        let mut events = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            events.push(Ok(StreamEvent::Content(content)));
        }

        for delta in choice.delta.tool_calls {
            if self.partial.len() <= delta.index {
                self.partial.resize_with(delta.index + 1, PartialToolCall::default);
            }
            let slot = &mut self.partial[delta.index];
            if let Some(id) = delta.id {
                slot.id = id;
            }
            if let Some(name) = delta.function.name {
                slot.name = name;
            }
            if let Some(arguments) = delta.function.arguments {
                slot.arguments.push_str(&arguments);
            }
        }

        if choice.finish_reason.as_deref() == Some("tool_calls") {
            events.extend(self.flush().into_iter().map(Ok));
        }
        events
    }

    fn flush(&mut self) -> Vec<StreamEvent> {
        self.partial
            .drain(..)
            .filter(|p| !p.name.is_empty())
            .map(|p| {
                StreamEvent::ToolCall(ToolCallRequest {
                    id: p.id,
                    name: p.name,
                    arguments: if p.arguments.is_empty() {
                        "{}".to_owned()
                    } else {
                        p.arguments
                    },
                })
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct UpstreamStreamChunk {
    choices: Vec<UpstreamStreamChoice>,
}

#[derive(Deserialize)]
struct UpstreamStreamChoice {
    delta: UpstreamStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: FunctionDelta,
}

#[derive(Deserialize, Default)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text_chunk() {
        let mut parser = ChunkParser::default();
        let data = r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#;
        let events = parser.ingest(data);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::Content("hi".into())
        );
    }

    #[test]
    fn parse_empty_content_skipped() {
        let mut parser = ChunkParser::default();
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(parser.ingest(data).is_empty());
    }

    #[test]
    fn parse_invalid_json() {
        let mut parser = ChunkParser::default();
        let events = parser.ingest("not json");
        let err = events.into_iter().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("failed to parse SSE data"));
    }

    #[test]
    fn tool_call_fragments_accumulate_until_finish() {
        let mut parser = ChunkParser::default();
        let first = r#"{"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"call_1","function":{"name":"calculate","arguments":"{\"expr"}}
        ]},"finish_reason":null}]}"#;
        let second = r#"{"choices":[{"delta":{"tool_calls":[
            {"index":0,"function":{"arguments":"ession\":\"2+2\"}"}}
        ]},"finish_reason":null}]}"#;
        let finish = r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#;

        assert!(parser.ingest(first).is_empty());
        assert!(parser.ingest(second).is_empty());
        let events = parser.ingest(finish);
        assert_eq!(events.len(), 1);
        let StreamEvent::ToolCall(call) = events[0].as_ref().unwrap() else {
            panic!("expected a tool call");
        };
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "calculate");
        assert_eq!(call.arguments, r#"{"expression":"2+2"}"#);
    }

    #[test]
    fn done_sentinel_flushes_pending_calls() {
        let mut parser = ChunkParser::default();
        let delta = r#"{"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"c","function":{"name":"inspect_path"}}
        ]},"finish_reason":null}]}"#;
        assert!(parser.ingest(delta).is_empty());
        let events = parser.ingest("[DONE]");
        assert_eq!(events.len(), 1);
        let StreamEvent::ToolCall(call) = events[0].as_ref().unwrap() else {
            panic!("expected a tool call");
        };
        assert_eq!(call.name, "inspect_path");
        // No argument fragments arrived; the call still parses as JSON.
        assert_eq!(call.arguments, "{}");
    }

    #[test]
    fn parallel_tool_calls_keep_index_order() {
        let mut parser = ChunkParser::default();
        let delta = r#"{"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"a","function":{"name":"calculate","arguments":"{}"}},
            {"index":1,"id":"b","function":{"name":"inspect_path","arguments":"{}"}}
        ]},"finish_reason":"tool_calls"}]}"#;
        let events = parser.ingest(delta);
        let names: Vec<_> = events
            .iter()
            .map(|e| match e.as_ref().unwrap() {
                StreamEvent::ToolCall(c) => c.name.as_str(),
                StreamEvent::Content(_) => panic!("expected tool calls only"),
            })
            .collect();
        assert_eq!(names, vec!["calculate", "inspect_path"]);
    }
}
