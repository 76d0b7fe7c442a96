//! Test-only scriptable backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{ChatStream, ModelBackend, ModelSource, SendOptions, StreamEvent};
use crate::error::BackendError;
use crate::message::{ChatMessage, ToolCallRequest};

/// Failure a mock model can be scripted to raise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFailure {
    PermissionDenied,
    ContentBlocked,
    NotFound,
    ContextTooLong,
    Unreachable,
}

impl MockFailure {
    fn into_error(self, model: &str) -> BackendError {
        match self {
            Self::PermissionDenied => BackendError::PermissionDenied,
            Self::ContentBlocked => BackendError::ContentBlocked,
            Self::NotFound => BackendError::NotFound {
                model: model.to_owned(),
            },
            Self::ContextTooLong => BackendError::ContextTooLong {
                tokens: 0,
                limit: 0,
            },
            Self::Unreachable => BackendError::Unreachable,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MockModel {
    pub id: String,
    pub vendor: String,
    pub max_input_tokens: i64,
    pub max_output_tokens: Option<u32>,
    pub fragments: Vec<String>,
    /// Scripted tool calls per send, consumed in order. A send whose entry
    /// is present and non-empty yields those calls instead of fragments;
    /// once entries run out, sends yield fragments again.
    pub tool_call_rounds: Vec<Vec<ToolCallRequest>>,
    pub fail_send: Option<MockFailure>,
    /// Emit scripted fragments, then one stream-level error.
    pub fail_mid_stream: bool,
    pub reachable: bool,
    // Shared across clones so scripting survives pool discovery.
    sends: Arc<AtomicUsize>,
}

impl MockModel {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: "mock".into(),
            max_input_tokens: 8192,
            max_output_tokens: None,
            fragments: vec!["mock response".into()],
            tool_call_rounds: Vec::new(),
            fail_send: None,
            fail_mid_stream: false,
            reachable: true,
            sends: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_fragments(mut self, fragments: Vec<String>) -> Self {
        self.fragments = fragments;
        self
    }

    #[must_use]
    pub fn with_tool_call_rounds(mut self, rounds: Vec<Vec<ToolCallRequest>>) -> Self {
        self.tool_call_rounds = rounds;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, max_input: i64, max_output: Option<u32>) -> Self {
        self.max_input_tokens = max_input;
        self.max_output_tokens = max_output;
        self
    }

    #[must_use]
    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.fail_send = Some(failure);
        self
    }

    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }
}

impl ModelBackend for MockModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn vendor(&self) -> &str {
        &self.vendor
    }

    fn max_input_tokens(&self) -> i64 {
        self.max_input_tokens
    }

    fn reported_max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    async fn send(
        &self,
        _messages: &[ChatMessage],
        _options: &SendOptions,
    ) -> Result<ChatStream, BackendError> {
        if let Some(failure) = self.fail_send {
            return Err(failure.into_error(&self.id));
        }

        let round = self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(calls) = self.tool_call_rounds.get(round)
            && !calls.is_empty()
        {
            let items: Vec<Result<StreamEvent, BackendError>> = calls
                .iter()
                .cloned()
                .map(|c| Ok(StreamEvent::ToolCall(c)))
                .collect();
            return Ok(Box::pin(tokio_stream::iter(items)));
        }

        let mut items: Vec<Result<StreamEvent, BackendError>> = self
            .fragments
            .iter()
            .cloned()
            .map(|f| Ok(StreamEvent::Content(f)))
            .collect();
        if self.fail_mid_stream {
            items.push(Err(BackendError::Other("mock stream error".into())));
        }
        Ok(Box::pin(tokio_stream::iter(items)))
    }

    async fn reachable(&self) -> bool {
        self.reachable
    }
}

/// Test-only source yielding a fixed set of mock models.
#[derive(Clone, Debug, Default)]
pub struct MockSource {
    pub models: Vec<MockModel>,
    pub vendor: String,
    pub fail_listing: bool,
}

impl MockSource {
    #[must_use]
    pub fn new(models: Vec<MockModel>) -> Self {
        Self {
            models,
            vendor: "mock".into(),
            fail_listing: false,
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            models: Vec::new(),
            vendor: "mock".into(),
            fail_listing: true,
        }
    }
}

impl ModelSource for MockSource {
    type Backend = MockModel;

    async fn list_models(&self) -> Result<Vec<MockModel>, BackendError> {
        if self.fail_listing {
            return Err(BackendError::Unreachable);
        }
        Ok(self.models.clone())
    }

    async fn access_available(&self) -> bool {
        !self.fail_listing && self.models.iter().any(|m| m.reachable)
    }

    fn vendor(&self) -> &str {
        &self.vendor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use tokio_stream::StreamExt;

    fn content(item: Option<Result<StreamEvent, BackendError>>) -> String {
        match item.unwrap().unwrap() {
            StreamEvent::Content(text) => text,
            StreamEvent::ToolCall(call) => panic!("expected content, got call {}", call.name),
        }
    }

    #[tokio::test]
    async fn mock_streams_fragments_in_order() {
        let model = MockModel::new("m").with_fragments(vec!["Hel".into(), "lo".into()]);
        let msgs = vec![ChatMessage::text(Role::User, "hi")];
        let mut stream = model.send(&msgs, &SendOptions::default()).await.unwrap();
        assert_eq!(content(stream.next().await), "Hel");
        assert_eq!(content(stream.next().await), "lo");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn mock_scripted_failure() {
        let model = MockModel::new("m").failing(MockFailure::PermissionDenied);
        let msgs = vec![ChatMessage::text(Role::User, "hi")];
        let Err(err) = model.send(&msgs, &SendOptions::default()).await else {
            panic!("expected the scripted failure");
        };
        assert!(matches!(err, BackendError::PermissionDenied));
    }

    #[tokio::test]
    async fn mock_mid_stream_error() {
        let mut model = MockModel::new("m").with_fragments(vec!["a".into()]);
        model.fail_mid_stream = true;
        let msgs = vec![ChatMessage::text(Role::User, "hi")];
        let mut stream = model.send(&msgs, &SendOptions::default()).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn scripted_rounds_yield_calls_then_fragments() {
        let model = MockModel::new("m")
            .with_fragments(vec!["done".into()])
            .with_tool_call_rounds(vec![vec![ToolCallRequest {
                id: "call_1".into(),
                name: "calculate".into(),
                arguments: "{}".into(),
            }]]);
        let msgs = vec![ChatMessage::text(Role::User, "hi")];

        let mut first = model.send(&msgs, &SendOptions::default()).await.unwrap();
        let StreamEvent::ToolCall(call) = first.next().await.unwrap().unwrap() else {
            panic!("expected a tool call on the first send");
        };
        assert_eq!(call.name, "calculate");
        assert!(first.next().await.is_none());

        // Clones share the send counter, as pool discovery clones handles.
        let clone = model.clone();
        let mut second = clone.send(&msgs, &SendOptions::default()).await.unwrap();
        assert_eq!(content(second.next().await), "done");
    }

    #[tokio::test]
    async fn mock_source_lists_models() {
        let source = MockSource::new(vec![MockModel::new("a"), MockModel::new("b")]);
        let models = source.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert!(source.access_available().await);
    }

    #[tokio::test]
    async fn failing_source_denies_access() {
        let source = MockSource::failing();
        assert!(source.list_models().await.is_err());
        assert!(!source.access_available().await);
    }
}
