use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::{ChatMessage, ToolCallRequest};

/// One increment from a backend response stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of assistant text, in emission order.
    Content(String),
    /// A complete tool invocation, surfaced once its fragments are whole.
    ToolCall(ToolCallRequest),
}

/// Incremental events from a backend model. Dropping the stream cancels the
/// underlying request.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, BackendError>> + Send>>;

/// Tool declaration forwarded to the upstream: name/description/schema
/// passthrough, no interpretation here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Vec<String>,
    pub tools: Vec<ToolSpec>,
}

/// One backend model, held as an opaque capability: identity and limit
/// getters plus send. Callers never depend on the upstream shape.
pub trait ModelBackend: Send + Sync {
    fn id(&self) -> &str;

    fn vendor(&self) -> &str;

    /// Provider-reported input token limit. Non-positive means the model is
    /// currently unusable and is treated as unhealthy.
    fn max_input_tokens(&self) -> i64;

    /// Provider-reported output limit, when the upstream exposes one.
    fn reported_max_output_tokens(&self) -> Option<u32>;

    /// Send an ordered message list and stream back response events.
    ///
    /// # Errors
    ///
    /// Returns a typed `BackendError` on upstream failure.
    fn send(
        &self,
        messages: &[ChatMessage],
        options: &SendOptions,
    ) -> impl Future<Output = Result<ChatStream, BackendError>> + Send;

    /// Cheap liveness probe against the upstream.
    fn reachable(&self) -> impl Future<Output = bool> + Send;
}

/// Enumerates the models an upstream currently exposes. The set can change
/// between calls; no filtering happens at this layer.
pub trait ModelSource: Send + Sync {
    type Backend: ModelBackend;

    /// # Errors
    ///
    /// Returns an error if the upstream cannot be queried.
    fn list_models(&self)
    -> impl Future<Output = Result<Vec<Self::Backend>, BackendError>> + Send;

    /// Live check that at least one model of the expected vendor is reachable.
    fn access_available(&self) -> impl Future<Output = bool> + Send;

    fn vendor(&self) -> &str;
}
