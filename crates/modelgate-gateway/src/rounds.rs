//! Tool-call round driver.
//!
//! Sits between dispatch and translation: forwards assistant text untouched,
//! but when a round ends in tool calls, executes them through the registry
//! (with the configured timeout), appends the calls and their results to the
//! conversation, and re-dispatches to the same model. Tool failures never
//! abort the request; they travel back to the model as a
//! `{success:false, error}` payload. The output is a plain content stream,
//! so streaming and buffered responses share one loop.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use modelgate_llm::{
    BackendError, ChatMessage, ChatStream, ModelBackend, SendOptions, StreamEvent,
    ToolCallRequest,
};
use modelgate_pool::ModelCapabilities;
use modelgate_tools::{ToolCall, ToolRegistry, execute};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// Assistant text fragments after tool rounds are resolved.
pub(crate) type ContentStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Upper bound on model turns per request; the first send counts as one.
pub(crate) const MAX_TOOL_ROUNDS: usize = 4;

const CHANNEL_CAPACITY: usize = 16;

pub(crate) fn run_tool_rounds(
    registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
    selected: ModelCapabilities,
    options: SendOptions,
    mut messages: Vec<ChatMessage>,
    first: ChatStream,
    request_id: String,
) -> ContentStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = first;
        for round in 0..MAX_TOOL_ROUNDS {
            let mut round_text = String::new();
            let mut calls: Vec<ToolCallRequest> = Vec::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamEvent::Content(fragment)) => {
                        round_text.push_str(&fragment);
                        if tx.send(Ok(fragment)).await.is_err() {
                            return; // client went away
                        }
                    }
                    Ok(StreamEvent::ToolCall(call)) => calls.push(call),
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            if calls.is_empty() {
                return;
            }
            if round + 1 == MAX_TOOL_ROUNDS {
                tracing::warn!(
                    request_id = %request_id,
                    dropped = calls.len(),
                    "tool round limit reached, remaining calls not executed"
                );
                return;
            }

            messages.push(ChatMessage::assistant_tool_calls(round_text, calls.clone()));
            for call in calls {
                let outcome = execute(
                    &registry,
                    &ToolCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                    tool_timeout,
                )
                .await;
                tracing::debug!(
                    request_id = %request_id,
                    tool = %call.name,
                    success = outcome.success,
                    "tool call resolved"
                );
                let payload = serde_json::to_string(&outcome).unwrap_or_else(|_| {
                    r#"{"success":false,"error":"unserializable tool outcome"}"#.to_owned()
                });
                messages.push(ChatMessage::tool_result(call.id, payload));
            }

            match selected.handle.send(&messages, &options).await {
                Ok(next) => stream = next,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use modelgate_llm::AnyBackend;
    use modelgate_llm::mock::MockModel;
    use modelgate_pool::probe;
    use modelgate_tools::{TOOL_TIMEOUT, register_builtins};

    use super::*;

    fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn registry_with_builtins() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        register_builtins(&registry, std::env::temp_dir()).unwrap();
        registry
    }

    async fn drive(model: MockModel, registry: Arc<ToolRegistry>) -> Vec<Result<String, BackendError>> {
        let selected = probe(AnyBackend::Mock(model));
        let messages = vec![ChatMessage::text(modelgate_llm::Role::User, "hi")];
        let options = SendOptions::default();
        let first = selected.handle.send(&messages, &options).await.unwrap();
        let stream = run_tool_rounds(
            registry,
            TOOL_TIMEOUT,
            selected,
            options,
            messages,
            first,
            "req-test".into(),
        );
        stream.collect().await
    }

    #[tokio::test]
    async fn tool_round_executes_and_final_text_flows_through() {
        let registry = registry_with_builtins();
        let model = MockModel::new("gpt-4o")
            .with_fragments(vec!["The answer is 20".into()])
            .with_tool_call_rounds(vec![vec![call(
                "call_1",
                "calculate",
                r#"{"expression":"(2+3)*4"}"#,
            )]]);

        let items = drive(model, Arc::clone(&registry)).await;
        let text: String = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "The answer is 20");

        let stats = registry.usage_stats();
        let calc = stats.iter().find(|(name, _)| name == "calculate").unwrap();
        assert_eq!(calc.1.calls, 1);
        assert_eq!(calc.1.errors, 0);
    }

    #[tokio::test]
    async fn failed_tool_call_feeds_back_without_aborting() {
        let registry = registry_with_builtins();
        let model = MockModel::new("gpt-4o")
            .with_fragments(vec!["ok".into()])
            .with_tool_call_rounds(vec![vec![call("call_1", "no_such_tool", "{}")]]);

        let items = drive(model, registry).await;
        let text: String = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn round_limit_stops_endless_tool_requests() {
        let registry = registry_with_builtins();
        let rounds = (0..MAX_TOOL_ROUNDS + 2)
            .map(|i| vec![call(&format!("c{i}"), "calculate", r#"{"expression":"1"}"#)])
            .collect();
        let model = MockModel::new("gpt-4o").with_tool_call_rounds(rounds);

        let items = drive(model, Arc::clone(&registry)).await;
        assert!(items.into_iter().all(|i| i.is_ok()));

        // One execution per completed round, none for the dropped final batch.
        let stats = registry.usage_stats();
        let calc = stats.iter().find(|(name, _)| name == "calculate").unwrap();
        assert_eq!(calc.1.calls, (MAX_TOOL_ROUNDS - 1) as u64);
    }

    #[tokio::test]
    async fn mid_stream_error_forwarded_and_loop_stops() {
        let registry = registry_with_builtins();
        let mut model = MockModel::new("gpt-4o").with_fragments(vec!["partial".into()]);
        model.fail_mid_stream = true;

        let mut items = drive(model, registry).await.into_iter();
        assert_eq!(items.next().unwrap().unwrap(), "partial");
        assert!(items.next().unwrap().is_err());
        assert!(items.next().is_none());
    }
}
