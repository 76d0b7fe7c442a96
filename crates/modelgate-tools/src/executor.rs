use std::time::Duration;

use serde::Serialize;

use crate::registry::{ToolError, ToolRegistry};

/// Hard per-invocation execution limit.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A model-emitted request to invoke a named tool. Arguments arrive as the
/// raw JSON string the model produced.
#[derive(Clone, Debug)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

/// Result handed back to the caller. Tool failures never abort the
/// surrounding request; they surface here as `success: false`.
#[derive(Clone, Debug, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn err(error: &ToolError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Execute one tool call with parameter validation and a hard timeout.
///
/// Failure modes, checked in order: unknown tool, disabled tool, argument
/// string that is not valid JSON, missing required parameters, then the
/// handler raced against the timeout. A handler that loses the race is
/// abandoned, not cancelled: the spawned task keeps running to completion
/// and its result is discarded. That leak is the documented contract.
pub async fn execute(registry: &ToolRegistry, call: &ToolCall, timeout: Duration) -> ToolOutcome {
    let outcome = match run(registry, call, timeout).await {
        Ok(value) => ToolOutcome::ok(value),
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
            ToolOutcome::err(&e)
        }
    };
    registry.record(&call.name, outcome.success);
    if outcome.success {
        tracing::debug!(tool = %call.name, "tool execution succeeded");
    }
    outcome
}

async fn run(
    registry: &ToolRegistry,
    call: &ToolCall,
    timeout: Duration,
) -> Result<serde_json::Value, ToolError> {
    let (definition, handler) = registry.lookup(&call.name)?;

    let args: serde_json::Value = serde_json::from_str(&call.arguments)
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

    for param in definition.required_params() {
        if args.get(param).is_none() {
            return Err(ToolError::MissingParameter(param.to_owned()));
        }
    }

    let mut task = tokio::spawn(handler(args));
    tokio::select! {
        joined = &mut task => match joined {
            Ok(result) => result,
            Err(e) => Err(ToolError::Handler(format!("handler panicked: {e}"))),
        },
        () = tokio::time::sleep(timeout) => {
            // The loser keeps running; only its result is ignored.
            Err(ToolError::Timeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}
