//! Built-in tool handlers wired at startup.

use std::path::PathBuf;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::calc::evaluate;
use crate::inspect::{InspectOp, inspect};
use crate::registry::{ToolDefinition, ToolError, ToolHandler, ToolRegistry};

#[derive(Debug, Deserialize, JsonSchema)]
struct CalculateParams {
    /// Arithmetic expression, e.g. `(2+3)*4`.
    expression: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct InspectParams {
    /// One of `exists`, `stat`, `list`.
    operation: String,
    /// Path relative to the server working directory.
    path: String,
}

fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}))
}

fn parse_params<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Register the built-in tools: the arithmetic evaluator and the path-scoped
/// file inspector rooted at `workdir`.
///
/// # Errors
///
/// Returns `ToolError::AlreadyRegistered` if called twice on one registry.
pub fn register_builtins(registry: &ToolRegistry, workdir: PathBuf) -> Result<(), ToolError> {
    registry.register(
        ToolDefinition {
            name: "calculate".into(),
            description: "Evaluate a basic arithmetic expression".into(),
            parameters: schema_value::<CalculateParams>(),
        },
        calculate_handler(),
    )?;
    registry.register(
        ToolDefinition {
            name: "inspect_path".into(),
            description: "Read-only file metadata: exists, stat, or list".into(),
            parameters: schema_value::<InspectParams>(),
        },
        inspect_handler(workdir),
    )
}

fn calculate_handler() -> ToolHandler {
    Arc::new(|args| {
        Box::pin(async move {
            let params: CalculateParams = parse_params(args)?;
            let value =
                evaluate(&params.expression).map_err(|e| ToolError::Handler(e.to_string()))?;
            Ok(serde_json::json!({ "result": value }))
        })
    })
}

fn inspect_handler(workdir: PathBuf) -> ToolHandler {
    Arc::new(move |args| {
        let workdir = workdir.clone();
        Box::pin(async move {
            let params: InspectParams = parse_params(args)?;
            let op = InspectOp::parse(&params.operation)
                .map_err(|e| ToolError::Handler(e.to_string()))?;
            inspect(op, &params.path, &workdir).map_err(|e| ToolError::Handler(e.to_string()))
        })
    })
}
