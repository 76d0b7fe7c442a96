//! Sandboxed tool execution.
//!
//! A registry of named tools with JSON-schema parameter contracts, an
//! executor that races every handler against a hard timeout, and two
//! safety-critical built-ins: a no-eval arithmetic evaluator and a
//! traversal-resistant file inspector.

pub mod builtins;
pub mod calc;
pub mod executor;
pub mod inspect;
pub mod registry;

pub use builtins::register_builtins;
pub use executor::{TOOL_TIMEOUT, ToolCall, ToolOutcome, execute};
pub use registry::{ToolDefinition, ToolError, ToolHandler, ToolRegistry, ToolUsage};
