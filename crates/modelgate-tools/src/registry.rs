use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::Serialize;

/// Errors raised while registering or executing tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("tool disabled: {0}")]
    Disabled(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("tool execution timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("{0}")]
    Handler(String),
}

/// Tool declaration: name, description, and a JSON-schema parameter spec
/// forwarded verbatim to models that support function calling.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Parameter names listed under the schema's `required` array.
    #[must_use]
    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>;

/// Async handler invoked with already-parsed JSON arguments.
pub type ToolHandler = Arc<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Per-tool accounting, updated on every invocation.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ToolUsage {
    pub calls: u64,
    pub errors: u64,
    #[serde(skip)]
    pub last_used: Option<SystemTime>,
}

struct ToolEntry {
    definition: ToolDefinition,
    handler: ToolHandler,
    enabled: bool,
    usage: ToolUsage,
}

/// Named tool registry. Entries are never removed, only disabled.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, ToolEntry>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `ToolError::AlreadyRegistered` for a duplicate name.
    pub fn register(
        &self,
        definition: ToolDefinition,
        handler: ToolHandler,
    ) -> Result<(), ToolError> {
        let mut entries = self.write();
        if entries.contains_key(&definition.name) {
            return Err(ToolError::AlreadyRegistered(definition.name));
        }
        tracing::debug!(tool = %definition.name, "tool registered");
        entries.insert(
            definition.name.clone(),
            ToolEntry {
                definition,
                handler,
                enabled: true,
                usage: ToolUsage::default(),
            },
        );
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.enabled = enabled;
        }
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Definitions of all currently enabled tools, for attachment to an
    /// upstream request.
    #[must_use]
    pub fn enabled_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .read()
            .values()
            .filter(|e| e.enabled)
            .map(|e| e.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Snapshot of per-tool usage counters, for the status endpoint.
    #[must_use]
    pub fn usage_stats(&self) -> Vec<(String, ToolUsage)> {
        let mut stats: Vec<(String, ToolUsage)> = self
            .read()
            .iter()
            .map(|(name, e)| (name.clone(), e.usage))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<(ToolDefinition, ToolHandler), ToolError> {
        let entries = self.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_owned()))?;
        if !entry.enabled {
            return Err(ToolError::Disabled(name.to_owned()));
        }
        Ok((entry.definition.clone(), Arc::clone(&entry.handler)))
    }

    pub(crate) fn record(&self, name: &str, success: bool) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.usage.calls += 1;
            if !success {
                entry.usage.errors += 1;
            }
            entry.usage.last_used = Some(SystemTime::now());
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ToolEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ToolEntry>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
