use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Carries a tool result back to the model; never accepted from clients.
    Tool,
}

/// One part of a message body. Text parts accumulate into a single segment
/// during conversion; image parts carry already-resolved bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { data: Vec<u8>, mime: String },
}

/// A model-emitted request to invoke a named tool. Arguments are the raw
/// JSON string the model produced, passed through unparsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
    /// Tool invocations echoed on an assistant message, empty otherwise.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on `Role::Tool` messages to tie the result to its invocation.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            parts,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self::new(role, vec![ContentPart::Text(content.into())])
    }

    /// Assistant turn that requested the given tool invocations.
    #[must_use]
    pub fn assistant_tool_calls(content: String, tool_calls: Vec<ToolCallRequest>) -> Self {
        let parts = if content.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::Text(content)]
        };
        Self {
            role: Role::Assistant,
            parts,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool-role turn carrying one invocation's result payload.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![ContentPart::Text(payload.into())],
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Concatenated text parts, ignoring images.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let ContentPart::Text(t) = part {
                out.push_str(t);
            }
        }
        out
    }

    #[must_use]
    pub fn has_images(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ContentPart::Image { .. }))
    }
}
