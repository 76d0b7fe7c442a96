//! OpenAI-compatible wire types.
//!
//! Request shapes accept both the legacy `functions` field and the newer
//! `tools` wrapper; responses always use the current chunk/completion shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub stop: Option<StopField>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub functions: Option<Vec<FunctionDef>>,
    #[serde(default)]
    pub tools: Option<Vec<WireTool>>,
}

impl ChatCompletionRequest {
    /// Declared functions, merged across the legacy and current fields.
    #[must_use]
    pub fn declared_functions(&self) -> Vec<&FunctionDef> {
        let mut out: Vec<&FunctionDef> = Vec::new();
        if let Some(functions) = &self.functions {
            out.extend(functions.iter());
        }
        if let Some(tools) = &self.tools {
            out.extend(tools.iter().map(|t| &t.function));
        }
        out
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StopField {
    One(String),
    Many(Vec<String>),
}

impl StopField {
    #[must_use]
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDef,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: String,
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_content_deserializes() {
        let json = r#"{"messages":[{"role":"user","content":"hi"}]}"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.messages.len(), 1);
        assert!(matches!(&req.messages[0].content, WireContent::Text(t) if t == "hi"));
        assert!(!req.stream);
    }

    #[test]
    fn multimodal_parts_deserialize() {
        let json = r#"{"messages":[{"role":"user","content":[
            {"type":"text","text":"look"},
            {"type":"image_url","image_url":{"url":"photo.png"}}
        ]}]}"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        let WireContent::Parts(parts) = &req.messages[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn stop_accepts_string_or_array() {
        let one: ChatCompletionRequest =
            serde_json::from_str(r#"{"messages":[],"stop":"END"}"#).unwrap();
        assert_eq!(one.stop.unwrap().as_vec(), vec!["END"]);
        let many: ChatCompletionRequest =
            serde_json::from_str(r#"{"messages":[],"stop":["a","b"]}"#).unwrap();
        assert_eq!(many.stop.unwrap().as_vec().len(), 2);
    }

    #[test]
    fn functions_merged_from_both_fields() {
        let json = r#"{"messages":[],
            "functions":[{"name":"calc"}],
            "tools":[{"type":"function","function":{"name":"inspect"}}]}"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        let names: Vec<_> = req.declared_functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["calc", "inspect"]);
    }

    #[test]
    fn chunk_delta_skips_absent_fields() {
        let delta = ChunkDelta {
            role: Some("assistant"),
            content: None,
        };
        let json = serde_json::to_string(&delta).unwrap();
        assert_eq!(json, r#"{"role":"assistant"}"#);
    }
}
