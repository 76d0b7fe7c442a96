use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::backend::{ChatStream, ModelBackend, ModelSource, SendOptions, ToolSpec};
use crate::error::BackendError;
use crate::http::default_client;
use crate::message::{ChatMessage, ContentPart, Role, ToolCallRequest};
use crate::sse::upstream_sse_to_stream;

/// Model source backed by an OpenAI-style HTTP upstream.
///
/// Enumerates whatever `/v1/models` currently returns; no hardcoded
/// allow-list. Limits are taken from the listing when the upstream reports
/// them and fall back to a conservative default otherwise.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    vendor: String,
}

impl fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("vendor", &self.vendor)
            .finish_non_exhaustive()
    }
}

const DEFAULT_CONTEXT_TOKENS: i64 = 8192;

impl HttpSource {
    #[must_use]
    pub fn new(mut base_url: String, api_key: String, vendor: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: default_client(),
            base_url,
            api_key,
            vendor,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl ModelSource for HttpSource {
    type Backend = HttpModel;

    async fn list_models(&self) -> Result<Vec<HttpModel>, BackendError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(BackendError::Http)?;
        if !status.is_success() {
            tracing::error!(%status, "model listing failed");
            return Err(map_status(status, &text));
        }

        let listing: ModelListing = serde_json::from_str(&text)?;
        Ok(listing
            .data
            .into_iter()
            .map(|m| {
                let max_input = m
                    .context_length
                    .or(m.max_input_tokens)
                    .unwrap_or(DEFAULT_CONTEXT_TOKENS);
                HttpModel {
                    client: self.client.clone(),
                    base_url: self.base_url.clone(),
                    api_key: self.api_key.clone(),
                    vendor: self.vendor.clone(),
                    id: m.id,
                    max_input_tokens: max_input,
                    max_output_tokens: m.max_output_tokens,
                }
            })
            .collect())
    }

    async fn access_available(&self) -> bool {
        match self.list_models().await {
            Ok(models) => !models.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "upstream access check failed");
                false
            }
        }
    }

    fn vendor(&self) -> &str {
        &self.vendor
    }
}

/// One model exposed by an [`HttpSource`].
#[derive(Clone)]
pub struct HttpModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    vendor: String,
    id: String,
    max_input_tokens: i64,
    max_output_tokens: Option<u32>,
}

impl fmt::Debug for HttpModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpModel")
            .field("id", &self.id)
            .field("vendor", &self.vendor)
            .field("max_input_tokens", &self.max_input_tokens)
            .finish_non_exhaustive()
    }
}

impl ModelBackend for HttpModel {
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
        messages: &[ChatMessage],
        options: &SendOptions,
    ) -> Result<ChatStream, BackendError> {
        let body = ChatRequest {
            model: &self.id,
            messages: convert_messages(messages),
            stream: true,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stop: if options.stop.is_empty() {
                None
            } else {
                Some(&options.stop)
            },
            tools: if options.tools.is_empty() {
                None
            } else {
                Some(options.tools.iter().map(WireTool::from).collect())
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.map_err(BackendError::Http)?;
            tracing::error!(%status, model = %self.id, "streaming request failed");
            return Err(map_status(status, &text));
        }

        Ok(upstream_sse_to_stream(response))
    }

    async fn reachable(&self) -> bool {
        self.client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

/// Map an upstream error status to a typed error. Body text is consulted for
/// the content-filter and context-length cases OpenAI reports as plain 400s.
fn map_status(status: reqwest::StatusCode, body: &str) -> BackendError {
    use reqwest::StatusCode;
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            if body.contains("content_filter") || body.contains("content_policy") {
                BackendError::ContentBlocked
            } else {
                BackendError::PermissionDenied
            }
        }
        StatusCode::NOT_FOUND => BackendError::NotFound {
            model: extract_model_hint(body),
        },
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited,
        StatusCode::BAD_REQUEST if body.contains("context_length") => {
            BackendError::ContextTooLong {
                tokens: 0,
                limit: 0,
            }
        }
        StatusCode::BAD_REQUEST if body.contains("content_filter") => BackendError::ContentBlocked,
        _ => BackendError::Other(format!("upstream request failed (status {status})")),
    }
}

fn extract_model_hint(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/param")
                .or_else(|| v.pointer("/error/message"))
                .and_then(|p| p.as_str().map(str::to_owned))
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

#[derive(Deserialize)]
struct ModelListing {
    data: Vec<ListedModel>,
}

#[derive(Deserialize)]
struct ListedModel {
    id: String,
    #[serde(default)]
    context_length: Option<i64>,
    #[serde(default)]
    max_input_tokens: Option<i64>,
    #[serde(default)]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> From<&'a ToolSpec> for WireTool<'a> {
    fn from(spec: &'a ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.parameters,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlDetail },
}

#[derive(Serialize)]
struct ImageUrlDetail {
    url: String,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: ApiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct ApiToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiToolCallFunction<'a>,
}

#[derive(Serialize)]
struct ApiToolCallFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

impl<'a> From<&'a ToolCallRequest> for ApiToolCall<'a> {
    fn from(call: &'a ToolCallRequest) -> Self {
        Self {
            id: &call.id,
            kind: "function",
            function: ApiToolCallFunction {
                name: &call.name,
                arguments: &call.arguments,
            },
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|msg| {
            let content = if msg.has_images() {
                let mut parts = Vec::new();
                let text = msg.text_content();
                if !text.is_empty() {
                    parts.push(ApiContentPart::Text { text });
                }
                for part in &msg.parts {
                    if let ContentPart::Image { data, mime } = part {
                        let b64 = STANDARD.encode(data);
                        parts.push(ApiContentPart::ImageUrl {
                            image_url: ImageUrlDetail {
                                url: format!("data:{mime};base64,{b64}"),
                            },
                        });
                    }
                }
                ApiContent::Parts(parts)
            } else {
                ApiContent::Text(msg.text_content())
            };
            ApiMessage {
                role: role_str(msg.role),
                content,
                tool_calls: if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(msg.tool_calls.iter().map(ApiToolCall::from).collect())
                },
                tool_call_id: msg.tool_call_id.as_deref(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_stripped() {
        let source = HttpSource::new("http://localhost:8080///".into(), "k".into(), "acme".into());
        assert_eq!(source.base_url, "http://localhost:8080");
    }

    #[test]
    fn listing_parses_optional_limits() {
        let json = r#"{"data":[
            {"id":"big","context_length":128000,"max_output_tokens":8192},
            {"id":"small"}
        ]}"#;
        let listing: ModelListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.len(), 2);
        assert_eq!(listing.data[0].context_length, Some(128_000));
        assert!(listing.data[1].context_length.is_none());
    }

    #[test]
    fn map_status_permission() {
        let err = map_status(reqwest::StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, BackendError::PermissionDenied));
    }

    #[test]
    fn map_status_content_filter() {
        let err = map_status(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"content_filter"}}"#,
        );
        assert!(matches!(err, BackendError::ContentBlocked));
    }

    #[test]
    fn map_status_context_length() {
        let err = map_status(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"context_length_exceeded"}}"#,
        );
        assert!(matches!(err, BackendError::ContextTooLong { .. }));
    }

    #[test]
    fn map_status_not_found_extracts_param() {
        let err = map_status(
            reqwest::StatusCode::NOT_FOUND,
            r#"{"error":{"param":"gpt-nope"}}"#,
        );
        match err {
            BackendError::NotFound { model } => assert_eq!(model, "gpt-nope"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn convert_plain_text_message() {
        let msgs = vec![ChatMessage::text(Role::User, "hello")];
        let api = convert_messages(&msgs);
        let json = serde_json::to_string(&api).unwrap();
        assert!(json.contains(r#""role":"user""#));
        assert!(json.contains(r#""content":"hello""#));
    }

    #[test]
    fn convert_image_message_becomes_parts() {
        let msgs = vec![ChatMessage::new(
            Role::User,
            vec![
                ContentPart::Text("look".into()),
                ContentPart::Image {
                    data: vec![0xFF, 0xD8],
                    mime: "image/jpeg".into(),
                },
            ],
        )];
        let api = convert_messages(&msgs);
        let json = serde_json::to_string(&api).unwrap();
        assert!(json.contains("image_url"));
        assert!(json.contains("data:image/jpeg;base64,"));
        assert!(json.contains(r#""type":"text""#));
    }

    #[test]
    fn convert_tool_turns_carry_calls_and_ids() {
        let msgs = vec![
            ChatMessage::assistant_tool_calls(
                String::new(),
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "calculate".into(),
                    arguments: r#"{"expression":"2+2"}"#.into(),
                }],
            ),
            ChatMessage::tool_result("call_1", r#"{"success":true,"result":{"result":4.0}}"#),
        ];
        let api = convert_messages(&msgs);
        let json = serde_json::to_string(&api).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
        assert!(json.contains(r#""tool_calls":[{"id":"call_1","type":"function""#));
        assert!(json.contains(r#""role":"tool""#));
        assert!(json.contains(r#""tool_call_id":"call_1""#));
    }
}
