//! Wire → backend message conversion.
//!
//! Text parts accumulate into one segment per message. Image parts are
//! resolved to bytes where that can be done locally (data URIs, local
//! files); remote URLs are never fetched and degrade to a placeholder, as
//! does every image when the selected model lacks vision.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use modelgate_llm::{ChatMessage, ContentPart, Role};

use crate::error::ApiError;
use crate::wire::{WireContent, WireMessage, WirePart};

/// Convert validated wire messages into the backend form.
///
/// # Errors
///
/// Returns `ApiError::Validation` for undecodable data URIs or unreadable
/// local files; role strings were already validated.
pub fn convert_messages(
    messages: &[WireMessage],
    supports_vision: bool,
) -> Result<Vec<ChatMessage>, ApiError> {
    messages
        .iter()
        .map(|m| convert_message(m, supports_vision))
        .collect()
}

fn convert_message(message: &WireMessage, supports_vision: bool) -> Result<ChatMessage, ApiError> {
    let role = parse_role(&message.role)?;
    let parts = match &message.content {
        WireContent::Text(text) => vec![ContentPart::Text(text.clone())],
        WireContent::Parts(wire_parts) => {
            let mut text = String::new();
            let mut images = Vec::new();
            for part in wire_parts {
                match part {
                    WirePart::Text { text: t } => {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(t);
                    }
                    WirePart::ImageUrl { image_url } => {
                        match resolve_image(&image_url.url, supports_vision)? {
                            Resolved::Binary { data, mime } => {
                                images.push(ContentPart::Image { data, mime });
                            }
                            Resolved::Placeholder(note) => {
                                if !text.is_empty() {
                                    text.push('\n');
                                }
                                text.push_str(&note);
                            }
                        }
                    }
                }
            }
            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(ContentPart::Text(text));
            }
            parts.extend(images);
            parts
        }
    };
    Ok(ChatMessage::new(role, parts))
}

enum Resolved {
    Binary { data: Vec<u8>, mime: String },
    Placeholder(String),
}

fn resolve_image(url: &str, supports_vision: bool) -> Result<Resolved, ApiError> {
    if !supports_vision {
        tracing::debug!(url, "image degraded to placeholder, model lacks vision");
        return Ok(Resolved::Placeholder(
            "[image skipped: selected model does not support vision]".into(),
        ));
    }

    if let Some(rest) = url.strip_prefix("data:") {
        let (mime, b64) = rest.split_once(";base64,").ok_or_else(|| {
            ApiError::validation("data URI must be base64-encoded")
        })?;
        let data = BASE64
            .decode(b64)
            .map_err(|e| ApiError::validation(format!("invalid base64 image data: {e}")))?;
        return Ok(Resolved::Binary {
            data,
            mime: mime.to_owned(),
        });
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        // Remote images are never fetched server-side.
        return Ok(Resolved::Placeholder(format!("[remote image: {url}]")));
    }

    let path = url.strip_prefix("file://").unwrap_or(url);
    let data = std::fs::read(path)
        .map_err(|e| ApiError::validation(format!("cannot read image file {path}: {e}")))?;
    Ok(Resolved::Binary {
        data,
        mime: mime_from_extension(path),
    })
}

fn mime_from_extension(path: &str) -> String {
    let ext = path
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".into(),
        "gif" => "image/gif".into(),
        "webp" => "image/webp".into(),
        _ => "image/png".into(),
    }
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    match role {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(ApiError::validation(format!("invalid role: {other}"))),
    }
}
