//! Request validation: first violated constraint wins.

use crate::error::ApiError;
use crate::wire::{ChatCompletionRequest, WireContent, WirePart};

const MAX_MESSAGE_CHARS: usize = 100_000;
const MAX_IMAGES_PER_MESSAGE: usize = 10;
const MAX_STOP_SEQUENCES: usize = 4;

pub(crate) const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Validate the wire request before any routing work happens.
///
/// # Errors
///
/// Returns `ApiError::Validation` for the first violated constraint.
pub fn validate(req: &ChatCompletionRequest) -> Result<(), ApiError> {
    if req.messages.is_empty() {
        return Err(ApiError::validation_param(
            "messages must be a non-empty array",
            "messages",
        ));
    }

    for (i, message) in req.messages.iter().enumerate() {
        if !matches!(message.role.as_str(), "system" | "user" | "assistant") {
            return Err(ApiError::validation_param(
                format!("invalid role '{}' in message {i}", message.role),
                format!("messages[{i}].role"),
            ));
        }
        validate_content(&message.content, i)?;
    }

    validate_range(req.temperature, 0.0, 2.0, "temperature")?;
    validate_range(req.top_p, 0.0, 1.0, "top_p")?;
    validate_range(req.presence_penalty, -2.0, 2.0, "presence_penalty")?;
    validate_range(req.frequency_penalty, -2.0, 2.0, "frequency_penalty")?;

    if let Some(n) = req.n
        && !(1..=10).contains(&n)
    {
        return Err(ApiError::validation_param(
            format!("n must be between 1 and 10, got {n}"),
            "n",
        ));
    }
    if let Some(stop) = &req.stop
        && stop.as_vec().len() > MAX_STOP_SEQUENCES
    {
        return Err(ApiError::validation_param(
            format!("stop accepts at most {MAX_STOP_SEQUENCES} sequences"),
            "stop",
        ));
    }
    if let Some(max_tokens) = req.max_tokens
        && max_tokens == 0
    {
        return Err(ApiError::validation_param(
            "max_tokens must be greater than 0",
            "max_tokens",
        ));
    }

    Ok(())
}

fn validate_content(content: &WireContent, index: usize) -> Result<(), ApiError> {
    match content {
        WireContent::Text(text) => {
            if text.len() > MAX_MESSAGE_CHARS {
                return Err(ApiError::validation_param(
                    format!("message {index} exceeds {MAX_MESSAGE_CHARS} characters"),
                    format!("messages[{index}].content"),
                ));
            }
        }
        WireContent::Parts(parts) => {
            let mut total_text = 0;
            let mut images = 0;
            for part in parts {
                match part {
                    WirePart::Text { text } => {
                        if text.is_empty() {
                            return Err(ApiError::validation_param(
                                format!("empty text part in message {index}"),
                                format!("messages[{index}].content"),
                            ));
                        }
                        total_text += text.len();
                    }
                    WirePart::ImageUrl { image_url } => {
                        images += 1;
                        validate_image_url(&image_url.url, index)?;
                    }
                }
            }
            if total_text > MAX_MESSAGE_CHARS {
                return Err(ApiError::validation_param(
                    format!("message {index} exceeds {MAX_MESSAGE_CHARS} characters"),
                    format!("messages[{index}].content"),
                ));
            }
            if images > MAX_IMAGES_PER_MESSAGE {
                return Err(ApiError::validation_param(
                    format!("message {index} has {images} images, maximum is {MAX_IMAGES_PER_MESSAGE}"),
                    format!("messages[{index}].content"),
                ));
            }
        }
    }
    Ok(())
}

/// Accepted image references: base64 data URI, http(s) URL, file URL, or a
/// plain path — URLs and paths must end in an allow-listed image extension.
fn validate_image_url(url: &str, index: usize) -> Result<(), ApiError> {
    if url.is_empty() {
        return Err(ApiError::validation_param(
            format!("empty image url in message {index}"),
            format!("messages[{index}].content"),
        ));
    }
    if let Some(rest) = url.strip_prefix("data:") {
        let valid = IMAGE_EXTENSIONS
            .iter()
            .any(|ext| rest.starts_with(&format!("image/{ext};base64,")));
        if valid {
            return Ok(());
        }
        return Err(ApiError::validation_param(
            format!("unsupported data URI in message {index}"),
            format!("messages[{index}].content"),
        ));
    }

    let path = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("https://"))
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let has_image_extension = path
        .rsplit('.')
        .next()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if has_image_extension {
        Ok(())
    } else {
        Err(ApiError::validation_param(
            format!("image url in message {index} must end in one of {IMAGE_EXTENSIONS:?}"),
            format!("messages[{index}].content"),
        ))
    }
}

fn validate_range(value: Option<f64>, min: f64, max: f64, name: &str) -> Result<(), ApiError> {
    if let Some(v) = value
        && !(min..=max).contains(&v)
    {
        return Err(ApiError::validation_param(
            format!("{name} must be between {min} and {max}, got {v}"),
            name,
        ));
    }
    Ok(())
}
