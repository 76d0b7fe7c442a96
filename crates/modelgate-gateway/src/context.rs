//! Per-request routing context and token estimation.

use modelgate_pool::{ModelCapabilities, ModelCriteria};
use uuid::Uuid;

use crate::wire::{ChatCompletionRequest, WireContent, WirePart};

/// Flat per-image token surcharge used by the pre-dispatch estimate.
pub(crate) const IMAGE_TOKEN_SURCHARGE: i64 = 512;

/// Aggregate state for one request: derived flags, the token estimate, and
/// (after selection) the chosen model. Built once, model bound once.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub requested_model: Option<String>,
    pub stream: bool,
    pub has_images: bool,
    pub has_functions: bool,
    pub estimated_tokens: i64,
    pub selected: Option<ModelCapabilities>,
}

impl RequestContext {
    #[must_use]
    pub fn build(req: &ChatCompletionRequest) -> Self {
        let mut has_images = false;
        let mut estimated_tokens: i64 = 0;
        for message in &req.messages {
            match &message.content {
                WireContent::Text(text) => estimated_tokens += estimate_tokens(text),
                WireContent::Parts(parts) => {
                    for part in parts {
                        match part {
                            WirePart::Text { text } => estimated_tokens += estimate_tokens(text),
                            WirePart::ImageUrl { .. } => {
                                has_images = true;
                                estimated_tokens += IMAGE_TOKEN_SURCHARGE;
                            }
                        }
                    }
                }
            }
        }

        let requested_model = req
            .model
            .as_deref()
            .filter(|m| !m.is_empty() && *m != "auto")
            .map(str::to_owned);

        Self {
            request_id: Uuid::new_v4().to_string(),
            requested_model,
            stream: req.stream,
            has_images,
            has_functions: !req.declared_functions().is_empty(),
            estimated_tokens,
            selected: None,
        }
    }

    /// Derive the selection criteria: capability requirements only where the
    /// request actually demands them, requested id as a soft preference.
    #[must_use]
    pub fn criteria(&self) -> ModelCriteria {
        ModelCriteria {
            preferred: self.requested_model.clone().into_iter().collect(),
            require_vision: self.has_images,
            require_tools: self.has_functions,
            require_streaming: self.stream,
            min_context_tokens: self.estimated_tokens,
            excluded: Vec::new(),
            sort: Default::default(),
        }
    }
}

/// Rough prompt-token estimate: `ceil(len/4)` plus one per structural
/// whitespace character (newline, tab, carriage return).
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn estimate_tokens(text: &str) -> i64 {
    let structural = text
        .chars()
        .filter(|c| matches!(c, '\n' | '\t' | '\r'))
        .count();
    (text.len().div_ceil(4) + structural) as i64
}
