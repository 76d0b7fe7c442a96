use std::time::SystemTime;

use modelgate_llm::{AnyBackend, ModelBackend};

use crate::capabilities::{ImageLimits, ModelCapabilities, split_family_version};

/// Identifier substrings that mark a model family as vision-capable.
///
/// Heuristic by design: new families ship under names this list has never
/// seen, so false negatives are possible. That accuracy gap is accepted
/// rather than patched with a different guess.
const VISION_HINTS: &[&str] = &[
    "vision", "gpt-4o", "gpt-4.1", "gpt-5", "omni", "claude-3", "claude-4", "sonnet", "opus",
    "haiku", "gemini", "llava", "pixtral", "qwen-vl", "-4v",
];

/// Identifier substrings that mark a model family as tool/function-capable.
const TOOL_HINTS: &[&str] = &[
    "gpt-4", "gpt-5", "gpt-3.5-turbo", "claude", "gemini", "mistral", "command", "qwen",
    "llama-3", "llama3", "hermes", "tool", "o1", "o3",
];

const INFERRED_OUTPUT_CEILING: i64 = 4096;
const IMAGE_FORMATS: &[&str] = &["png", "jpeg", "jpg", "gif", "webp"];
const MAX_IMAGES_PER_REQUEST: u32 = 10;
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Build a `ModelCapabilities` record for one backend model.
///
/// Never fails: every sub-test that cannot complete degrades its flag
/// instead of aborting discovery. A non-positive reported input limit
/// marks the model unhealthy.
#[must_use]
pub fn probe(handle: AnyBackend) -> ModelCapabilities {
    let id = handle.id().to_owned();
    let lowered = id.to_lowercase();
    let (family, version) = split_family_version(&id);

    let max_input = handle.max_input_tokens();
    let is_healthy = max_input > 0;

    let supports_vision = VISION_HINTS.iter().any(|hint| lowered.contains(hint));
    let supports_tools = TOOL_HINTS.iter().any(|hint| lowered.contains(hint));

    // Inference rules, applied in order after testing.
    let max_output = handle.reported_max_output_tokens().map_or_else(
        || (max_input / 2).min(INFERRED_OUTPUT_CEILING).max(0),
        i64::from,
    );
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_output_tokens = max_output.min(max_input.max(0)) as u32;

    let image_limits = supports_vision.then(|| ImageLimits {
        formats: IMAGE_FORMATS.to_vec(),
        max_images_per_request: MAX_IMAGES_PER_REQUEST,
        max_image_bytes: MAX_IMAGE_BYTES,
    });

    ModelCapabilities {
        vendor: handle.vendor().to_owned(),
        id,
        family,
        version,
        max_input_tokens: max_input,
        max_output_tokens,
        context_window: max_input,
        supports_vision,
        supports_tools,
        supports_streaming: true,
        multimodal: supports_vision,
        image_limits,
        is_healthy,
        last_tested: SystemTime::now(),
        last_response_ms: None,
        success_rate: None,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_llm::mock::MockModel;

    fn probe_mock(model: MockModel) -> ModelCapabilities {
        probe(AnyBackend::Mock(model))
    }

    #[test]
    fn output_limit_inferred_when_absent() {
        let caps = probe_mock(MockModel::new("m").with_limits(16_000, None));
        assert_eq!(caps.max_output_tokens, 4096);

        let caps = probe_mock(MockModel::new("m").with_limits(4000, None));
        assert_eq!(caps.max_output_tokens, 2000);
    }

    #[test]
    fn output_never_exceeds_input() {
        let caps = probe_mock(MockModel::new("m").with_limits(2000, Some(999_999)));
        assert!(i64::from(caps.max_output_tokens) <= caps.max_input_tokens);
    }

    #[test]
    fn context_window_equals_max_input() {
        let caps = probe_mock(MockModel::new("m").with_limits(123_456, Some(100)));
        assert_eq!(caps.context_window, caps.max_input_tokens);
    }

    #[test]
    fn vision_hint_sets_image_limits() {
        let caps = probe_mock(MockModel::new("gpt-4o-mini"));
        assert!(caps.supports_vision);
        assert!(caps.multimodal);
        let limits = caps.image_limits.unwrap();
        assert_eq!(limits.max_images_per_request, 10);
        assert!(limits.formats.contains(&"png"));
    }

    #[test]
    fn unknown_family_degrades_to_no_vision() {
        let caps = probe_mock(MockModel::new("textonly-7b"));
        assert!(!caps.supports_vision);
        assert!(caps.image_limits.is_none());
    }

    #[test]
    fn tool_hint_detected() {
        assert!(probe_mock(MockModel::new("claude-sonnet-4")).supports_tools);
        assert!(probe_mock(MockModel::new("llama-3-70b")).supports_tools);
        assert!(!probe_mock(MockModel::new("textonly-7b")).supports_tools);
    }

    #[test]
    fn non_positive_limit_marks_unhealthy() {
        let caps = probe_mock(MockModel::new("m").with_limits(0, None));
        assert!(!caps.is_healthy);
        assert_eq!(caps.max_output_tokens, 0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let caps = probe_mock(MockModel::new("GPT-4O"));
        assert!(caps.supports_vision);
    }
}
