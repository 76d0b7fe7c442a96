use std::time::SystemTime;

use modelgate_llm::AnyBackend;

/// Image acceptance limits applied to vision-capable models.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageLimits {
    pub formats: Vec<&'static str>,
    pub max_images_per_request: u32,
    pub max_image_bytes: u64,
}

/// Everything the gateway knows about one backend model.
///
/// Created by the prober during discovery and replaced wholesale on every
/// discovery pass. After creation only `is_healthy` (health checks) and the
/// performance fields (sampling) are mutated.
#[derive(Clone, Debug)]
pub struct ModelCapabilities {
    pub id: String,
    pub family: String,
    pub vendor: String,
    pub version: Option<String>,

    pub max_input_tokens: i64,
    pub max_output_tokens: u32,
    pub context_window: i64,

    pub supports_vision: bool,
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub multimodal: bool,
    pub image_limits: Option<ImageLimits>,

    pub is_healthy: bool,
    pub last_tested: SystemTime,
    pub last_response_ms: Option<u64>,
    pub success_rate: Option<f64>,

    pub handle: AnyBackend,
}

impl ModelCapabilities {
    /// Weighted ranking score: token capacity, feature flags, and recent
    /// success rate (0.5 assumed when no samples exist yet).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn capability_score(&self) -> f64 {
        let mut score = self.max_input_tokens as f64 / 1000.0;
        if self.supports_vision {
            score += 50.0;
        }
        if self.supports_tools {
            score += 30.0;
        }
        if self.multimodal {
            score += 20.0;
        }
        score + 100.0 * self.success_rate.unwrap_or(0.5)
    }
}

/// Split a model identifier into family and trailing version, e.g.
/// `llama-3.1-70b` → (`llama`, `3.1-70b`). Identifiers without a
/// digit-leading segment have no version.
#[must_use]
pub fn split_family_version(id: &str) -> (String, Option<String>) {
    let id = id.rsplit('/').next().unwrap_or(id);
    for (i, segment) in id.split('-').enumerate() {
        if i > 0 && segment.starts_with(|c: char| c.is_ascii_digit()) {
            let family = id.split('-').take(i).collect::<Vec<_>>().join("-");
            let version = id.splitn(i + 1, '-').last().unwrap_or("").to_owned();
            return (family, Some(version));
        }
    }
    (id.to_owned(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_llm::mock::MockModel;

    fn caps(vision: bool, tools: bool, max_input: i64, rate: Option<f64>) -> ModelCapabilities {
        ModelCapabilities {
            id: "m".into(),
            family: "m".into(),
            vendor: "mock".into(),
            version: None,
            max_input_tokens: max_input,
            max_output_tokens: 4096,
            context_window: max_input,
            supports_vision: vision,
            supports_tools: tools,
            supports_streaming: true,
            multimodal: vision,
            image_limits: None,
            is_healthy: true,
            last_tested: SystemTime::now(),
            last_response_ms: None,
            success_rate: rate,
            handle: AnyBackend::Mock(MockModel::new("m")),
        }
    }

    #[test]
    fn score_counts_flags_and_tokens() {
        // 100000/1000 + 50 + 30 + 20 + 100*0.5 = 250
        let c = caps(true, true, 100_000, None);
        assert!((c.capability_score() - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn score_uses_observed_success_rate() {
        let c = caps(false, false, 1000, Some(1.0));
        assert!((c.capability_score() - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn family_version_split() {
        assert_eq!(
            split_family_version("llama-3.1-70b"),
            ("llama".into(), Some("3.1-70b".into()))
        );
        assert_eq!(
            split_family_version("gpt-4o"),
            ("gpt".into(), Some("4o".into()))
        );
        assert_eq!(split_family_version("mistral"), ("mistral".into(), None));
    }

    #[test]
    fn family_strips_org_prefix() {
        let (family, _) = split_family_version("meta/llama-3-8b");
        assert_eq!(family, "llama");
    }
}
