use serde::Deserialize;

use crate::capabilities::ModelCapabilities;
use crate::pool::ModelPool;

/// Ranking key for candidate ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Descending capability score.
    #[default]
    Capabilities,
    /// Ascending last response time.
    Performance,
    /// Descending max input tokens.
    Tokens,
    /// Descending success rate.
    Health,
}

/// Request-scoped filter and ranking specification. Built per request,
/// discarded after selection.
#[derive(Clone, Debug, Default)]
pub struct ModelCriteria {
    pub preferred: Vec<String>,
    pub require_vision: bool,
    pub require_tools: bool,
    pub require_streaming: bool,
    pub min_context_tokens: i64,
    pub excluded: Vec<String>,
    pub sort: SortKey,
}

/// Pick exactly one model from the pool, or none.
///
/// Only primary and secondary tiers are eligible; fallback and unhealthy
/// models are never auto-selected. Preferred ids narrow softly: when none
/// match the filtered set, the full filtered set stays in play. The sort is
/// stable, so ties keep population order — repeated calls on the same
/// snapshot return the same model.
#[must_use]
pub fn select(pool: &ModelPool, criteria: &ModelCriteria) -> Option<ModelCapabilities> {
    let mut candidates: Vec<&ModelCapabilities> = pool
        .primary
        .iter()
        .chain(&pool.secondary)
        .filter(|c| {
            c.is_healthy
                && (!criteria.require_vision || c.supports_vision)
                && (!criteria.require_tools || c.supports_tools)
                && (!criteria.require_streaming || c.supports_streaming)
                && c.context_window >= criteria.min_context_tokens
                && !criteria.excluded.iter().any(|x| x == &c.id)
        })
        .collect();

    if !criteria.preferred.is_empty() {
        let matching: Vec<&ModelCapabilities> = candidates
            .iter()
            .copied()
            .filter(|c| criteria.preferred.iter().any(|p| p == &c.id))
            .collect();
        if !matching.is_empty() {
            candidates = matching;
        }
    }

    match criteria.sort {
        SortKey::Capabilities => {
            candidates.sort_by(|a, b| b.capability_score().total_cmp(&a.capability_score()));
        }
        SortKey::Performance => {
            candidates.sort_by_key(|c| c.last_response_ms.unwrap_or(u64::MAX));
        }
        SortKey::Tokens => candidates.sort_by(|a, b| b.max_input_tokens.cmp(&a.max_input_tokens)),
        SortKey::Health => candidates.sort_by(|a, b| {
            b.success_rate
                .unwrap_or(0.0)
                .total_cmp(&a.success_rate.unwrap_or(0.0))
        }),
    }

    candidates.first().map(|c| (*c).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::probe;
    use modelgate_llm::AnyBackend;
    use modelgate_llm::mock::MockModel;

    fn probed(id: &str, max_input: i64) -> ModelCapabilities {
        probe(AnyBackend::Mock(MockModel::new(id).with_limits(max_input, None)))
    }

    fn sample_pool() -> ModelPool {
        ModelPool::build(vec![
            probed("gpt-4o", 128_000),           // primary
            probed("mistral-large", 32_000),     // secondary (tools)
            probed("textonly-small", 8000),      // fallback
            probed("broken-claude", 0),          // unhealthy
        ])
    }

    #[test]
    fn never_selects_fallback_or_unhealthy() {
        let pool = sample_pool();
        let picked = select(&pool, &ModelCriteria::default()).unwrap();
        assert_ne!(picked.id, "textonly-small");
        assert_ne!(picked.id, "broken-claude");
    }

    #[test]
    fn empty_pool_returns_none() {
        let pool = ModelPool::default();
        assert!(select(&pool, &ModelCriteria::default()).is_none());
    }

    #[test]
    fn vision_requirement_filters() {
        let pool = sample_pool();
        let criteria = ModelCriteria {
            require_vision: true,
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "gpt-4o");
    }

    #[test]
    fn min_context_filters() {
        let pool = sample_pool();
        let criteria = ModelCriteria {
            min_context_tokens: 64_001,
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "gpt-4o");

        let criteria = ModelCriteria {
            min_context_tokens: 200_000,
            ..Default::default()
        };
        assert!(select(&pool, &criteria).is_none());
    }

    #[test]
    fn excluded_ids_removed() {
        let pool = sample_pool();
        let criteria = ModelCriteria {
            excluded: vec!["gpt-4o".into()],
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "mistral-large");
    }

    #[test]
    fn preference_narrows_softly() {
        let pool = sample_pool();
        let criteria = ModelCriteria {
            preferred: vec!["mistral-large".into()],
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "mistral-large");

        // No preferred id matches: fall back to the full filtered set.
        let criteria = ModelCriteria {
            preferred: vec!["nonexistent".into()],
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "gpt-4o");
    }

    #[test]
    fn preference_never_resurrects_filtered_models() {
        let pool = sample_pool();
        let criteria = ModelCriteria {
            preferred: vec!["textonly-small".into()],
            ..Default::default()
        };
        // Preferred model sits in fallback; preference must not pull it in.
        assert_ne!(select(&pool, &criteria).unwrap().id, "textonly-small");
    }

    #[test]
    fn sort_by_tokens() {
        let pool = ModelPool::build(vec![
            probed("mistral-small", 32_000),
            probed("mistral-huge", 120_000),
        ]);
        let criteria = ModelCriteria {
            sort: SortKey::Tokens,
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "mistral-huge");
    }

    #[test]
    fn sort_by_performance_prefers_fast_sampled() {
        let mut slow = probed("mistral-slow", 32_000);
        slow.last_response_ms = Some(900);
        let mut fast = probed("mistral-fast", 32_000);
        fast.last_response_ms = Some(90);
        let pool = ModelPool::build(vec![slow, fast]);
        let criteria = ModelCriteria {
            sort: SortKey::Performance,
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "mistral-fast");
    }

    #[test]
    fn sort_by_health_prefers_high_success_rate() {
        let mut flaky = probed("mistral-flaky", 32_000);
        flaky.success_rate = Some(0.2);
        let mut solid = probed("mistral-solid", 32_000);
        solid.success_rate = Some(0.99);
        let pool = ModelPool::build(vec![flaky, solid]);
        let criteria = ModelCriteria {
            sort: SortKey::Health,
            ..Default::default()
        };
        assert_eq!(select(&pool, &criteria).unwrap().id, "mistral-solid");
    }

    #[test]
    fn selection_is_deterministic() {
        let pool = sample_pool();
        let criteria = ModelCriteria::default();
        let first = select(&pool, &criteria).unwrap();
        for _ in 0..10 {
            assert_eq!(select(&pool, &criteria).unwrap().id, first.id);
        }
    }

    #[test]
    fn tied_scores_keep_pool_order() {
        let pool = ModelPool::build(vec![
            probed("mistral-one", 32_000),
            probed("mistral-two", 32_000),
        ]);
        let picked = select(&pool, &ModelCriteria::default()).unwrap();
        assert_eq!(picked.id, "mistral-one");
    }
}
