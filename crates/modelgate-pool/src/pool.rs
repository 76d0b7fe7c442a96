use std::time::SystemTime;

use serde::Serialize;

use crate::capabilities::ModelCapabilities;

/// Coarse health + capability bucket, recomputed on every discovery pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
    Fallback,
    Unhealthy,
}

const SECONDARY_CONTEXT_THRESHOLD: i64 = 64_000;

/// Classification rule, evaluated in order.
#[must_use]
pub fn classify(caps: &ModelCapabilities) -> Tier {
    if !caps.is_healthy {
        Tier::Unhealthy
    } else if caps.supports_vision && caps.supports_tools {
        Tier::Primary
    } else if caps.supports_tools || caps.context_window > SECONDARY_CONTEXT_THRESHOLD {
        Tier::Secondary
    } else {
        Tier::Fallback
    }
}

/// Immutable snapshot of every discovered model, partitioned into four
/// disjoint tiers. Replaced wholesale by the manager; never patched.
#[derive(Clone, Debug)]
pub struct ModelPool {
    pub primary: Vec<ModelCapabilities>,
    pub secondary: Vec<ModelCapabilities>,
    pub fallback: Vec<ModelCapabilities>,
    pub unhealthy: Vec<ModelCapabilities>,
    pub updated_at: SystemTime,
}

impl Default for ModelPool {
    fn default() -> Self {
        Self {
            primary: Vec::new(),
            secondary: Vec::new(),
            fallback: Vec::new(),
            unhealthy: Vec::new(),
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }
}

impl ModelPool {
    /// Build a pool from probed models: classify, then sort each tier
    /// descending by capability score. The sort is stable, so equal scores
    /// keep population order.
    #[must_use]
    pub fn build(models: Vec<ModelCapabilities>) -> Self {
        let mut pool = Self {
            updated_at: SystemTime::now(),
            ..Self::default()
        };
        for caps in models {
            match classify(&caps) {
                Tier::Primary => pool.primary.push(caps),
                Tier::Secondary => pool.secondary.push(caps),
                Tier::Fallback => pool.fallback.push(caps),
                Tier::Unhealthy => pool.unhealthy.push(caps),
            }
        }
        for tier in [
            &mut pool.primary,
            &mut pool.secondary,
            &mut pool.fallback,
            &mut pool.unhealthy,
        ] {
            tier.sort_by(|a, b| b.capability_score().total_cmp(&a.capability_score()));
        }
        pool
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &ModelCapabilities> {
        self.primary
            .iter()
            .chain(&self.secondary)
            .chain(&self.fallback)
            .chain(&self.unhealthy)
    }

    pub fn iter_all_mut(&mut self) -> impl Iterator<Item = &mut ModelCapabilities> {
        self.primary
            .iter_mut()
            .chain(&mut self.secondary)
            .chain(&mut self.fallback)
            .chain(&mut self.unhealthy)
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ModelCapabilities> {
        self.iter_all().find(|c| c.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len() + self.fallback.len() + self.unhealthy.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn tier_counts(&self) -> [(Tier, usize); 4] {
        [
            (Tier::Primary, self.primary.len()),
            (Tier::Secondary, self.secondary.len()),
            (Tier::Fallback, self.fallback.len()),
            (Tier::Unhealthy, self.unhealthy.len()),
        ]
    }
}
