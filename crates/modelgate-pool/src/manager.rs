use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modelgate_llm::{AnySource, ModelBackend, ModelSource};
use tokio::sync::{broadcast, watch};

use crate::capabilities::ModelCapabilities;
use crate::error::PoolError;
use crate::pool::{ModelPool, Tier, classify};
use crate::prober::probe;

/// Tagged pool notifications, delivered over a broadcast channel.
#[derive(Clone, Debug)]
pub enum PoolEvent {
    ModelDiscovered { id: String, tier: Tier },
    HealthChanged { id: String, healthy: bool },
    PoolRefreshed { total: usize },
}

#[derive(Clone, Copy, Debug, Default)]
struct SampleStats {
    successes: u64,
    total: u64,
    last_response_ms: Option<u64>,
}

impl SampleStats {
    #[allow(clippy::cast_precision_loss)]
    fn success_rate(self) -> Option<f64> {
        (self.total > 0).then(|| self.successes as f64 / self.total as f64)
    }
}

/// Owns the discovery loop and the current pool snapshot.
///
/// The snapshot lives in a watch channel: replacement is a single send, so
/// concurrent readers observe either the old or the new fully-built pool.
pub struct PoolManager {
    source: AnySource,
    pool_tx: watch::Sender<Arc<ModelPool>>,
    events: broadcast::Sender<PoolEvent>,
    samples: Mutex<HashMap<String, SampleStats>>,
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

impl PoolManager {
    #[must_use]
    pub fn new(source: AnySource) -> Arc<Self> {
        let (pool_tx, _) = watch::channel(Arc::new(ModelPool::default()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            source,
            pool_tx,
            events,
            samples: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ModelPool> {
        self.pool_tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_pool(&self) -> watch::Receiver<Arc<ModelPool>> {
        self.pool_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn source(&self) -> &AnySource {
        &self.source
    }

    /// Run one full discovery pass: enumerate, probe, re-tier, swap.
    ///
    /// Returns the number of models in the new pool. Membership is fully
    /// recomputed; a per-model probe anomaly is logged and that model
    /// excluded rather than failing the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only when the upstream listing itself fails; the
    /// previous snapshot stays in place in that case.
    pub async fn discover_all(&self) -> Result<usize, PoolError> {
        let handles = self.source.list_models().await?;
        let mut probed = Vec::with_capacity(handles.len());
        for handle in handles {
            if handle.id().is_empty() {
                tracing::warn!("skipping model with empty identifier");
                continue;
            }
            let mut caps = probe(handle);
            self.merge_samples(&mut caps);
            probed.push(caps);
        }

        let pool = ModelPool::build(probed);
        let total = pool.len();
        for caps in pool.iter_all() {
            let _ = self.events.send(PoolEvent::ModelDiscovered {
                id: caps.id.clone(),
                tier: classify(caps),
            });
        }
        self.pool_tx.send_replace(Arc::new(pool));
        let _ = self.events.send(PoolEvent::PoolRefreshed { total });
        tracing::info!(models = total, "pool refreshed");
        Ok(total)
    }

    /// Manual refresh: same discovery pass, run synchronously.
    ///
    /// # Errors
    ///
    /// Propagates the listing failure from [`Self::discover_all`].
    pub async fn refresh(&self) -> Result<usize, PoolError> {
        self.discover_all().await
    }

    /// Periodic liveness pass. Flips `is_healthy` in place; models stay in
    /// their current tier until the next discovery pass re-buckets them.
    pub async fn health_check(&self) {
        let current = self.snapshot();
        let mut flips = Vec::new();
        for caps in current.iter_all() {
            let healthy =
                caps.handle.max_input_tokens() > 0 && caps.handle.reachable().await;
            if healthy != caps.is_healthy {
                flips.push((caps.id.clone(), healthy));
            }
        }
        if flips.is_empty() {
            return;
        }

        self.pool_tx.send_modify(|pool| {
            let updated = Arc::make_mut(pool);
            for (id, healthy) in &flips {
                if let Some(caps) = updated.iter_all_mut().find(|c| &c.id == id) {
                    caps.is_healthy = *healthy;
                    caps.last_tested = std::time::SystemTime::now();
                }
            }
        });
        for (id, healthy) in flips {
            tracing::warn!(model = %id, healthy, "model health changed");
            let _ = self.events.send(PoolEvent::HealthChanged { id, healthy });
        }
    }

    /// Record one request outcome against a model. Feeds the success rate
    /// and response-time fields used by selection.
    pub fn record_sample(&self, id: &str, response_ms: u64, success: bool) {
        {
            let mut samples = self.samples.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = samples.entry(id.to_owned()).or_default();
            entry.total += 1;
            if success {
                entry.successes += 1;
            }
            entry.last_response_ms = Some(response_ms);
        }
        let id = id.to_owned();
        self.pool_tx.send_modify(|pool| {
            let updated = Arc::make_mut(pool);
            if let Some(caps) = updated.iter_all_mut().find(|c| c.id == id) {
                let samples = self
                    .samples
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(stats) = samples.get(&id) {
                    caps.success_rate = stats.success_rate();
                    caps.last_response_ms = stats.last_response_ms;
                }
            }
        });
    }

    fn merge_samples(&self, caps: &mut ModelCapabilities) {
        let samples = self
            .samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(stats) = samples.get(&caps.id) {
            caps.success_rate = stats.success_rate();
            caps.last_response_ms = stats.last_response_ms;
        }
    }

    /// Spawn the two background timers: full rediscovery and health
    /// re-checks. Both stop when the shutdown flag flips.
    pub fn spawn_timers(
        self: &Arc<Self>,
        discovery_interval: Duration,
        health_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let discovery = {
            let manager = Arc::clone(self);
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(discovery_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = manager.discover_all().await {
                                tracing::warn!(error = %e, "scheduled discovery failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };
        let health = {
            let manager = Arc::clone(self);
            let mut shutdown = shutdown_rx;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(health_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => manager.health_check().await,
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };
        vec![discovery, health]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_llm::mock::{MockModel, MockSource};

    fn manager_with(models: Vec<MockModel>) -> Arc<PoolManager> {
        PoolManager::new(AnySource::Mock(MockSource::new(models)))
    }

    #[tokio::test]
    async fn discovery_builds_tiers_and_emits_events() {
        let manager = manager_with(vec![
            MockModel::new("gpt-4o").with_limits(128_000, None),
            MockModel::new("textonly").with_limits(8000, None),
        ]);
        let mut events = manager.subscribe_events();

        let total = manager.discover_all().await.unwrap();
        assert_eq!(total, 2);

        let pool = manager.snapshot();
        assert_eq!(pool.primary.len(), 1);
        assert_eq!(pool.fallback.len(), 1);

        let mut saw_refresh = false;
        let mut discovered = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                PoolEvent::ModelDiscovered { .. } => discovered += 1,
                PoolEvent::PoolRefreshed { total } => {
                    saw_refresh = true;
                    assert_eq!(total, 2);
                }
                PoolEvent::HealthChanged { .. } => {}
            }
        }
        assert_eq!(discovered, 2);
        assert!(saw_refresh);
    }

    #[tokio::test]
    async fn listing_failure_keeps_previous_snapshot() {
        let manager = manager_with(vec![MockModel::new("m").with_limits(8000, None)]);
        manager.discover_all().await.unwrap();
        assert_eq!(manager.snapshot().len(), 1);

        let failing = PoolManager::new(AnySource::Mock(MockSource::failing()));
        assert!(failing.discover_all().await.is_err());
        assert_eq!(failing.snapshot().len(), 0);
    }

    #[tokio::test]
    async fn refresh_returns_count() {
        let manager = manager_with(vec![
            MockModel::new("a").with_limits(8000, None),
            MockModel::new("b").with_limits(8000, None),
            MockModel::new("c").with_limits(8000, None),
        ]);
        assert_eq!(manager.refresh().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn health_check_flips_without_retiering() {
        let manager = manager_with(vec![
            MockModel::new("mistral-big")
                .with_limits(32_000, None)
                .unreachable(),
        ]);
        manager.discover_all().await.unwrap();
        // Discovered healthy (limits positive); liveness probe then fails.
        assert_eq!(manager.snapshot().secondary.len(), 1);
        assert!(manager.snapshot().secondary[0].is_healthy);

        let mut events = manager.subscribe_events();
        manager.health_check().await;

        let pool = manager.snapshot();
        // Still in secondary: re-tiering waits for the next discovery pass.
        assert_eq!(pool.secondary.len(), 1);
        assert!(!pool.secondary[0].is_healthy);
        assert!(matches!(
            events.try_recv().unwrap(),
            PoolEvent::HealthChanged { healthy: false, .. }
        ));
    }

    #[tokio::test]
    async fn rediscovery_rebuckets_unhealthy_models() {
        let manager = manager_with(vec![
            MockModel::new("mistral-big")
                .with_limits(32_000, None)
                .unreachable(),
        ]);
        manager.discover_all().await.unwrap();
        manager.health_check().await;
        assert!(!manager.snapshot().secondary[0].is_healthy);

        // Next discovery probes limits again (positive) and re-tiers.
        manager.discover_all().await.unwrap();
        assert_eq!(manager.snapshot().secondary.len(), 1);
        assert!(manager.snapshot().secondary[0].is_healthy);
    }

    #[tokio::test]
    async fn samples_survive_rediscovery() {
        let manager = manager_with(vec![MockModel::new("m").with_limits(8000, None)]);
        manager.discover_all().await.unwrap();

        manager.record_sample("m", 120, true);
        manager.record_sample("m", 80, false);

        let pool = manager.snapshot();
        let caps = pool.find("m").unwrap();
        assert!((caps.success_rate.unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(caps.last_response_ms, Some(80));

        manager.discover_all().await.unwrap();
        let caps = manager.snapshot().find("m").unwrap().clone();
        assert!((caps.success_rate.unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn empty_id_excluded_not_fatal() {
        let manager = manager_with(vec![
            MockModel::new(""),
            MockModel::new("ok").with_limits(8000, None),
        ]);
        assert_eq!(manager.discover_all().await.unwrap(), 1);
    }
}
