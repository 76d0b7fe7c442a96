use std::time::Instant;

use tokio::sync::watch;

/// Point-in-time view of gateway activity, published over a watch channel so
/// the status handler reads a consistent snapshot without locking.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub streaming_requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub last_latency_ms: u64,
}

pub struct MetricsCollector {
    tx: watch::Sender<MetricsSnapshot>,
    started_at: Instant,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<MetricsSnapshot>) {
        let (tx, rx) = watch::channel(MetricsSnapshot::default());
        (
            Self {
                tx,
                started_at: Instant::now(),
            },
            rx,
        )
    }

    pub fn update(&self, f: impl FnOnce(&mut MetricsSnapshot)) {
        self.tx.send_modify(f);
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
