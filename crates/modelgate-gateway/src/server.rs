use std::net::SocketAddr;
use std::sync::Arc;

use std::time::Duration;

use modelgate_core::{MetricsCollector, MetricsSnapshot};
use modelgate_pool::PoolManager;
use modelgate_tools::{TOOL_TIMEOUT, ToolRegistry};
use tokio::sync::{Semaphore, watch};

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub manager: Arc<PoolManager>,
    pub registry: Arc<ToolRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub metrics_rx: watch::Receiver<MetricsSnapshot>,
    pub limiter: Arc<Semaphore>,
    pub tool_timeout: Duration,
}

impl AppState {
    pub(crate) fn new(
        manager: Arc<PoolManager>,
        registry: Arc<ToolRegistry>,
        max_concurrent: usize,
        tool_timeout: Duration,
    ) -> Self {
        let (metrics, metrics_rx) = MetricsCollector::new();
        Self {
            manager,
            registry,
            metrics: Arc::new(metrics),
            metrics_rx,
            limiter: Arc::new(Semaphore::new(max_concurrent)),
            tool_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(manager: Arc<PoolManager>, registry: Arc<ToolRegistry>) -> Self {
        Self::new(manager, registry, 64, TOOL_TIMEOUT)
    }
}

pub struct GatewayServer {
    addr: SocketAddr,
    max_concurrent: usize,
    max_body_bytes: usize,
    tool_timeout: Duration,
    manager: Arc<PoolManager>,
    registry: Arc<ToolRegistry>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        manager: Arc<PoolManager>,
        registry: Arc<ToolRegistry>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        Self {
            addr,
            max_concurrent: 64,
            max_body_bytes: 8 * 1024 * 1024,
            tool_timeout: TOOL_TIMEOUT,
            manager,
            registry,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.max_concurrent = cap;
        self
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Start the HTTP gateway and serve until the shutdown flag flips.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or hits a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState::new(
            self.manager,
            self.registry,
            self.max_concurrent,
            self.tool_timeout,
        );
        let router = build_router(state, self.max_body_bytes);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
