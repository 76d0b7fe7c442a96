use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use modelgate_core::Config;
use modelgate_gateway::GatewayServer;
use modelgate_llm::AnySource;
use modelgate_llm::upstream::HttpSource;
use modelgate_pool::PoolManager;
use modelgate_tools::ToolRegistry;
use tokio::sync::watch;

fn resolve_config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("modelgate.toml"), PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = resolve_config_path();
    let config = Config::load(&config_path).context("failed to load configuration")?;
    tracing::info!(path = %config_path.display(), "configuration loaded");

    let source = HttpSource::new(
        config.upstream.base_url.clone(),
        config.upstream.api_key.clone().unwrap_or_default(),
        config.upstream.vendor.clone(),
    );
    let manager = PoolManager::new(AnySource::Http(source));

    match manager.discover_all().await {
        Ok(count) => tracing::info!(models = count, "initial discovery complete"),
        Err(e) => tracing::warn!(error = %e, "initial discovery failed, pool starts empty"),
    }

    let registry = Arc::new(ToolRegistry::new());
    let workdir = std::env::current_dir().context("cannot determine working directory")?;
    modelgate_tools::register_builtins(&registry, workdir)
        .context("failed to register built-in tools")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let timers = manager.spawn_timers(
        config.discovery_interval(),
        config.health_check_interval(),
        shutdown_rx.clone(),
    );

    let server = GatewayServer::new(
        &config.server.host,
        config.server.port,
        Arc::clone(&manager),
        registry,
        shutdown_rx,
    )
    .with_concurrency_cap(config.server.max_concurrent_requests)
    .with_max_body_bytes(config.server.max_body_bytes)
    .with_tool_timeout(config.tool_timeout());

    server.serve().await.context("gateway server failed")?;

    for timer in timers {
        timer.abort();
    }
    tracing::info!("modelgate stopped");
    Ok(())
}
