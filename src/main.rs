//! Hive - 可插拔 Agent 宿主
//!
//! 入口：解析参数、加载宿主配置与日志、首次加载 Agent 配置，然后按需周期刷新，直到收到关闭信号。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hive::agents::{builtin_providers, AgentRegistry};
use hive::config::load_config;
use hive::core::{
    run_with_graceful_shutdown, AgentShutdown, ReconciliationEngine, RefreshScheduler,
    ShutdownCoordinator, ShutdownManager,
};
use hive::launch::LaunchArgs;
use hive::observability;
use hive::source::SourceRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = LaunchArgs::parse();

    let host_config =
        load_config(args.host_config.clone()).context("Failed to load host config")?;
    observability::init(&host_config.log);

    let source_args = args.source_args()?;
    let provider = args
        .config_provider
        .clone()
        .unwrap_or_else(|| host_config.host.default_provider.clone());
    let source = SourceRegistry::with_builtin().resolve(&provider)?;

    let registry = Arc::new(AgentRegistry::discover(&builtin_providers()));
    let engine = Arc::new(ReconciliationEngine::new(registry));

    let refreshing = args.config_refreshing || host_config.host.refreshing;
    let interval_secs = args
        .refresh_interval_secs
        .unwrap_or(host_config.host.refresh_interval_secs);
    let refresh_interval = refreshing.then(|| Duration::from_secs(interval_secs.max(1)));

    let shutdown_manager = Arc::new(ShutdownManager::new());
    shutdown_manager.install_signal_handlers();

    let scheduler = RefreshScheduler::new(source, source_args, engine.clone(), refresh_interval);
    scheduler
        .bootstrap()
        .await
        .context("Failed to load initial configuration")?;

    let mut coordinator =
        ShutdownCoordinator::new().with_timeout(host_config.host.shutdown_grace_secs);
    coordinator.register(AgentShutdown::new(engine));

    let mut reasons = shutdown_manager.subscribe();
    tokio::spawn(async move {
        if let Ok(reason) = reasons.recv().await {
            tracing::info!(?reason, "Shutting down");
        }
    });

    let token = shutdown_manager.token();
    run_with_graceful_shutdown(shutdown_manager, scheduler.run(token), || {
        coordinator.run_cleanup()
    })
    .await;

    Ok(())
}
