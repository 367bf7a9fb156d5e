//! 刷新调度：启动时同步加载一次，之后（若开启）按固定间隔重新加载并调和
//!
//! 启动加载失败是致命的；周期加载失败只记录日志，继续沿用上一份配置。
//! 每次 tick 都等待调和完成后才进入下一次，调和永远不会并发执行。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::{HostError, ReconcileSummary, ReconciliationEngine};
use crate::source::{ConfigSource, SourceArgs};

/// 一次周期刷新的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 快照与上一次应用的相同，跳过调和
    Unchanged,
    Applied(ReconcileSummary),
    /// 加载失败，保留原配置
    LoadFailed,
}

pub struct RefreshScheduler {
    source: Arc<dyn ConfigSource>,
    args: SourceArgs,
    engine: Arc<ReconciliationEngine>,
    refresh_interval: Option<Duration>,
}

impl RefreshScheduler {
    /// `refresh_interval` 为 None 时不做周期刷新
    pub fn new(
        source: Arc<dyn ConfigSource>,
        args: SourceArgs,
        engine: Arc<ReconciliationEngine>,
        refresh_interval: Option<Duration>,
    ) -> Self {
        Self {
            source,
            args,
            engine,
            refresh_interval,
        }
    }

    /// 启动时的首次加载与调和（从空状态开始）
    pub async fn bootstrap(&self) -> Result<ReconcileSummary, HostError> {
        tracing::info!(source = self.source.name(), "Loading config...");
        let snapshot = self
            .source
            .read(&self.args)
            .await
            .map_err(HostError::InitialLoad)?;
        tracing::info!("Loaded config:\n{}", snapshot);

        Ok(self.engine.apply_configuration(snapshot).await)
    }

    pub async fn refresh_once(&self) -> RefreshOutcome {
        let snapshot = match self.source.read(&self.args).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    source = self.source.name(),
                    error = %e,
                    "Failed to reload config, keeping previous configuration"
                );
                return RefreshOutcome::LoadFailed;
            }
        };

        if self.engine.is_current(&snapshot).await {
            tracing::debug!("Config unchanged");
            return RefreshOutcome::Unchanged;
        }

        tracing::info!("Config changed:\n{}", snapshot);
        RefreshOutcome::Applied(self.engine.apply_configuration(snapshot).await)
    }

    /// 周期刷新直到 shutdown 被取消；未开启刷新时只等待 shutdown
    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(period) = self.refresh_interval else {
            tracing::debug!("Config refreshing disabled");
            shutdown.cancelled().await;
            return;
        };

        tracing::info!("Config refreshing every {:?}", period);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
            }
        }
        tracing::debug!("Config refreshing stopped");
    }
}
