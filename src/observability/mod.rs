//! 可观测性

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogSection;

/// 初始化日志：RUST_LOG 优先，否则使用配置中的级别
pub fn init(log: &LogSection) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(log.ansi))
        .init();
}
