//! 宿主配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__HOST__REFRESH_INTERVAL_SECS=30`）。
//! 这里只是宿主自身的运行参数；Agent 配置文档由配置源（file / http）单独加载。

use std::path::PathBuf;

use serde::Deserialize;

/// 宿主配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub log: LogSection,
}

/// [host] 段：配置源、刷新、关闭宽限期
#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    /// 未通过 --config-provider 指定时使用的配置源
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// 未传 --config-refreshing 时是否开启周期刷新
    #[serde(default)]
    pub refreshing: bool,
    /// 周期刷新间隔（秒）
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// 关闭时等待 Agent close 的宽限期（秒）
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_provider() -> String {
    "file".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            refreshing: false,
            refresh_interval_secs: default_refresh_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// [log] 段：默认日志级别（RUST_LOG 优先）与是否彩色输出
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_ansi(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<HostConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
