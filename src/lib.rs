//! Hive - 可插拔 Agent 宿主
//!
//! 模块划分：
//! - **agents**: Agent 生命周期接口、注册表、内置打印 Agent
//! - **config**: 宿主配置加载（TOML + 环境变量）
//! - **core**: 调和引擎、刷新调度、优雅关闭
//! - **launch**: 命令行参数
//! - **observability**: 日志初始化
//! - **snapshot**: 配置快照与单个 Agent 配置项
//! - **source**: 配置源（file / http）

pub mod agents;
pub mod config;
pub mod core;
pub mod launch;
pub mod observability;
pub mod snapshot;
pub mod source;

pub use agents::{Agent, AgentError, AgentRegistry};
pub use core::{HostError, ReconciliationEngine, RefreshScheduler};
pub use snapshot::{AgentConfigEntry, ApplicationConfigSnapshot};
pub use source::{ConfigSource, LoadError, SourceRegistry};
