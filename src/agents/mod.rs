//! Agent 能力接口与内置 Agent
//!
//! 每个 Agent 实现 Agent trait（name / initialize / reconfigure / close），由 AgentRegistry 按名注册，
//! 调和引擎只通过这三个生命周期操作驱动 Agent；Agent 自己负责内部并发（如后台循环）直到 close。

pub mod letter;
pub mod number;
pub mod printer;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::AgentConfigEntry;

pub use letter::LetterPrinterAgent;
pub use number::NumberPrinterAgent;
pub use printer::PrinterAgent;
pub use registry::{builtin_providers, AgentProvider, AgentRegistry};

/// 生命周期操作失败的原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 配置对该 Agent 无效
    #[error("Invalid agent config: {0}")]
    Config(String),

    #[error("Agent startup failed: {0}")]
    Startup(String),

    #[error("Agent shutdown failed: {0}")]
    Shutdown(String),
}

/// Agent 能力：`close` 必须终止 `initialize` 启动的内部活动，且可在其他任务中调用
#[async_trait]
pub trait Agent: Send + Sync {
    /// 注册名（与配置文档中的键一致）
    fn name(&self) -> &str;

    async fn initialize(&self, config: &AgentConfigEntry) -> Result<(), AgentError>;

    async fn reconfigure(&self, config: &AgentConfigEntry) -> Result<(), AgentError>;

    async fn close(&self) -> Result<(), AgentError>;
}
