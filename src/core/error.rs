//! 宿主级错误
//!
//! 只有这些错误会终止进程；单个 Agent 的生命周期失败由调和引擎记录后吞掉，不会出现在这里。

use thiserror::Error;

use crate::source::LoadError;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("No configuration source registered under name \"{0}\"")]
    SourceNotFound(String),

    /// 启动时无法加载配置（致命）
    #[error("Failed to load initial configuration: {0}")]
    InitialLoad(#[source] LoadError),

    #[error("Agent \"{0}\" is already registered")]
    DuplicateAgent(String),

    #[error("Invalid launch arguments: {0}")]
    InvalidArgs(String),
}
