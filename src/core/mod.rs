//! 核心层：宿主错误、调和引擎、刷新调度、优雅关闭

pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod shutdown;

pub use error::HostError;
pub use reconciler::{plan_transition, ReconcileSummary, ReconciliationEngine, Transition};
pub use scheduler::{RefreshOutcome, RefreshScheduler};
pub use shutdown::{
    run_with_graceful_shutdown, AgentShutdown, ShutdownCleanup, ShutdownCoordinator,
    ShutdownManager, ShutdownReason,
};
