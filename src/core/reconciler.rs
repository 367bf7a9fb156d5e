//! 调和引擎：把运行中的 Agent 收敛到新加载的配置快照
//!
//! 引擎独占「运行中 Agent → 最近一次应用的配置」记录与上一次应用的快照。每次 apply_configuration
//! 为每个相关 Agent 计算 启动 / 重配置 / 停止 / 不变，并把生命周期命令投递到该 Agent 的 lane。
//! lane 是按顺序执行单个 Agent 命令的后台任务：慢的 initialize 不会拖住其他 Agent，也不会拖住下一次刷新。
//!
//! 记录是乐观更新的：initialize / reconfigure 失败时仍记为已应用，相同快照不会触发重试，
//! 只有配置再次变化才会再次下发。

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::agents::{Agent, AgentError, AgentRegistry};
use crate::snapshot::{AgentConfigEntry, ApplicationConfigSnapshot};

/// 单个 Agent 在一次调和中的转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    IgnoreDisabled,
    Start,
    Reconfigure,
    Stop,
}

/// 根据已应用的配置（None 表示未运行）与新快照中的条目（None 表示未声明）决定转换
pub fn plan_transition(
    applied: Option<&AgentConfigEntry>,
    desired: Option<&AgentConfigEntry>,
) -> Transition {
    match (applied, desired) {
        (None, None) => Transition::Unchanged,
        (None, Some(entry)) if !entry.enabled() => Transition::IgnoreDisabled,
        (None, Some(_)) => Transition::Start,
        (Some(_), None) => Transition::Stop,
        (Some(_), Some(entry)) if !entry.enabled() => Transition::Stop,
        (Some(current), Some(entry)) if current == entry => Transition::Unchanged,
        (Some(_), Some(_)) => Transition::Reconfigure,
    }
}

/// 一次调和下发了哪些命令
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: Vec<String>,
    pub reconfigured: Vec<String>,
    pub stopped: Vec<String>,
    pub ignored_disabled: Vec<String>,
    /// 配置中出现但注册表中没有的名称
    pub unknown: Vec<String>,
}

impl ReconcileSummary {
    /// 没有任何生命周期调用
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.reconfigured.is_empty() && self.stopped.is_empty()
    }
}

enum LifecycleOp {
    Initialize(AgentConfigEntry),
    Reconfigure(AgentConfigEntry),
    Close,
    Barrier(oneshot::Sender<()>),
}

struct RunningAgent {
    applied: AgentConfigEntry,
    ops: mpsc::UnboundedSender<LifecycleOp>,
    /// lane 退出（包括 panic）时取消
    lane_done: CancellationToken,
}

#[derive(Default)]
struct EngineState {
    running: HashMap<String, RunningAgent>,
    /// 已下发 close、lane 可能还在执行的 Agent
    closing: HashMap<String, CancellationToken>,
    last_applied: Option<ApplicationConfigSnapshot>,
    shut_down: bool,
}

pub struct ReconciliationEngine {
    registry: Arc<AgentRegistry>,
    state: Mutex<EngineState>,
    lanes: TaskTracker,
}

impl ReconciliationEngine {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(EngineState::default()),
            lanes: TaskTracker::new(),
        }
    }

    /// 应用新快照；从不返回错误，单个 Agent 的失败只记录日志
    pub async fn apply_configuration(&self, snapshot: ApplicationConfigSnapshot) -> ReconcileSummary {
        let mut state = self.state.lock().await;
        let mut summary = ReconcileSummary::default();

        if state.shut_down {
            tracing::warn!(
                "Agents already shut down, ignoring configuration with {} entries",
                snapshot.len()
            );
            return summary;
        }
        state.closing.retain(|_, lane_done| !lane_done.is_cancelled());

        for (name, entry) in snapshot.iter() {
            let Some(agent) = self.registry.get(name) else {
                tracing::warn!(agent = %name, config = %entry, "No agent registered under this name, skipping entry");
                summary.unknown.push(name.clone());
                continue;
            };

            let transition = plan_transition(state.running.get(name).map(|r| &r.applied), Some(entry));
            match transition {
                Transition::Unchanged => {}
                Transition::IgnoreDisabled => {
                    tracing::info!(agent = %name, config = %entry, "Ignoring disabled agent");
                    summary.ignored_disabled.push(name.clone());
                }
                Transition::Start => {
                    self.start(&mut state, name, agent, entry);
                    summary.started.push(name.clone());
                }
                Transition::Reconfigure => {
                    Self::reconfigure(&mut state, name, entry);
                    summary.reconfigured.push(name.clone());
                }
                Transition::Stop => {
                    Self::stop(&mut state, name);
                    summary.stopped.push(name.clone());
                }
            }
        }

        let mut undeclared: Vec<String> = state
            .running
            .keys()
            .filter(|name| !snapshot.contains(name))
            .cloned()
            .collect();
        undeclared.sort();
        for name in undeclared {
            tracing::info!(agent = %name, "Agent no longer declared in configuration");
            Self::stop(&mut state, &name);
            summary.stopped.push(name);
        }

        state.last_applied = Some(snapshot);
        tracing::info!(
            started = summary.started.len(),
            reconfigured = summary.reconfigured.len(),
            stopped = summary.stopped.len(),
            running = state.running.len(),
            "Reconciliation pass finished"
        );
        summary
    }

    fn start(&self, state: &mut EngineState, name: &str, agent: Arc<dyn Agent>, entry: &AgentConfigEntry) {
        tracing::info!(agent = %name, config = %entry, "Starting agent");

        let previous = state.closing.remove(name);
        let (ops, rx) = mpsc::unbounded_channel();
        let lane_done = CancellationToken::new();
        self.lanes
            .spawn(run_lane(name.to_string(), agent, rx, previous, lane_done.clone()));
        // 接收端由刚创建的 lane 持有
        let _ = ops.send(LifecycleOp::Initialize(entry.clone()));

        state.running.insert(
            name.to_string(),
            RunningAgent {
                applied: entry.clone(),
                ops,
                lane_done,
            },
        );
    }

    fn reconfigure(state: &mut EngineState, name: &str, entry: &AgentConfigEntry) {
        let Some(record) = state.running.get_mut(name) else {
            return;
        };
        tracing::info!(agent = %name, config = %entry, "Reconfiguring agent");
        if record.ops.send(LifecycleOp::Reconfigure(entry.clone())).is_err() {
            tracing::warn!(agent = %name, "Agent lane has exited, reconfigure dropped");
        }
        record.applied = entry.clone();
    }

    fn stop(state: &mut EngineState, name: &str) {
        let Some(record) = state.running.remove(name) else {
            return;
        };
        tracing::info!(agent = %name, "Stopping agent");
        if record.ops.send(LifecycleOp::Close).is_err() {
            tracing::warn!(agent = %name, "Agent lane has exited, close dropped");
        }
        state.closing.insert(name.to_string(), record.lane_done);
    }

    /// 停止所有运行中的 Agent 并等待各 lane 结束；可重复调用，之后的 apply_configuration 被忽略
    pub async fn shutdown_all(&self) -> usize {
        let stopped = {
            let mut state = self.state.lock().await;
            state.shut_down = true;

            let mut names: Vec<String> = state.running.keys().cloned().collect();
            names.sort();
            for name in &names {
                Self::stop(&mut state, name);
            }
            names.len()
        };

        if stopped > 0 {
            tracing::info!("Stopping {} running agents", stopped);
        }
        self.lanes.close();
        self.lanes.wait().await;
        stopped
    }

    /// 等待已下发的所有生命周期命令执行完毕
    pub async fn settle(&self) {
        let (acks, closing) = {
            let mut state = self.state.lock().await;
            let acks: Vec<oneshot::Receiver<()>> = state
                .running
                .values()
                .filter_map(|record| {
                    let (tx, rx) = oneshot::channel();
                    record.ops.send(LifecycleOp::Barrier(tx)).ok().map(|_| rx)
                })
                .collect();
            // 不移除：之后重启同名 Agent 仍需等待这些 lane
            let closing: Vec<CancellationToken> = state.closing.values().cloned().collect();
            (acks, closing)
        };

        for ack in acks {
            let _ = ack.await;
        }
        for lane_done in closing {
            lane_done.cancelled().await;
        }
    }

    /// 运行中的 Agent 及其最近一次应用的配置
    pub async fn running_agents(&self) -> BTreeMap<String, AgentConfigEntry> {
        self.state
            .lock()
            .await
            .running
            .iter()
            .map(|(name, record)| (name.clone(), record.applied.clone()))
            .collect()
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.state.lock().await.running.contains_key(name)
    }

    pub async fn last_applied(&self) -> Option<ApplicationConfigSnapshot> {
        self.state.lock().await.last_applied.clone()
    }

    /// 快照是否与上一次应用的完全相同
    pub async fn is_current(&self, snapshot: &ApplicationConfigSnapshot) -> bool {
        self.state.lock().await.last_applied.as_ref() == Some(snapshot)
    }
}

async fn run_lane(
    name: String,
    agent: Arc<dyn Agent>,
    mut ops: mpsc::UnboundedReceiver<LifecycleOp>,
    previous: Option<CancellationToken>,
    done: CancellationToken,
) {
    let _done = done.drop_guard();

    // 同名 Agent 上一次的 close 必须先完成
    if let Some(previous) = previous {
        previous.cancelled().await;
    }

    while let Some(op) = ops.recv().await {
        match op {
            LifecycleOp::Initialize(entry) => {
                match guarded(agent.initialize(&entry), AgentError::Startup).await {
                    Ok(()) => tracing::info!(agent = %name, "Agent started"),
                    Err(e) => tracing::error!(
                        agent = %name,
                        config = %entry,
                        error = %e,
                        "An error occurred while starting agent"
                    ),
                }
            }
            LifecycleOp::Reconfigure(entry) => {
                match guarded(agent.reconfigure(&entry), AgentError::Startup).await {
                    Ok(()) => tracing::info!(agent = %name, "Agent reconfigured"),
                    Err(e) => tracing::error!(
                        agent = %name,
                        config = %entry,
                        error = %e,
                        "An error occurred while reconfiguring agent"
                    ),
                }
            }
            LifecycleOp::Close => {
                match guarded(agent.close(), AgentError::Shutdown).await {
                    Ok(()) => tracing::info!(agent = %name, "Agent stopped"),
                    Err(e) => tracing::error!(
                        agent = %name,
                        error = %e,
                        "An error occurred while stopping agent"
                    ),
                }
                break;
            }
            LifecycleOp::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// 把 Agent 调用中的 panic 转成错误
async fn guarded<F>(call: F, on_panic: fn(String) -> AgentError) -> Result<(), AgentError>
where
    F: Future<Output = Result<(), AgentError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(on_panic(format!("panicked: {message}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Initialize(Value),
        Reconfigure(Value),
        Close,
    }

    #[derive(Default)]
    struct RecordingAgent {
        calls: std::sync::Mutex<Vec<Call>>,
        fail_initialize: AtomicBool,
        panic_on_initialize: AtomicBool,
        /// 设置后 initialize 会等待 notify
        gate: Option<Arc<Notify>>,
        close_gate: Option<Arc<Notify>>,
    }

    impl RecordingAgent {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Agent for RecordingAgent {
        fn name(&self) -> &str {
            "RecordingAgent"
        }

        async fn initialize(&self, config: &AgentConfigEntry) -> Result<(), AgentError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panic_on_initialize.load(Ordering::SeqCst) {
                panic!("boom");
            }
            self.calls
                .lock()
                .unwrap()
                .push(Call::Initialize(Value::Object(config.settings().clone())));
            if self.fail_initialize.load(Ordering::SeqCst) {
                return Err(AgentError::Config("bad settings".to_string()));
            }
            Ok(())
        }

        async fn reconfigure(&self, config: &AgentConfigEntry) -> Result<(), AgentError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Reconfigure(Value::Object(config.settings().clone())));
            Ok(())
        }

        async fn close(&self) -> Result<(), AgentError> {
            if let Some(gate) = &self.close_gate {
                gate.notified().await;
            }
            self.calls.lock().unwrap().push(Call::Close);
            Ok(())
        }
    }

    fn engine_with(
        agents: Vec<(&str, RecordingAgent)>,
    ) -> (ReconciliationEngine, HashMap<String, Arc<RecordingAgent>>) {
        let mut registry = AgentRegistry::new();
        let mut handles = HashMap::new();
        for (name, agent) in agents {
            let agent = Arc::new(agent);
            registry.register(name, agent.clone()).unwrap();
            handles.insert(name.to_string(), agent);
        }
        (ReconciliationEngine::new(Arc::new(registry)), handles)
    }

    fn snapshot(document: Value) -> ApplicationConfigSnapshot {
        ApplicationConfigSnapshot::from_value(document).unwrap()
    }

    #[test]
    fn test_plan_transition_table() {
        let on = AgentConfigEntry::from_value("A", json!({ "x": 1 })).unwrap();
        let on_changed = AgentConfigEntry::from_value("A", json!({ "x": 2 })).unwrap();
        let off = AgentConfigEntry::from_value("A", json!({ "enabled": false, "x": 1 })).unwrap();

        assert_eq!(plan_transition(None, None), Transition::Unchanged);
        assert_eq!(plan_transition(None, Some(&off)), Transition::IgnoreDisabled);
        assert_eq!(plan_transition(None, Some(&on)), Transition::Start);
        assert_eq!(plan_transition(Some(&on), None), Transition::Stop);
        assert_eq!(plan_transition(Some(&on), Some(&off)), Transition::Stop);
        assert_eq!(plan_transition(Some(&on), Some(&on)), Transition::Unchanged);
        assert_eq!(plan_transition(Some(&on), Some(&on_changed)), Transition::Reconfigure);
    }

    #[tokio::test]
    async fn test_new_enabled_entry_starts_agent() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        let summary = engine.apply_configuration(snapshot(json!({ "A": { "x": 1 } }))).await;
        engine.settle().await;

        assert_eq!(summary.started, vec!["A"]);
        assert_eq!(agents["A"].calls(), vec![Call::Initialize(json!({ "x": 1 }))]);
        assert!(engine.is_running("A").await);
    }

    #[tokio::test]
    async fn test_same_snapshot_twice_is_noop() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);
        let config = snapshot(json!({ "A": { "x": 1 } }));

        engine.apply_configuration(config.clone()).await;
        let second = engine.apply_configuration(config.clone()).await;
        engine.settle().await;

        assert!(second.is_noop());
        assert_eq!(agents["A"].calls().len(), 1);
        assert!(engine.is_current(&config).await);
    }

    #[tokio::test]
    async fn test_disable_then_enable_restarts() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        engine.apply_configuration(snapshot(json!({ "A": { "x": 1 } }))).await;
        engine.settle().await;

        let summary = engine
            .apply_configuration(snapshot(json!({ "A": { "enabled": false, "x": 1 } })))
            .await;
        engine.settle().await;
        assert_eq!(summary.stopped, vec!["A"]);
        assert!(!engine.is_running("A").await);

        engine
            .apply_configuration(snapshot(json!({ "A": { "enabled": true, "x": 1 } })))
            .await;
        engine.settle().await;

        assert_eq!(
            agents["A"].calls(),
            vec![
                Call::Initialize(json!({ "x": 1 })),
                Call::Close,
                Call::Initialize(json!({ "x": 1 })),
            ]
        );
    }

    #[tokio::test]
    async fn test_restart_waits_for_previous_close() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        engine.apply_configuration(snapshot(json!({ "A": {} }))).await;
        engine.apply_configuration(snapshot(json!({}))).await;
        engine.apply_configuration(snapshot(json!({ "A": {} }))).await;
        engine.settle().await;

        assert_eq!(
            agents["A"].calls(),
            vec![Call::Initialize(json!({})), Call::Close, Call::Initialize(json!({}))]
        );
    }

    #[tokio::test]
    async fn test_restart_during_settle_still_waits_for_close() {
        let close_gate = Arc::new(Notify::new());
        let agent = RecordingAgent {
            close_gate: Some(close_gate.clone()),
            ..Default::default()
        };
        let (engine, agents) = engine_with(vec![("A", agent)]);
        let engine = Arc::new(engine);

        engine.apply_configuration(snapshot(json!({ "A": {} }))).await;
        engine.apply_configuration(snapshot(json!({}))).await;

        let settling = tokio::spawn({
            let engine = engine.clone();
            async move { engine.settle().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        engine.apply_configuration(snapshot(json!({ "A": {} }))).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(agents["A"].calls(), vec![Call::Initialize(json!({}))]);

        close_gate.notify_one();
        settling.await.unwrap();
        engine.settle().await;

        assert_eq!(
            agents["A"].calls(),
            vec![Call::Initialize(json!({})), Call::Close, Call::Initialize(json!({}))]
        );
    }

    #[tokio::test]
    async fn test_removed_entry_closes_agent() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        engine.apply_configuration(snapshot(json!({ "A": { "x": 1 } }))).await;
        let summary = engine.apply_configuration(snapshot(json!({}))).await;
        engine.settle().await;

        assert_eq!(summary.stopped, vec!["A"]);
        assert_eq!(agents["A"].calls().last(), Some(&Call::Close));
        assert!(engine.running_agents().await.is_empty());
    }

    #[tokio::test]
    async fn test_settings_change_reconfigures() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        engine.apply_configuration(snapshot(json!({ "A": { "x": 1 } }))).await;
        let summary = engine.apply_configuration(snapshot(json!({ "A": { "x": 2 } }))).await;
        engine.settle().await;

        assert_eq!(summary.reconfigured, vec!["A"]);
        assert_eq!(
            agents["A"].calls(),
            vec![
                Call::Initialize(json!({ "x": 1 })),
                Call::Reconfigure(json!({ "x": 2 })),
            ]
        );
        assert_eq!(
            engine.running_agents().await["A"].get("x"),
            Some(&json!(2))
        );
    }

    #[tokio::test]
    async fn test_unknown_agent_is_skipped() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        let summary = engine
            .apply_configuration(snapshot(json!({ "A": {}, "Ghost": { "x": 1 } })))
            .await;
        engine.settle().await;

        assert_eq!(summary.unknown, vec!["Ghost"]);
        assert_eq!(summary.started, vec!["A"]);
        assert_eq!(agents["A"].calls().len(), 1);
        assert!(!engine.is_running("Ghost").await);
    }

    #[tokio::test]
    async fn test_disabled_entry_is_ignored() {
        let (engine, agents) = engine_with(vec![("A", RecordingAgent::default())]);

        let summary = engine
            .apply_configuration(snapshot(json!({ "A": { "enabled": false } })))
            .await;
        engine.settle().await;

        assert_eq!(summary.ignored_disabled, vec!["A"]);
        assert!(agents["A"].calls().is_empty());
        assert!(!engine.is_running("A").await);
    }

    /// 启动失败仍记为已应用：相同快照不重试，配置变化后走 reconfigure 而不是 initialize
    #[tokio::test]
    async fn test_failed_start_is_recorded_and_not_retried() {
        let agent = RecordingAgent::default();
        agent.fail_initialize.store(true, Ordering::SeqCst);
        let (engine, agents) = engine_with(vec![("A", agent)]);

        engine.apply_configuration(snapshot(json!({ "A": { "x": 1 } }))).await;
        engine.settle().await;
        assert!(engine.is_running("A").await);

        let retry = engine.apply_configuration(snapshot(json!({ "A": { "x": 1 } }))).await;
        engine.settle().await;
        assert!(retry.is_noop());
        assert_eq!(agents["A"].calls().len(), 1);

        engine.apply_configuration(snapshot(json!({ "A": { "x": 2 } }))).await;
        engine.settle().await;
        assert_eq!(
            agents["A"].calls().last(),
            Some(&Call::Reconfigure(json!({ "x": 2 })))
        );
    }

    #[tokio::test]
    async fn test_panicking_agent_is_isolated() {
        let bad = RecordingAgent::default();
        bad.panic_on_initialize.store(true, Ordering::SeqCst);
        let (engine, agents) = engine_with(vec![("Bad", bad), ("Good", RecordingAgent::default())]);

        engine
            .apply_configuration(snapshot(json!({ "Bad": {}, "Good": {} })))
            .await;
        engine.settle().await;

        assert_eq!(agents["Good"].calls(), vec![Call::Initialize(json!({}))]);
        assert!(engine.is_running("Bad").await);

        engine.apply_configuration(snapshot(json!({}))).await;
        engine.settle().await;
        assert_eq!(agents["Bad"].calls(), vec![Call::Close]);
    }

    #[tokio::test]
    async fn test_slow_start_does_not_block_siblings() {
        let gate = Arc::new(Notify::new());
        let slow = RecordingAgent {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let (engine, agents) = engine_with(vec![("Slow", slow), ("Fast", RecordingAgent::default())]);

        engine
            .apply_configuration(snapshot(json!({ "Slow": {}, "Fast": {} })))
            .await;

        let fast = agents["Fast"].clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while fast.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fast agent should start while slow agent is blocked");
        assert!(agents["Slow"].calls().is_empty());

        gate.notify_one();
        engine.settle().await;
        assert_eq!(agents["Slow"].calls(), vec![Call::Initialize(json!({}))]);
    }

    #[tokio::test]
    async fn test_shutdown_all_is_idempotent() {
        let (engine, agents) = engine_with(vec![
            ("A", RecordingAgent::default()),
            ("B", RecordingAgent::default()),
        ]);

        engine
            .apply_configuration(snapshot(json!({ "A": {}, "B": { "enabled": false } })))
            .await;

        assert_eq!(engine.shutdown_all().await, 1);
        assert_eq!(engine.shutdown_all().await, 0);
        assert_eq!(agents["A"].calls(), vec![Call::Initialize(json!({})), Call::Close]);
        assert!(agents["B"].calls().is_empty());

        let ignored = engine.apply_configuration(snapshot(json!({ "B": {} }))).await;
        assert!(ignored.is_noop());
        assert!(engine.running_agents().await.is_empty());
    }
}
