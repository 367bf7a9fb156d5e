//! 打印型 Agent：按固定间隔输出当前配置值，直到 close
//!
//! `initialize` 启动后台打印任务，`reconfigure` 通过 watch 通道热替换打印值与打印间隔，
//! `close` 取消 token 并等待任务退出。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agents::{Agent, AgentError};
use crate::snapshot::AgentConfigEntry;

/// 默认打印间隔（毫秒）
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// 打印输出目标，默认写 stdout
pub type LineSink = Arc<dyn Fn(String) + Send + Sync>;

/// 从配置解析打印值
pub type ValueParser<T> = fn(&AgentConfigEntry) -> Result<T, AgentError>;

struct Printer<T> {
    value: watch::Sender<T>,
    period: watch::Sender<Duration>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct PrinterAgent<T> {
    name: &'static str,
    parse: ValueParser<T>,
    sink: LineSink,
    state: Mutex<Option<Printer<T>>>,
}

impl<T> PrinterAgent<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    pub fn with_parser(name: &'static str, parse: ValueParser<T>) -> Self {
        Self {
            name,
            parse,
            sink: Arc::new(|line: String| println!("{line}")),
            state: Mutex::new(None),
        }
    }

    pub fn with_sink(mut self, sink: LineSink) -> Self {
        self.sink = sink;
        self
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

fn print_interval(config: &AgentConfigEntry) -> Result<Duration, AgentError> {
    match config.get("interval_ms") {
        None => Ok(Duration::from_millis(DEFAULT_INTERVAL_MS)),
        Some(value) => value
            .as_u64()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                AgentError::Config(format!(
                    "\"interval_ms\" must be a positive integer, got {value}"
                ))
            }),
    }
}

async fn print_loop<T: fmt::Display>(
    label: &'static str,
    value: watch::Receiver<T>,
    mut period: watch::Receiver<Duration>,
    token: CancellationToken,
    sink: LineSink,
) {
    let mut ticker = tokio::time::interval(*period.borrow_and_update());
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = period.changed() => {
                if changed.is_err() {
                    break;
                }
                // 新间隔从现在开始计时
                let next = *period.borrow_and_update();
                ticker = tokio::time::interval_at(Instant::now() + next, next);
            }
            _ = ticker.tick() => {
                let line = format!(
                    "{} {}: {}",
                    Local::now().format("%H:%M:%S"),
                    label,
                    *value.borrow()
                );
                sink(line);
            }
        }
    }
}

#[async_trait]
impl<T> Agent for PrinterAgent<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn initialize(&self, config: &AgentConfigEntry) -> Result<(), AgentError> {
        let value = (self.parse)(config)?;
        let period = print_interval(config)?;

        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(AgentError::Startup(format!("{} is already running", self.name)));
        }

        let (value_tx, value_rx) = watch::channel(value);
        let (period_tx, period_rx) = watch::channel(period);
        let token = CancellationToken::new();
        let task = tokio::spawn(print_loop(
            self.name,
            value_rx,
            period_rx,
            token.clone(),
            self.sink.clone(),
        ));
        *state = Some(Printer {
            value: value_tx,
            period: period_tx,
            token,
            task,
        });
        Ok(())
    }

    async fn reconfigure(&self, config: &AgentConfigEntry) -> Result<(), AgentError> {
        let value = (self.parse)(config)?;
        let period = print_interval(config)?;

        let state = self.state.lock().await;
        let printer = state
            .as_ref()
            .ok_or_else(|| AgentError::Startup(format!("{} is not running", self.name)))?;
        printer.value.send_replace(value);
        printer.period.send_if_modified(|current| {
            if *current == period {
                return false;
            }
            *current = period;
            true
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), AgentError> {
        let printer = self
            .state
            .lock()
            .await
            .take()
            .ok_or_else(|| AgentError::Shutdown(format!("{} is not running", self.name)))?;

        printer.token.cancel();
        printer
            .task
            .await
            .map_err(|e| AgentError::Shutdown(format!("printer task failed: {e}")))
    }
}
