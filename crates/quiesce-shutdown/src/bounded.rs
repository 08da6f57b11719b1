use crate::config::CloseConfig;
use crate::context::Context;
use crate::error::CloseError;
use crate::resource::ResourceHandle;
use crate::signal::completion_channel;
use crate::strategy::{Graceful, ShutdownStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// 有界关闭的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Succeeded,
    TimedOut,
    ContextFailed,
}

impl CloseOutcome {
    fn of(result: &Result<(), CloseError>) -> Self {
        match result {
            Ok(()) => CloseOutcome::Succeeded,
            Err(CloseError::TimedOut { .. }) => CloseOutcome::TimedOut,
            Err(CloseError::Context(_)) => CloseOutcome::ContextFailed,
        }
    }
}

/// 单次关闭尝试的结构化记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseReport {
    pub resource: String,
    pub strategy: String,
    pub outcome: CloseOutcome,
    pub window_ms: u64,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CloseReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 关闭任务句柄
///
/// 编排器返回后，关闭任务可能仍在运行。丢弃句柄即分离任务；
/// `abort()` 在任务的下一个挂起点生效；原生关闭进行中被中止时资源转为 `Failed`。
#[derive(Debug)]
pub struct CloseTask {
    handle: Option<JoinHandle<()>>,
}

impl CloseTask {
    fn spawned(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn not_spawned() -> Self {
        Self { handle: None }
    }

    /// 是否启动了关闭任务（上下文在调用前已失败时不会启动）
    pub fn was_spawned(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn abort(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// 等待任务结束；被中止或 panic 时返回 `false`
    pub async fn join(self) -> bool {
        match self.handle {
            Some(handle) => handle.await.is_ok(),
            None => true,
        }
    }
}

/// 单次关闭尝试的完整结果
#[derive(Debug)]
pub struct CloseAttempt {
    pub result: Result<(), CloseError>,
    pub report: CloseReport,
    pub task: CloseTask,
}

/// 有界关闭编排器
///
/// 在三个事件之间竞争：关闭完成信号、调用方上下文失败、超时窗口到期。
/// 最先发生者决定结果，编排器立即返回，不等待其余两个事件。
pub struct BoundedClose {
    strategy: Arc<dyn ShutdownStrategy>,
    config: CloseConfig,
}

impl BoundedClose {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BoundedCloseBuilder {
        BoundedCloseBuilder::new()
    }

    pub fn config(&self) -> &CloseConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 计算本次调用的超时窗口
    ///
    /// 有截止时间时为剩余时长加安全余量，保证截止时间与超时几乎同时
    /// 到达时先观察到上下文错误；否则使用默认窗口。
    pub fn timeout_window(&self, ctx: &Context) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining + self.config.safety_margin(),
            None => self.config.default_window(),
        }
    }

    /// 有界关闭资源，丢弃仍在运行的关闭任务
    pub async fn close(&self, ctx: &Context, resource: &ResourceHandle) -> Result<(), CloseError> {
        self.attempt(ctx, resource).await.result
    }

    /// 有界关闭资源，并返回记录和关闭任务句柄
    pub async fn attempt(&self, ctx: &Context, resource: &ResourceHandle) -> CloseAttempt {
        let start = Instant::now();
        let window = self.timeout_window(ctx);

        if let Some(err) = ctx.err() {
            debug!("Context already failed before closing {}: {}", resource.name(), err);
            return self.finish(resource, window, start, Err(err.into()), CloseTask::not_spawned());
        }

        debug!(
            "Closing {} with {} strategy, window {:?}",
            resource.name(),
            self.strategy.name(),
            window
        );

        let (signal, mut completion) = completion_channel();
        let task = {
            let strategy = Arc::clone(&self.strategy);
            let ctx = ctx.clone();
            let resource = resource.clone();
            tokio::spawn(async move {
                strategy.shutdown(ctx, resource, signal).await;
            })
        };

        // 完成信号优先于上下文，上下文优先于超时
        let result = tokio::select! {
            biased;
            true = completion.recv() => Ok(()),
            err = ctx.done() => Err(CloseError::Context(err)),
            _ = sleep(window) => Err(CloseError::TimedOut {
                resource: resource.name().to_string(),
                window,
            }),
        };

        if result.is_err() {
            resource.mark_abandoned();
        }

        self.finish(resource, window, start, result, CloseTask::spawned(task))
    }

    fn finish(
        &self,
        resource: &ResourceHandle,
        window: Duration,
        start: Instant,
        result: Result<(), CloseError>,
        task: CloseTask,
    ) -> CloseAttempt {
        let elapsed = start.elapsed();
        let outcome = CloseOutcome::of(&result);

        match &result {
            Ok(()) => info!("Closed {} in {:?}", resource.name(), elapsed),
            Err(e) => warn!("Close of {} gave up after {:?}: {}", resource.name(), elapsed, e),
        }

        let report = CloseReport {
            resource: resource.name().to_string(),
            strategy: self.strategy.name().to_string(),
            outcome,
            window_ms: millis(window),
            elapsed_ms: millis(elapsed),
            finished_at: Utc::now(),
            error: result.as_ref().err().map(ToString::to_string),
        };

        CloseAttempt {
            result,
            report,
            task,
        }
    }
}

impl Default for BoundedClose {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// 有界关闭编排器构建器
pub struct BoundedCloseBuilder {
    strategy: Option<Arc<dyn ShutdownStrategy>>,
    config: CloseConfig,
}

impl BoundedCloseBuilder {
    pub fn new() -> Self {
        Self {
            strategy: None,
            config: CloseConfig::default(),
        }
    }

    pub fn with_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ShutdownStrategy + 'static,
    {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_config(mut self, config: CloseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_default_window(mut self, window: Duration) -> Self {
        self.config.default_window_ms = millis(window);
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.config.safety_margin_ms = millis(margin);
        self
    }

    pub fn build(self) -> BoundedClose {
        let strategy = self
            .strategy
            .unwrap_or_else(|| Arc::new(Graceful) as Arc<dyn ShutdownStrategy>);

        BoundedClose {
            strategy,
            config: self.config,
        }
    }
}

impl Default for BoundedCloseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
