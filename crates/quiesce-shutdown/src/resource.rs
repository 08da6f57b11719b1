use crate::error::ResourceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 资源接口
#[async_trait]
pub trait Resource: Send + Sync {
    /// 关闭资源
    async fn close(&self) -> Result<(), ResourceError>;

    /// 资源名称
    fn name(&self) -> &str;
}

/// 资源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Open,
    Closing,
    Closed,
    Failed,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ResourceState::Open,
            1 => ResourceState::Closing,
            2 => ResourceState::Closed,
            _ => ResourceState::Failed,
        }
    }
}

/// 资源句柄
///
/// 调用方持有所有权，关闭策略仅借用克隆出的句柄。句柄保证底层
/// `close()` 至多执行一次。
///
/// 注意：有界关闭超时或上下文失败后，仍在运行的关闭任务可能在调用方
/// 已放弃该资源之后才真正关闭它。句柄会被标记为已放弃，迟到的关闭
/// 会记录告警，但不会被阻止。
#[derive(Clone)]
pub struct ResourceHandle {
    resource: Arc<dyn Resource>,
    state: Arc<AtomicU8>,
    abandoned: Arc<AtomicBool>,
}

impl ResourceHandle {
    pub fn new(resource: Arc<dyn Resource>) -> Self {
        Self {
            resource,
            state: Arc::new(AtomicU8::new(ResourceState::Open as u8)),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        self.resource.name()
    }

    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// 关闭底层资源（至多一次）
    pub async fn close(&self) -> Result<(), ResourceError> {
        if let Err(current) = self.state.compare_exchange(
            ResourceState::Open as u8,
            ResourceState::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            let name = self.name().to_string();
            return match ResourceState::from_u8(current) {
                ResourceState::Closing => Err(ResourceError::CloseInProgress(name)),
                _ => Err(ResourceError::AlreadyClosed(name)),
            };
        }

        // 关闭中途被丢弃（如任务被中止）时转为 Failed
        let _guard = ClosingGuard { state: &self.state };

        if self.is_abandoned() {
            warn!("Closing abandoned resource: {}", self.name());
        }

        match self.resource.close().await {
            Ok(()) => {
                self.state.store(ResourceState::Closed as u8, Ordering::SeqCst);
                debug!("Resource closed: {}", self.name());
                Ok(())
            }
            Err(e) => {
                self.state.store(ResourceState::Failed as u8, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// 标记调用方已放弃等待
    pub fn mark_abandoned(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct ClosingGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for ClosingGuard<'_> {
    fn drop(&mut self) {
        let interrupted = self
            .state
            .compare_exchange(
                ResourceState::Closing as u8,
                ResourceState::Failed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if interrupted {
            warn!("Close interrupted before completion, marking resource failed");
        }
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// 模拟的数据库会话
pub struct SimulatedSession {
    name: String,
    close_latency: Duration,
    fail_on_close: bool,
    close_calls: AtomicUsize,
}

impl SimulatedSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            close_latency: Duration::ZERO,
            fail_on_close: false,
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_close_latency(mut self, latency: Duration) -> Self {
        self.close_latency = latency;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    /// close() 被调用的次数
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for SimulatedSession {
    async fn close(&self) -> Result<(), ResourceError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        info!("Closing session: {}", self.name);

        if !self.close_latency.is_zero() {
            sleep(self.close_latency).await;
        }

        if self.fail_on_close {
            return Err(ResourceError::CloseFailed(format!(
                "{}: connection reset",
                self.name
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
