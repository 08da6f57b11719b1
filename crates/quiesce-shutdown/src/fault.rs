use crate::context::Context;
use crate::resource::ResourceHandle;
use crate::signal::CompletionSignal;
use crate::strategy::ShutdownStrategy;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// 上下文中用于请求提前返回的键
pub const RETURN_KEY: &str = "want_return";

/// [`RETURN_KEY`] 对应的提前返回标记值
pub const EARLY: &str = "early";

/// 故障注入策略走过的分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultBranch {
    /// 上下文携带提前返回标记
    Early,
    /// 上下文已取消或过期
    ContextError,
    /// 关闭了资源并发出信号（超时场景下不应到达）
    Closed,
}

impl FaultBranch {
    fn to_u8(self) -> u8 {
        match self {
            FaultBranch::Early => 1,
            FaultBranch::ContextError => 2,
            FaultBranch::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FaultBranch::Early),
            2 => Some(FaultBranch::ContextError),
            3 => Some(FaultBranch::Closed),
            _ => None,
        }
    }
}

/// 故障注入策略，模拟缓慢的原生关闭
///
/// 先休眠指定时长再检查上下文，用于在不依赖真实关闭耗时的情况下验证
/// 有界关闭的竞争逻辑。克隆共享分支记录。
#[derive(Debug, Clone)]
pub struct FaultInjecting {
    delay: Duration,
    last_branch: Arc<AtomicU8>,
}

impl FaultInjecting {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_branch: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 最近一次 shutdown 走过的分支；尚未完成时为 `None`
    pub fn last_branch(&self) -> Option<FaultBranch> {
        FaultBranch::from_u8(self.last_branch.load(Ordering::SeqCst))
    }

    fn record(&self, branch: FaultBranch) {
        self.last_branch.store(branch.to_u8(), Ordering::SeqCst);
    }
}

#[async_trait]
impl ShutdownStrategy for FaultInjecting {
    async fn shutdown(&self, ctx: Context, resource: ResourceHandle, signal: CompletionSignal) {
        info!("Injecting {:?} close delay for {}", self.delay, resource.name());
        sleep(self.delay).await;

        if ctx.value(RETURN_KEY) == Some(EARLY) {
            info!("Got early return marker, leaving {} open", resource.name());
            self.record(FaultBranch::Early);
            return;
        }

        if let Some(err) = ctx.err() {
            info!("Context failed during injected delay: {}", err);
            self.record(FaultBranch::ContextError);
            return;
        }

        warn!(
            "Fault strategy reached close of {}; should never happen under timeout",
            resource.name()
        );
        if resource.close().await.is_ok() {
            signal.complete();
        }
        self.record(FaultBranch::Closed);
    }

    fn name(&self) -> &str {
        "fault-injecting"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceState, SimulatedSession};
    use crate::signal::completion_channel;

    fn session() -> (Arc<SimulatedSession>, ResourceHandle) {
        let session = Arc::new(SimulatedSession::new("session"));
        let handle = ResourceHandle::new(session.clone());
        (session, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_marker_returns_silently() {
        let (session, handle) = session();
        let strategy = FaultInjecting::new(Duration::from_millis(1100));
        let (signal, mut receiver) = completion_channel();
        let ctx = Context::with_value(&Context::background(), RETURN_KEY, EARLY);

        assert_eq!(strategy.last_branch(), None);
        strategy.shutdown(ctx, handle.clone(), signal).await;

        assert_eq!(strategy.last_branch(), Some(FaultBranch::Early));
        assert!(!receiver.recv().await);
        assert_eq!(session.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_context_returns_silently() {
        let (session, handle) = session();
        let strategy = FaultInjecting::new(Duration::from_secs(1));
        let (signal, mut receiver) = completion_channel();
        let (ctx, _cancel) = Context::with_timeout(&Context::background(), Duration::from_millis(200));

        strategy.shutdown(ctx, handle.clone(), signal).await;

        assert_eq!(strategy.last_branch(), Some(FaultBranch::ContextError));
        assert!(!receiver.recv().await);
        assert_eq!(handle.state(), ResourceState::Open);
        assert_eq!(session.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_context_closes() {
        let (session, handle) = session();
        let strategy = FaultInjecting::new(Duration::from_millis(50));
        let (signal, mut receiver) = completion_channel();

        strategy
            .clone()
            .shutdown(Context::background(), handle.clone(), signal)
            .await;

        assert_eq!(strategy.last_branch(), Some(FaultBranch::Closed));
        assert!(receiver.recv().await);
        assert_eq!(session.close_calls(), 1);
    }
}
