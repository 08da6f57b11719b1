use crate::context::Context;
use crate::resource::ResourceHandle;
use crate::signal::CompletionSignal;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// 关闭策略
///
/// 实现需满足：
/// - 上下文已取消或过期时，不触碰资源、不发信号，直接返回
/// - 至多发送一次完成信号（由 [`CompletionSignal::complete`] 消耗自身保证）
/// - 关闭失败时保持沉默，不向编排器返回错误
#[async_trait]
pub trait ShutdownStrategy: Send + Sync {
    async fn shutdown(&self, ctx: Context, resource: ResourceHandle, signal: CompletionSignal);

    /// 策略名称
    fn name(&self) -> &str;
}

/// 生产环境策略：立即关闭并通知
#[derive(Debug, Clone, Copy, Default)]
pub struct Graceful;

#[async_trait]
impl ShutdownStrategy for Graceful {
    async fn shutdown(&self, ctx: Context, resource: ResourceHandle, signal: CompletionSignal) {
        if let Some(err) = ctx.err() {
            debug!("Skipping close of {}: {}", resource.name(), err);
            return;
        }

        match resource.close().await {
            Ok(()) => {
                info!("Closed resource: {}", resource.name());
                signal.complete();
            }
            Err(e) => {
                warn!("Failed to close {}: {}", resource.name(), e);
            }
        }
    }

    fn name(&self) -> &str {
        "graceful"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceState, SimulatedSession};
    use crate::signal::completion_channel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_graceful_closes_and_signals() {
        let session = Arc::new(SimulatedSession::new("session"));
        let handle = ResourceHandle::new(session.clone());
        let (signal, mut receiver) = completion_channel();

        Graceful
            .shutdown(Context::background(), handle.clone(), signal)
            .await;

        assert!(receiver.recv().await);
        assert_eq!(handle.state(), ResourceState::Closed);
        assert_eq!(session.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_graceful_skips_cancelled_context() {
        let session = Arc::new(SimulatedSession::new("session"));
        let handle = ResourceHandle::new(session.clone());
        let (signal, mut receiver) = completion_channel();

        let (ctx, cancel) = Context::with_cancel(&Context::background());
        cancel.cancel();
        Graceful.shutdown(ctx, handle.clone(), signal).await;

        assert!(!receiver.recv().await);
        assert_eq!(handle.state(), ResourceState::Open);
        assert_eq!(session.close_calls(), 0);
    }

    #[tokio::test]
    async fn test_graceful_failure_is_silent() {
        let session = Arc::new(SimulatedSession::new("broken").failing());
        let handle = ResourceHandle::new(session);
        let (signal, mut receiver) = completion_channel();

        Graceful
            .shutdown(Context::background(), handle.clone(), signal)
            .await;

        assert!(!receiver.recv().await);
        assert_eq!(handle.state(), ResourceState::Failed);
    }
}
