use crate::error::ContextError;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ContextInner {
    parent: Option<Context>,
    token: CancellationToken,
    deadline: Option<Instant>,
    value: Option<(String, String)>,
    /// 首次观察到的失败原因，一旦写入不再改变
    cause: OnceLock<ContextError>,
}

/// 带截止时间和取消信号的调用上下文
///
/// 克隆开销很小（内部为 `Arc`）。取消父上下文会级联取消所有子上下文，
/// 反之不会。
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// 根上下文：无截止时间，永不取消
    pub fn background() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                parent: None,
                token: CancellationToken::new(),
                deadline: None,
                value: None,
                cause: OnceLock::new(),
            }),
        }
    }

    fn derive(parent: &Context, deadline: Option<Instant>, value: Option<(String, String)>) -> Self {
        let deadline = match (parent.inner.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Self {
            inner: Arc::new(ContextInner {
                parent: Some(parent.clone()),
                token: parent.inner.token.child_token(),
                deadline,
                value,
                cause: OnceLock::new(),
            }),
        }
    }

    /// 派生可取消的子上下文
    pub fn with_cancel(parent: &Context) -> (Context, CancelHandle) {
        let ctx = Self::derive(parent, None, None);
        let handle = CancelHandle { ctx: ctx.clone() };
        (ctx, handle)
    }

    /// 派生带超时的子上下文
    ///
    /// 超时超出时钟可表示范围时视为无自身截止时间，仅继承父上下文的截止时间。
    pub fn with_timeout(parent: &Context, timeout: Duration) -> (Context, CancelHandle) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(parent, deadline),
            None => Self::with_cancel(parent),
        }
    }

    /// 派生带绝对截止时间的子上下文，实际截止时间取父子中较早者
    pub fn with_deadline(parent: &Context, deadline: Instant) -> (Context, CancelHandle) {
        let ctx = Self::derive(parent, Some(deadline), None);
        let handle = CancelHandle { ctx: ctx.clone() };
        (ctx, handle)
    }

    /// 派生携带一个键值对的子上下文
    pub fn with_value(parent: &Context, key: impl Into<String>, value: impl Into<String>) -> Context {
        Self::derive(parent, None, Some((key.into(), value.into())))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// 距离截止时间的剩余时长（已过期时为零）
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// 沿祖先链查找键值
    pub fn value(&self, key: &str) -> Option<&str> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some((k, v)) = &ctx.inner.value {
                if k == key {
                    return Some(v.as_str());
                }
            }
            current = ctx.inner.parent.as_ref();
        }
        None
    }

    /// 上下文的失败原因；尚未取消或过期时返回 `None`
    pub fn err(&self) -> Option<ContextError> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(*cause);
        }

        let observed = if self.inner.token.is_cancelled() {
            self.inner
                .parent
                .as_ref()
                .and_then(Context::err)
                .unwrap_or(ContextError::Canceled)
        } else if self.deadline_passed() {
            ContextError::DeadlineExceeded
        } else {
            return None;
        };

        Some(*self.inner.cause.get_or_init(|| observed))
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// 等待上下文被取消或过期，可重复等待
    pub async fn done(&self) -> ContextError {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.inner.token.cancelled().await,
        }

        self.err().unwrap_or(ContextError::Canceled)
    }

    fn deadline_passed(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// 取消句柄
#[derive(Debug, Clone)]
pub struct CancelHandle {
    ctx: Context,
}

impl CancelHandle {
    /// 取消上下文（幂等）
    pub fn cancel(&self) {
        if self.ctx.err().is_none() {
            let _ = self.ctx.inner.cause.get_or_init(|| ContextError::Canceled);
        }
        self.ctx.inner.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    #[tokio::test]
    async fn test_background_never_done() {
        let ctx = Context::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());

        let res = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_cancel_is_sticky_and_reobservable() {
        let (ctx, cancel) = Context::with_cancel(&Context::background());
        cancel.cancel();
        cancel.cancel();

        assert_eq!(ctx.err(), Some(ContextError::Canceled));
        assert_eq!(ctx.done().await, ContextError::Canceled);
        assert_eq!(ctx.done().await, ContextError::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let (ctx, _cancel) = Context::with_timeout(&Context::background(), Duration::from_millis(200));
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(200)));
        assert!(ctx.err().is_none());

        let start = Instant::now();
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cause_wins() {
        let (ctx, cancel) = Context::with_timeout(&Context::background(), Duration::from_millis(50));
        cancel.cancel();
        advance(Duration::from_millis(100)).await;
        assert_eq!(ctx.err(), Some(ContextError::Canceled));

        let (ctx, cancel) = Context::with_timeout(&Context::background(), Duration::from_millis(50));
        sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_parent_cancel_propagates() {
        let (parent, cancel) = Context::with_cancel(&Context::background());
        let child = Context::with_value(&parent, "k", "v");
        let (grandchild, _c) = Context::with_cancel(&child);

        cancel.cancel();
        assert_eq!(grandchild.done().await, ContextError::Canceled);
        assert_eq!(child.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let (parent, _p) = Context::with_cancel(&Context::background());
        let (child, cancel) = Context::with_cancel(&parent);

        cancel.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_bounded_by_parent() {
        let (parent, _p) = Context::with_timeout(&Context::background(), Duration::from_millis(100));
        let (child, _c) = Context::with_timeout(&parent, Duration::from_secs(5));
        assert_eq!(child.deadline(), parent.deadline());

        let (shorter, _s) = Context::with_timeout(&parent, Duration::from_millis(10));
        assert!(shorter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout() {
        let (ctx, cancel) = Context::with_timeout(&Context::background(), Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());

        cancel.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));

        let (parent, _p) = Context::with_timeout(&Context::background(), Duration::from_millis(100));
        let (child, _c) = Context::with_timeout(&parent, Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.done().await, ContextError::DeadlineExceeded);
    }

    #[test]
    fn test_value_lookup() {
        let root = Context::background();
        let a = Context::with_value(&root, "want_return", "early");
        let b = Context::with_value(&a, "other", "x");
        let (c, _cancel) = Context::with_cancel(&b);

        assert_eq!(c.value("want_return"), Some("early"));
        assert_eq!(c.value("other"), Some("x"));
        assert_eq!(c.value("missing"), None);
        assert_eq!(root.value("want_return"), None);
    }

    #[test]
    fn test_shadowed_value() {
        let a = Context::with_value(&Context::background(), "k", "outer");
        let b = Context::with_value(&a, "k", "inner");
        assert_eq!(b.value("k"), Some("inner"));
        assert_eq!(a.value("k"), Some("outer"));
    }
}
