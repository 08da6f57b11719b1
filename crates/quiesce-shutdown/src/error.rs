use std::time::Duration;
use thiserror::Error;

/// 上下文失败原因
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// 有界关闭的失败结果
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CloseError {
    #[error("closing {resource} timed out after {window:?}")]
    TimedOut { resource: String, window: Duration },

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl CloseError {
    /// 是否为内部超时（而非调用方上下文导致的失败）
    pub fn is_timeout(&self) -> bool {
        matches!(self, CloseError::TimedOut { .. })
    }

    /// 上下文自身的错误（如果有）
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            CloseError::Context(err) => Some(*err),
            CloseError::TimedOut { .. } => None,
        }
    }
}

impl PartialEq<ContextError> for CloseError {
    fn eq(&self, other: &ContextError) -> bool {
        self.context_error() == Some(*other)
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Close failed: {0}")]
    CloseFailed(String),

    #[error("Resource already closed: {0}")]
    AlreadyClosed(String),

    #[error("Close already in progress: {0}")]
    CloseInProgress(String),
}
