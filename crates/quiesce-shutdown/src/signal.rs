use tokio::sync::oneshot;
use tracing::debug;

/// 创建一次性完成信号
///
/// 每次有界关闭调用都会分配新的信号对，调用结束后接收端即被丢弃，
/// 不会在多次调用之间残留状态。
pub fn completion_channel() -> (CompletionSignal, CompletionReceiver) {
    let (tx, rx) = oneshot::channel();
    (CompletionSignal { tx }, CompletionReceiver { rx })
}

/// 完成信号（发送端），由关闭策略持有
#[derive(Debug)]
pub struct CompletionSignal {
    tx: oneshot::Sender<()>,
}

impl CompletionSignal {
    /// 通知关闭完成
    ///
    /// 消耗自身，因此至多发送一次。接收端已放弃等待时返回 `false`，从不阻塞。
    pub fn complete(self) -> bool {
        let delivered = self.tx.send(()).is_ok();
        if !delivered {
            debug!("Completion signal dropped: orchestrator no longer listening");
        }
        delivered
    }

    /// 接收端是否已放弃等待
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 完成信号（接收端），由编排器持有
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: oneshot::Receiver<()>,
}

impl CompletionReceiver {
    /// 等待完成信号
    ///
    /// 发送端未发送即被丢弃时返回 `false`；此后该接收端不应再被轮询。
    pub async fn recv(&mut self) -> bool {
        (&mut self.rx).await.is_ok()
    }
}
