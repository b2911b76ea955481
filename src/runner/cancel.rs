use std::sync::Arc;
use tokio::sync::watch;

/// 整批执行的取消信号
///
/// 可克隆，所有副本共享同一个状态；取消后不可恢复。
#[derive(Debug, Clone)]
pub struct BatchCancel {
    sender: Arc<watch::Sender<bool>>,
}

impl BatchCancel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // sender 由 self 持有，不会提前关闭
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for BatchCancel {
    fn default() -> Self {
        Self::new()
    }
}
