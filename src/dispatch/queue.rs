//! 有界 FIFO 工作队列
//!
//! 生产者可以有多个（clone），消费者只有一个（接收端由事件循环独占）。
//! 队列满时 `enqueue` 会等待消费者腾出空间，不丢弃、不重排。

use tokio::sync::mpsc;

use crate::core::{BotError, Result};
use crate::models::Message;

use super::action::Action;

/// 出站动作队列
pub type ActionQueue = WorkQueue<Action>;

/// 入站消息队列
pub type MessageQueue = WorkQueue<Message>;

/// 有界队列的生产端
#[derive(Debug)]
pub struct WorkQueue<T> {
    tx: mpsc::Sender<T>,
    capacity: usize,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> WorkQueue<T> {
    /// 创建容量为 `capacity` 的队列，返回生产端与唯一的消费端
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    /// 追加到队尾；队列满时等待
    pub async fn enqueue(&self, item: T) -> Result<()> {
        self.enqueue_with(move || item).await
    }

    /// 等到有空位后才构造元素并入队，元素里记录的时间因此是实际入队时刻
    pub async fn enqueue_with(&self, make: impl FnOnce() -> T) -> Result<()> {
        let permit = self.tx.reserve().await.map_err(|_| BotError::Stopped)?;
        permit.send(make());
        Ok(())
    }

    /// 追加到队尾；队列满时立即返回 `QueueFull`
    pub fn try_enqueue(&self, item: T) -> Result<()> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BotError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BotError::Stopped,
        })
    }

    /// 当前排队的数量
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 消费端已被丢弃（循环已退出）
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 原始发送端，交给后端协作方作为投递目标
    pub fn sender(&self) -> mpsc::Sender<T> {
        self.tx.clone()
    }
}
