//! 发送节流
//!
//! 两个独立约束取较晚者：
//! - 全局下限：距上一次成功发送至少 `min_interval`
//! - 单条延迟：距入队时刻至少 `delay`
//!
//! 只由动作循环持有和修改；最近发送时间通过 watch 通道发布给只读方。

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// 加法溢出时的兜底等待，约 30 年
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `at + d`，溢出时退化为很远的将来而不是 panic
fn saturating_add(at: Instant, d: Duration) -> Instant {
    at.checked_add(d)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

/// 动作循环独占的节流状态
#[derive(Debug)]
pub struct SendPacer {
    min_interval: Duration,
    last_sent: Option<Instant>,
    published: watch::Sender<Option<Instant>>,
}

impl SendPacer {
    pub fn new(min_interval: Duration, published: watch::Sender<Option<Instant>>) -> Self {
        let last_sent = *published.borrow();
        Self {
            min_interval,
            last_sent,
            published,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// 最早允许发送的时刻；None 表示可立即发送
    pub fn deadline(&self, queued_at: Instant, delay: Option<Duration>) -> Option<Instant> {
        let floor = self.last_sent.map(|t| saturating_add(t, self.min_interval));
        let requested = delay.map(|d| saturating_add(queued_at, d));
        match (floor, requested) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// 等到允许发送
    pub async fn wait(&self, queued_at: Instant, delay: Option<Duration>) {
        if let Some(deadline) = self.deadline(queued_at, delay) {
            if deadline > Instant::now() {
                tokio::time::sleep_until(deadline).await;
            }
        }
    }

    /// 记录一次成功发送的完成时刻
    pub fn record_sent(&mut self, at: Instant) {
        self.last_sent = Some(at);
        self.published.send_replace(Some(at));
    }
}
