//! 机器人生命周期阶段
//!
//! Unstarted → Connected → Authenticated → Synced → Running → Stopped

use serde::Serialize;

/// 生命周期阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum BotPhase {
    Unstarted,
    Connected,
    Authenticated,
    Synced,
    Running,
    /// 终态，实例不可复用
    Stopped,
}

impl BotPhase {
    /// 是否已建立连接（且尚未停止）
    pub fn is_connected(self) -> bool {
        self >= BotPhase::Connected && self != BotPhase::Stopped
    }

    pub fn is_stopped(self) -> bool {
        self == BotPhase::Stopped
    }
}

impl Default for BotPhase {
    fn default() -> Self {
        Self::Unstarted
    }
}
