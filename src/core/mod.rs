//! 核心：错误类型、生命周期阶段、关闭信号

pub mod error;
pub mod shutdown;
pub mod state;

pub use error::{BotError, Result};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::BotPhase;
