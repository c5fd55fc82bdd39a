//! 机器人错误类型
//!
//! 生命周期操作（start / login / establish_sync 等）把错误同步返回给调用方；
//! 动作执行与监听器的错误只在消费循环内记录日志，不会出现在这里以外的地方。

use std::time::Duration;

use thiserror::Error;

/// Robonaut 对外暴露的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    #[error("Invalid server url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Auth error: {0}")]
    Auth(String),

    /// 登录失败后注册也失败，两次的错误一并返回
    #[error("Login failed ({login}); register failed ({register})")]
    LoginOrRegister { login: String, register: String },

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Create channel error: {0}")]
    CreateChannel(String),

    #[error("Fetch error ({what}): {reason}")]
    Fetch { what: &'static str, reason: String },

    #[error("Bot not started")]
    NotStarted,

    #[error("Bot not authenticated")]
    NotAuthenticated,

    #[error("Event loop already running")]
    AlreadyRunning,

    /// 延迟大到无法换算成时刻
    #[error("Invalid delay {0:?}")]
    InvalidDelay(Duration),

    #[error("Action queue full")]
    QueueFull,

    #[error("Bot stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, BotError>;
