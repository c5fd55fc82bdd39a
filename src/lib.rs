//! Robonaut - Rocket.Chat 机器人客户端
//!
//! 模块划分：
//! - **bot**: 机器人本体（生命周期、speak / react、事件循环）
//! - **client**: 聊天后端协作方抽象与内存实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、生命周期阶段、关闭信号
//! - **dispatch**: 动作队列、节流、消息分发循环
//! - **models**: 频道、消息、用户等数据模型
//! - **observability**: 日志初始化

pub mod bot;
pub mod client;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod models;
pub mod observability;

pub use bot::{BotHandle, Robonaut};
pub use crate::core::{BotError, BotPhase};
