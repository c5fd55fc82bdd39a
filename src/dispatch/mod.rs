//! 动作分发引擎
//!
//! - **queue**: 有界 FIFO 队列（ActionQueue / MessageQueue）
//! - **action**: Speak / React 及其执行
//! - **pacer**: 发送节流（全局最小间隔 + 单条延迟）
//! - **listener**: 入站消息监听器
//! - **event_loop**: 动作循环与消息循环

pub mod action;
pub mod event_loop;
pub mod listener;
pub mod pacer;
pub mod queue;

pub use action::{Action, ActionContext, ReactAction, SpeakAction};
pub use event_loop::{run_action_loop, run_message_loop};
pub use listener::{FnListener, MessageListener};
pub use pacer::SendPacer;
pub use queue::{ActionQueue, MessageQueue, WorkQueue};
