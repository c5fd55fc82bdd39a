//! 聊天后端客户端抽象与实现
//!
//! 真实后端由调用方实现 `ChatConnector` / `ChatClient`；`mock` 提供内存实现。

pub mod mock;
pub mod traits;

pub use mock::{MockChatClient, MockConnector, MockEvent, MockFetch, SentMessage};
pub use traits::{ChatClient, ChatConnector, StatusListener};
