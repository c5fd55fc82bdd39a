//! 聊天后端协作方抽象
//!
//! 线协议、认证模型与传输方式（实时 socket / REST）都由实现方负责；
//! 机器人只通过这里的能力与服务器交互。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::mpsc;

use crate::models::{
    Channel, ChannelSubscription, ConnectionStatus, Message, Permission, Setting, User,
    UserCredentials, UserRole,
};

/// 连接状态监听器
pub type StatusListener = Box<dyn Fn(ConnectionStatus) + Send + Sync>;

/// 建立连接：解析好的服务器地址 -> 客户端句柄
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self, server: &Url, debug: bool) -> Result<Arc<dyn ChatClient>, String>;
}

/// 已连接的聊天客户端
///
/// 动作循环与机器人本身会并发使用同一句柄，实现方需保证并发安全。
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// 关闭连接
    async fn close(&self);

    /// 重连（不会恢复订阅）
    async fn reconnect(&self);

    /// 登录后通知服务器在线
    async fn connection_online(&self);

    fn add_status_listener(&self, listener: StatusListener);

    /// 实时通道登录
    async fn login(&self, credentials: &UserCredentials) -> Result<User, String>;

    /// REST 通道登录（使用实时登录拿到的 id + token）
    async fn rest_login(&self, credentials: &UserCredentials) -> Result<(), String>;

    async fn register_user(&self, credentials: &UserCredentials) -> Result<User, String>;

    /// 订阅主题，如 `stream-notify-user` + `<uid>/message`
    async fn subscribe(&self, topic: &str, args: &str) -> Result<(), String>;

    /// 把频道的新消息投递到 `sink`
    async fn subscribe_to_message_stream(
        &self,
        channel: &Channel,
        sink: mpsc::Sender<Message>,
    ) -> Result<(), String>;

    /// 把发给自己的消息投递到 `sink`
    async fn subscribe_to_my_messages(&self, sink: mpsc::Sender<Message>) -> Result<(), String>;

    /// 发送文本，返回服务器保存的消息
    async fn send_message(&self, channel: &Channel, text: &str) -> Result<Message, String>;

    async fn react_to_message(&self, message: &Message, reaction: &str) -> Result<(), String>;

    async fn get_channels_in(&self) -> Result<Vec<Channel>, String>;

    async fn get_public_settings(&self) -> Result<Vec<Setting>, String>;

    async fn get_permissions(&self) -> Result<Vec<Permission>, String>;

    async fn get_channel_subscriptions(&self) -> Result<Vec<ChannelSubscription>, String>;

    async fn get_user_roles(&self) -> Result<Vec<UserRole>, String>;

    async fn create_channel(&self, name: &str, members: &[String]) -> Result<(), String>;
}
