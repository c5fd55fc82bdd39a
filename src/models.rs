//! 聊天后端的数据模型（频道、消息、用户、快照数据）
//!
//! 这些类型由后端协作方定义，本 crate 只读使用，不做修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 聊天频道（房间）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// 发送者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub username: String,
}

/// 一条聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// 所属频道 ID
    pub channel_id: String,
    pub text: String,
    pub sender: Option<Sender>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            channel_id: channel_id.into(),
            text: text.into(),
            sender: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender(mut self, id: impl Into<String>, username: impl Into<String>) -> Self {
        self.sender = Some(Sender {
            id: id.into(),
            username: username.into(),
        });
        self
    }

    /// 是否由指定用户发出
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender.as_ref().map(|s| s.id == user_id).unwrap_or(false)
    }
}

/// 登录 / 注册凭据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub id: Option<String>,
    pub token: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

impl UserCredentials {
    pub fn with_email(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// REST 登录使用实时登录返回的 id + token
    pub fn with_token(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            token: Some(token.into()),
            ..Default::default()
        }
    }
}

/// 机器人登录后的身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub token: String,
}

/// 公共设置项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: String,
    pub value: serde_json::Value,
}

/// 权限及其授予的角色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub roles: Vec<String>,
}

/// 频道订阅（机器人在某频道的成员关系）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub id: String,
    pub channel_id: String,
    pub name: String,
    pub open: bool,
}

/// 用户角色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: String,
    pub roles: Vec<String>,
}

/// 连接状态（状态监听器收到的值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// 认证后拉取的一次性快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataStore {
    pub settings: Vec<Setting>,
    pub my_channels: Vec<Channel>,
    pub permissions: Vec<Permission>,
    pub channel_subscriptions: Vec<ChannelSubscription>,
    pub user_roles: Vec<UserRole>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_sender() {
        let msg = Message::new("general", "hi").with_sender("u1", "alice");
        assert!(msg.is_from("u1"));
        assert!(!msg.is_from("u2"));
        assert!(!Message::new("general", "hi").is_from("u1"));
    }

    #[test]
    fn test_message_serializes() {
        let msg = Message::new("general", "hi").with_id("m1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["channel_id"], "general");
    }
}
