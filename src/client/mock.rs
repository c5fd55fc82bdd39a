//! 内存版聊天后端（用于测试与本地演示，无需服务器）
//!
//! 记录每次发送 / 表情回应及其时间点，支持按文本注入发送失败、按类别注入拉取失败，
//! 并可通过 `deliver` 模拟服务器推送入站消息。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use super::traits::{ChatClient, ChatConnector, StatusListener};
use crate::models::{
    Channel, ChannelSubscription, ConnectionStatus, Message, Permission, Setting, User,
    UserCredentials, UserRole,
};

/// 可注入失败的快照拉取类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFetch {
    Channels,
    Settings,
    Permissions,
    Subscriptions,
    Roles,
}

/// 客户端上发生过的出站操作
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Sent {
        channel_id: String,
        text: String,
        at: Instant,
    },
    Reacted {
        message_id: String,
        reaction: String,
        at: Instant,
    },
}

/// 一次成功的发送
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: User,
}

/// 内存聊天客户端
pub struct MockChatClient {
    accounts: Mutex<HashMap<String, Account>>,
    reject_registration: AtomicBool,
    login_attempts: AtomicUsize,
    register_attempts: AtomicUsize,
    online: AtomicBool,
    rest_logged_in: AtomicBool,
    closed: AtomicBool,
    reconnects: AtomicUsize,
    fail_subscriptions: AtomicBool,
    subscriptions: Mutex<Vec<(String, String)>>,
    /// (频道 ID，None 表示「发给我的消息」)
    streams: Mutex<Vec<(Option<String>, mpsc::Sender<Message>)>>,
    events: Mutex<Vec<MockEvent>>,
    failing_texts: Mutex<HashSet<String>>,
    failing_fetches: Mutex<HashSet<MockFetch>>,
    channels: Mutex<Vec<Channel>>,
    status_listeners: std::sync::Mutex<Vec<StatusListener>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            reject_registration: AtomicBool::new(false),
            login_attempts: AtomicUsize::new(0),
            register_attempts: AtomicUsize::new(0),
            online: AtomicBool::new(false),
            rest_logged_in: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            reconnects: AtomicUsize::new(0),
            fail_subscriptions: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            failing_texts: Mutex::new(HashSet::new()),
            failing_fetches: Mutex::new(HashSet::new()),
            channels: Mutex::new(vec![Channel::new("GENERAL", "general")]),
            status_listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// 预置一个可登录的账号
    pub async fn add_account(&self, email: &str, password: &str, username: &str) -> User {
        let user = User {
            id: format!("user_{}", uuid::Uuid::new_v4()),
            username: username.to_string(),
            token: format!("token_{}", uuid::Uuid::new_v4()),
        };
        self.accounts.lock().await.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    pub fn reject_registration(&self, reject: bool) {
        self.reject_registration.store(reject, Ordering::SeqCst);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// 发送该文本时返回错误
    pub async fn fail_send_of(&self, text: &str) {
        self.failing_texts.lock().await.insert(text.to_string());
    }

    pub async fn fail_fetch(&self, what: MockFetch) {
        self.failing_fetches.lock().await.insert(what);
    }

    /// 模拟服务器推送：投递到订阅了该频道的队列以及「我的消息」队列，返回投递次数
    pub async fn deliver(&self, message: Message) -> usize {
        let sinks: Vec<mpsc::Sender<Message>> = self
            .streams
            .lock()
            .await
            .iter()
            .filter(|(channel_id, _)| {
                channel_id
                    .as_deref()
                    .map(|id| id == message.channel_id)
                    .unwrap_or(true)
            })
            .map(|(_, sink)| sink.clone())
            .collect();

        let mut delivered = 0;
        for sink in sinks {
            if sink.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn events(&self) -> Vec<MockEvent> {
        self.events.lock().await.clone()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                MockEvent::Sent { channel_id, text, at } => Some(SentMessage {
                    channel_id: channel_id.clone(),
                    text: text.clone(),
                    at: *at,
                }),
                MockEvent::Reacted { .. } => None,
            })
            .collect()
    }

    pub async fn subscriptions(&self) -> Vec<(String, String)> {
        self.subscriptions.lock().await.clone()
    }

    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn register_attempts(&self) -> usize {
        self.register_attempts.load(Ordering::SeqCst)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_rest_logged_in(&self) -> bool {
        self.rest_logged_in.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn notify_status(&self, status: ConnectionStatus) {
        if let Ok(listeners) = self.status_listeners.lock() {
            for listener in listeners.iter() {
                listener(status);
            }
        }
    }

    async fn check_fetch(&self, what: MockFetch) -> Result<(), String> {
        if self.failing_fetches.lock().await.contains(&what) {
            return Err(format!("{:?} unavailable", what));
        }
        Ok(())
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.online.store(false, Ordering::SeqCst);
        self.streams.lock().await.clear();
        self.notify_status(ConnectionStatus::Disconnected);
    }

    async fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        self.notify_status(ConnectionStatus::Connecting);
        self.notify_status(ConnectionStatus::Connected);
    }

    async fn connection_online(&self) {
        self.online.store(true, Ordering::SeqCst);
    }

    fn add_status_listener(&self, listener: StatusListener) {
        if let Ok(mut listeners) = self.status_listeners.lock() {
            listeners.push(listener);
        }
    }

    async fn login(&self, credentials: &UserCredentials) -> Result<User, String> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);
        let email = credentials.email.as_deref().unwrap_or_default();
        let password = credentials.password.as_deref().unwrap_or_default();

        match self.accounts.lock().await.get(email) {
            Some(account) if account.password == password => Ok(account.user.clone()),
            Some(_) => Err("incorrect password".to_string()),
            None => Err(format!("user {} not found", email)),
        }
    }

    async fn rest_login(&self, credentials: &UserCredentials) -> Result<(), String> {
        let token = credentials.token.as_deref().unwrap_or_default();
        let known = self
            .accounts
            .lock()
            .await
            .values()
            .any(|a| a.user.token == token);
        if !known {
            return Err("invalid token".to_string());
        }
        self.rest_logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn register_user(&self, credentials: &UserCredentials) -> Result<User, String> {
        self.register_attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject_registration.load(Ordering::SeqCst) {
            return Err("registration disabled".to_string());
        }
        let email = credentials.email.as_deref().unwrap_or_default();
        if self.accounts.lock().await.contains_key(email) {
            return Err(format!("email {} already in use", email));
        }
        let password = credentials.password.as_deref().unwrap_or_default();
        let username = credentials.name.as_deref().unwrap_or(email);
        Ok(self.add_account(email, password, username).await)
    }

    async fn subscribe(&self, topic: &str, args: &str) -> Result<(), String> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(format!("nosub {}", topic));
        }
        self.subscriptions
            .lock()
            .await
            .push((topic.to_string(), args.to_string()));
        Ok(())
    }

    async fn subscribe_to_message_stream(
        &self,
        channel: &Channel,
        sink: mpsc::Sender<Message>,
    ) -> Result<(), String> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(format!("nosub {}", channel.id));
        }
        self.streams.lock().await.push((Some(channel.id.clone()), sink));
        Ok(())
    }

    async fn subscribe_to_my_messages(&self, sink: mpsc::Sender<Message>) -> Result<(), String> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err("nosub my messages".to_string());
        }
        self.streams.lock().await.push((None, sink));
        Ok(())
    }

    async fn send_message(&self, channel: &Channel, text: &str) -> Result<Message, String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("connection closed".to_string());
        }
        if self.failing_texts.lock().await.contains(text) {
            return Err(format!("server rejected message: {}", text));
        }
        self.events.lock().await.push(MockEvent::Sent {
            channel_id: channel.id.clone(),
            text: text.to_string(),
            at: Instant::now(),
        });
        Ok(Message::new(channel.id.clone(), text))
    }

    async fn react_to_message(&self, message: &Message, reaction: &str) -> Result<(), String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("connection closed".to_string());
        }
        self.events.lock().await.push(MockEvent::Reacted {
            message_id: message.id.clone(),
            reaction: reaction.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn get_channels_in(&self) -> Result<Vec<Channel>, String> {
        self.check_fetch(MockFetch::Channels).await?;
        Ok(self.channels.lock().await.clone())
    }

    async fn get_public_settings(&self) -> Result<Vec<Setting>, String> {
        self.check_fetch(MockFetch::Settings).await?;
        Ok(vec![Setting {
            id: "Site_Name".to_string(),
            value: serde_json::json!("Rocket.Chat"),
        }])
    }

    async fn get_permissions(&self) -> Result<Vec<Permission>, String> {
        self.check_fetch(MockFetch::Permissions).await?;
        Ok(vec![Permission {
            id: "create-c".to_string(),
            roles: vec!["admin".to_string(), "user".to_string(), "bot".to_string()],
        }])
    }

    async fn get_channel_subscriptions(&self) -> Result<Vec<ChannelSubscription>, String> {
        self.check_fetch(MockFetch::Subscriptions).await?;
        Ok(self
            .channels
            .lock()
            .await
            .iter()
            .map(|c| ChannelSubscription {
                id: format!("sub_{}", c.id),
                channel_id: c.id.clone(),
                name: c.name.clone(),
                open: true,
            })
            .collect())
    }

    async fn get_user_roles(&self) -> Result<Vec<UserRole>, String> {
        self.check_fetch(MockFetch::Roles).await?;
        Ok(Vec::new())
    }

    async fn create_channel(&self, name: &str, _members: &[String]) -> Result<(), String> {
        let mut channels = self.channels.lock().await;
        if channels.iter().any(|c| c.name == name) {
            return Err(format!("channel {} already exists", name));
        }
        channels.push(Channel::new(format!("room_{}", uuid::Uuid::new_v4()), name));
        Ok(())
    }
}

/// 总是返回同一个 `MockChatClient` 的连接器
pub struct MockConnector {
    client: Arc<MockChatClient>,
    refuse: AtomicBool,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(client: Arc<MockChatClient>) -> Self {
        Self {
            client,
            refuse: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    /// 让后续 connect 失败
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatConnector for MockConnector {
    async fn connect(&self, server: &Url, debug: bool) -> Result<Arc<dyn ChatClient>, String> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(format!("connection refused: {}", server));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        if debug {
            tracing::debug!("Mock connection to {}", server);
        }
        self.client.notify_status(ConnectionStatus::Connected);
        Ok(self.client.clone() as Arc<dyn ChatClient>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_routes_by_channel() {
        let client = MockChatClient::new();
        let (tx_general, mut rx_general) = mpsc::channel(4);
        let (tx_mine, mut rx_mine) = mpsc::channel(4);
        client
            .subscribe_to_message_stream(&Channel::new("GENERAL", "general"), tx_general)
            .await
            .unwrap();
        client.subscribe_to_my_messages(tx_mine).await.unwrap();

        assert_eq!(client.deliver(Message::new("GENERAL", "a")).await, 2);
        assert_eq!(client.deliver(Message::new("random", "b")).await, 1);

        assert_eq!(rx_general.recv().await.unwrap().text, "a");
        assert!(rx_general.try_recv().is_err());
        assert_eq!(rx_mine.recv().await.unwrap().text, "a");
        assert_eq!(rx_mine.recv().await.unwrap().text, "b");
    }

    #[tokio::test]
    async fn test_login_and_register() {
        let client = MockChatClient::new();
        let creds = UserCredentials {
            email: Some("bot@test.com".to_string()),
            name: Some("bot".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(client.login(&creds).await.is_err());
        let registered = client.register_user(&creds).await.unwrap();
        let logged_in = client.login(&creds).await.unwrap();
        assert_eq!(registered, logged_in);
        assert!(client.register_user(&creds).await.is_err());
        assert_eq!(client.login_attempts(), 2);
        assert_eq!(client.register_attempts(), 2);
    }

    #[tokio::test]
    async fn test_status_listener_sees_close() {
        let client = MockChatClient::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.add_status_listener(Box::new(move |s: ConnectionStatus| sink.lock().unwrap().push(s)));

        client.close().await;
        assert!(client.is_closed());
        assert_eq!(*seen.lock().unwrap(), vec![ConnectionStatus::Disconnected]);
    }
}
