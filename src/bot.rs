//! Robonaut：机器人本体
//!
//! 持有连接句柄、两个有界队列与关闭信号，对外提供生命周期操作
//! （start → login/register → establish_sync → event_loop → stop）以及 speak / react。
//!
//! 生命周期操作用 `&mut self` 在事件循环开始前调用；`event_loop`、`speak`、`react`、`stop`
//! 只需要 `&self`，调用方可以把机器人放进 `Arc` 在多个任务间共享。

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{ChatClient, ChatConnector};
use crate::config::AppConfig;
use crate::core::{BotError, BotPhase, Result, ShutdownManager, ShutdownReason};
use crate::dispatch::{
    run_action_loop, run_message_loop, Action, ActionContext, ActionQueue, MessageListener,
    MessageQueue, SendPacer,
};
use crate::models::{Channel, ConnectionStatus, DataStore, Message, User, UserCredentials};

/// 用户级通知主题
const NOTIFY_USER_TOPIC: &str = "stream-notify-user";

/// establish_sync 订阅的 `<uid>/<stream>`
const USER_STREAMS: [&str; 4] = ["message", "notification", "rooms-changed", "subscriptions-changed"];

/// 只能入队的轻量句柄，可 clone 给监听器使用（如回声机器人在回调里 speak）
#[derive(Clone, Debug)]
pub struct BotHandle {
    actions: ActionQueue,
    shutdown: CancellationToken,
}

impl BotHandle {
    /// 入队发送；队列满时等待，已停止时返回 `Stopped`
    pub async fn speak(&self, channel: &Channel, text: impl Into<String>) -> Result<()> {
        let (channel, text) = (channel.clone(), text.into());
        self.enqueue(move || Action::speak(channel, text)).await?;
        tracing::debug!("Speak added to action queue");
        Ok(())
    }

    /// 入队发送，并要求距入队至少 `delay` 后才发出
    ///
    /// 入队时刻指动作真正进入队列的时刻：队列满时调用方等待的时间不计入 `delay`。
    /// 无法换算成时刻的 `delay`（如 `Duration::MAX`）直接返回 `InvalidDelay`。
    pub async fn speak_after(
        &self,
        channel: &Channel,
        text: impl Into<String>,
        delay: Duration,
    ) -> Result<()> {
        if Instant::now().checked_add(delay).is_none() {
            return Err(BotError::InvalidDelay(delay));
        }
        let (channel, text) = (channel.clone(), text.into());
        self.enqueue(move || Action::speak_after(channel, text, delay)).await
    }

    /// 不等待的入队；队列满返回 `QueueFull`
    pub fn try_speak(&self, channel: &Channel, text: impl Into<String>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(BotError::Stopped);
        }
        self.actions.try_enqueue(Action::speak(channel.clone(), text))
    }

    pub async fn react(&self, message: &Message, reaction: impl Into<String>) -> Result<()> {
        let (message, reaction) = (message.clone(), reaction.into());
        self.enqueue(move || Action::react(message, reaction)).await
    }

    /// 排队中的动作数
    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    async fn enqueue(&self, make: impl FnOnce() -> Action) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(BotError::Stopped);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(BotError::Stopped),
            result = self.actions.enqueue_with(make) => result,
        }
    }
}

/// 事件循环启动时取走的消费端，保证每个循环只启动一次
struct LoopInputs {
    actions: mpsc::Receiver<Action>,
    messages: mpsc::Receiver<Message>,
    last_sent: watch::Sender<Option<Instant>>,
}

/// Rocket.Chat 机器人
pub struct Robonaut {
    name: String,
    server_url: String,
    debug: bool,
    email: String,
    default_password: String,
    min_send_interval: Duration,
    connector: Arc<dyn ChatConnector>,
    client: Option<Arc<dyn ChatClient>>,
    identity: Option<User>,
    data: DataStore,
    listener: Option<Arc<dyn MessageListener>>,
    handle: BotHandle,
    messages: MessageQueue,
    loop_inputs: Mutex<Option<LoopInputs>>,
    last_sent: watch::Receiver<Option<Instant>>,
    phase: watch::Sender<BotPhase>,
    shutdown: Arc<ShutdownManager>,
}

impl Robonaut {
    /// 按配置创建机器人；此时尚未连接
    pub fn new(config: &AppConfig, connector: Arc<dyn ChatConnector>) -> Self {
        let shutdown = Arc::new(ShutdownManager::new());
        let (actions, actions_rx) = ActionQueue::bounded(config.queue.action_capacity);
        let (messages, messages_rx) = MessageQueue::bounded(config.queue.message_capacity);
        let (last_sent_tx, last_sent) = watch::channel(None);
        let (phase, _) = watch::channel(BotPhase::Unstarted);

        Self {
            name: config.bot.name.clone(),
            server_url: config.bot.server_url.clone(),
            debug: config.bot.debug,
            email: config.bot.email(),
            default_password: config.bot.default_password.clone(),
            min_send_interval: config.queue.min_send_interval(),
            connector,
            client: None,
            identity: None,
            data: DataStore::default(),
            listener: None,
            handle: BotHandle {
                actions,
                shutdown: shutdown.token(),
            },
            messages,
            loop_inputs: Mutex::new(Some(LoopInputs {
                actions: actions_rx,
                messages: messages_rx,
                last_sent: last_sent_tx,
            })),
            last_sent,
            phase,
            shutdown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> BotPhase {
        *self.phase.borrow()
    }

    /// 订阅阶段变化
    pub fn watch_phase(&self) -> watch::Receiver<BotPhase> {
        self.phase.subscribe()
    }

    /// 登录后绑定的身份
    pub fn identity(&self) -> Option<&User> {
        self.identity.as_ref()
    }

    /// 认证后拉取的快照
    pub fn data(&self) -> &DataStore {
        &self.data
    }

    /// 最近一次成功发送的完成时刻（由动作循环更新）
    pub fn last_message_sent(&self) -> Option<Instant> {
        *self.last_sent.borrow()
    }

    pub fn handle(&self) -> BotHandle {
        self.handle.clone()
    }

    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown)
    }

    /// 已连接的后端句柄
    pub fn client(&self) -> Result<Arc<dyn ChatClient>> {
        if self.phase().is_stopped() {
            return Err(BotError::Stopped);
        }
        self.client.clone().ok_or(BotError::NotStarted)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.phase().is_stopped() {
            return Err(BotError::Stopped);
        }
        Ok(())
    }

    fn advance(&self, phase: BotPhase) {
        self.phase.send_if_modified(|current| {
            if *current == BotPhase::Stopped || *current >= phase {
                return false;
            }
            *current = phase;
            true
        });
    }

    /// 解析服务器地址并建立连接；失败时保持 Unstarted，由调用方决定是否重试
    pub async fn start(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.client.is_some() {
            tracing::warn!("{} already connected", self.name);
            return Ok(());
        }

        let url = Url::parse(&self.server_url).map_err(|e| BotError::InvalidUrl {
            url: self.server_url.clone(),
            reason: e.to_string(),
        })?;

        let client = self.connector.connect(&url, self.debug).await.map_err(|e| {
            tracing::error!("Failed to connect to {}: {}", url, e);
            BotError::Connect(e)
        })?;

        self.client = Some(client);
        self.advance(BotPhase::Connected);
        tracing::info!("{} connected to {}", self.name, url);
        Ok(())
    }

    /// 登录已有账号：实时通道登录、标记在线、再用返回的 token 登录 REST 通道
    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        let client = self.client()?;

        let user = client
            .login(&UserCredentials::with_email(email, password))
            .await
            .map_err(|e| {
                tracing::warn!("{} failed to login: {}", self.name, e);
                BotError::Auth(e)
            })?;

        client.connection_online().await;

        client
            .rest_login(&UserCredentials::with_token(&user.id, &user.token))
            .await
            .map_err(|e| {
                tracing::warn!("{} failed to login rest: {}", self.name, e);
                BotError::Auth(e)
            })?;

        tracing::info!("{} logged in as {}", self.name, user.username);
        self.identity = Some(user);
        self.advance(BotPhase::Authenticated);
        Ok(())
    }

    /// 以 `name@email_domain` 与默认密码注册账号
    pub async fn register(&mut self) -> Result<()> {
        let client = self.client()?;
        let credentials = UserCredentials {
            email: Some(self.email.clone()),
            name: Some(self.name.clone()),
            password: Some(self.default_password.clone()),
            ..Default::default()
        };

        let user = client.register_user(&credentials).await.map_err(|e| {
            tracing::warn!("{} failed to register: {}", self.name, e);
            BotError::Auth(e)
        })?;

        tracing::info!("{} registered as {}", self.name, user.username);
        self.identity = Some(user);
        self.advance(BotPhase::Authenticated);
        Ok(())
    }

    /// 先用默认凭据登录，失败则注册一次；两次都失败时返回合并后的错误
    pub async fn login_or_register(&mut self) -> Result<()> {
        let email = self.email.clone();
        let password = self.default_password.clone();

        let login_err = match self.login(&email, &password).await {
            Ok(()) => return Ok(()),
            Err(e @ (BotError::NotStarted | BotError::Stopped)) => return Err(e),
            Err(e) => e,
        };

        tracing::info!("{} unable to login, registering", self.name);
        self.register().await.map_err(|register_err| {
            tracing::error!("Failed to register {}: {}", self.name, register_err);
            BotError::LoginOrRegister {
                login: login_err.to_string(),
                register: register_err.to_string(),
            }
        })
    }

    /// 订阅任意主题
    pub async fn subscribe(&self, topic: &str, args: &str) -> Result<()> {
        self.client()?
            .subscribe(topic, args)
            .await
            .map_err(BotError::Subscription)
    }

    /// 订阅机器人自己的用户级通知流；任一订阅失败即返回
    pub async fn establish_sync(&mut self) -> Result<()> {
        self.client()?;
        let user_id = self
            .identity
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or(BotError::NotAuthenticated)?;

        for stream in USER_STREAMS {
            self.subscribe(NOTIFY_USER_TOPIC, &format!("{}/{}", user_id, stream))
                .await?;
        }

        self.advance(BotPhase::Synced);
        tracing::info!("{} established sync", self.name);
        Ok(())
    }

    /// 拉取快照数据
    ///
    /// 频道、公共设置、权限为必需项：任一失败立即返回 `Fetch`，后续拉取跳过；
    /// 用户角色与频道订阅为可选项：失败只记录日志，对应字段保持为空。
    pub async fn sync_initial_data(&mut self) -> Result<()> {
        let client = self.client()?;
        let fetch_err = |what: &'static str| move |reason: String| BotError::Fetch { what, reason };

        self.data.my_channels = client.get_channels_in().await.map_err(fetch_err("channels"))?;
        self.data.settings = client
            .get_public_settings()
            .await
            .map_err(fetch_err("settings"))?;
        self.data.permissions = client
            .get_permissions()
            .await
            .map_err(fetch_err("permissions"))?;

        match client.get_user_roles().await {
            Ok(roles) => self.data.user_roles = roles,
            Err(e) => tracing::warn!("{} could not fetch user roles: {}", self.name, e),
        }

        match client.get_channel_subscriptions().await {
            Ok(subscriptions) => self.data.channel_subscriptions = subscriptions,
            Err(e) => tracing::warn!("{} could not fetch channel subscriptions: {}", self.name, e),
        }

        tracing::info!(
            "{} synced {} channels, {} settings, {} permissions",
            self.name,
            self.data.my_channels.len(),
            self.data.settings.len(),
            self.data.permissions.len()
        );
        Ok(())
    }

    /// 机器人所在的频道
    pub async fn get_channels(&self) -> Result<Vec<Channel>> {
        self.client()?
            .get_channels_in()
            .await
            .map_err(|reason| BotError::Fetch {
                what: "channels",
                reason,
            })
    }

    pub async fn create_channel(&self, channel: &Channel) -> Result<()> {
        self.client()?
            .create_channel(&channel.name, &[])
            .await
            .map_err(BotError::CreateChannel)
    }

    /// 把频道的新消息接入入站队列
    pub async fn listen_to_comms_channel(&self, channel: &Channel) -> Result<()> {
        self.client()?
            .subscribe_to_message_stream(channel, self.messages.sender())
            .await
            .map_err(BotError::Subscription)?;
        tracing::info!("{} listening to {}", self.name, channel.name);
        Ok(())
    }

    /// 把发给自己的消息接入入站队列
    pub async fn listen_to_my_messages(&self) -> Result<()> {
        self.client()?
            .subscribe_to_my_messages(self.messages.sender())
            .await
            .map_err(BotError::Subscription)
    }

    /// 设置入站消息监听器；在 event_loop 启动时读取，之后的修改不影响运行中的循环
    pub fn set_message_listener(&mut self, listener: Arc<dyn MessageListener>) {
        if self.phase() == BotPhase::Running {
            tracing::warn!("{} listener changed while running, running loops keep the old one", self.name);
        }
        self.listener = Some(listener);
    }

    pub fn add_connection_status_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.client()?.add_status_listener(Box::new(listener));
        Ok(())
    }

    /// 直接透传给后端；不改变生命周期阶段，也不会重新订阅
    pub async fn reconnect(&self) -> Result<()> {
        self.client()?.reconnect().await;
        tracing::info!("{} reconnected", self.name);
        Ok(())
    }

    /// 入队发送到频道
    pub async fn speak(&self, channel: &Channel, text: impl Into<String>) -> Result<()> {
        self.handle.speak(channel, text).await
    }

    pub async fn speak_after(
        &self,
        channel: &Channel,
        text: impl Into<String>,
        delay: Duration,
    ) -> Result<()> {
        self.handle.speak_after(channel, text, delay).await
    }

    pub fn try_speak(&self, channel: &Channel, text: impl Into<String>) -> Result<()> {
        self.handle.try_speak(channel, text)
    }

    /// 入队表情回应
    pub async fn react(&self, message: &Message, reaction: impl Into<String>) -> Result<()> {
        self.handle.react(message, reaction).await
    }

    /// 启动动作循环与消息循环，阻塞直到关闭信号
    pub async fn event_loop(&self) -> Result<()> {
        let client = self.client()?;
        let inputs = self
            .loop_inputs
            .lock()
            .await
            .take()
            .ok_or(BotError::AlreadyRunning)?;

        let token = self.shutdown.token();
        let ctx = ActionContext::new(
            self.name.clone(),
            client,
            SendPacer::new(self.min_send_interval, inputs.last_sent),
        );

        let action_task = tokio::spawn(run_action_loop(inputs.actions, ctx, token.clone()));
        let message_task = tokio::spawn(run_message_loop(
            inputs.messages,
            self.listener.clone(),
            token,
        ));

        self.advance(BotPhase::Running);
        tracing::info!("{} event loop running", self.name);

        self.shutdown.wait_for_shutdown().await;

        let (actions, messages) = tokio::join!(action_task, message_task);
        if let Err(e) = actions {
            tracing::error!("{} action loop panicked: {}", self.name, e);
        }
        if let Err(e) = messages {
            tracing::error!("{} message loop panicked: {}", self.name, e);
        }

        tracing::info!("{} event loop finished", self.name);
        Ok(())
    }

    /// 发出关闭信号并关闭连接；终态，第二次调用返回 `Stopped`
    ///
    /// 先取消 token 再切换阶段：观察到 `Stopped` 时新的入队必然失败。
    /// 队列中尚未处理的动作与消息直接丢弃。
    pub async fn stop(&self) -> Result<()> {
        self.shutdown.shutdown(ShutdownReason::Stopped);
        let previous = self.phase.send_replace(BotPhase::Stopped);
        if previous == BotPhase::Stopped {
            return Err(BotError::Stopped);
        }

        if let Some(client) = &self.client {
            client.close().await;
        }

        tracing::info!("{} stopped", self.name);
        Ok(())
    }
}
