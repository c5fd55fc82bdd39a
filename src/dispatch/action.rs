//! 出站动作：Speak / React
//!
//! 动作入队后不可变，由动作循环取出执行，执行完即丢弃（无论成功与否，不重试）。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::ChatClient;
use crate::core::{BotError, Result};
use crate::models::{Channel, Message};

use super::pacer::SendPacer;

/// 向频道发送文本
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakAction {
    pub channel: Channel,
    pub text: String,
    /// 相对入队时刻的额外延迟
    pub delay: Option<Duration>,
    pub queued_at: Instant,
}

/// 对消息添加表情回应
#[derive(Debug, Clone, PartialEq)]
pub struct ReactAction {
    pub message: Message,
    /// 如 `:thumbsup:`
    pub reaction: String,
}

/// 出站动作
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Speak(SpeakAction),
    React(ReactAction),
}

impl Action {
    pub fn speak(channel: Channel, text: impl Into<String>) -> Self {
        Self::Speak(SpeakAction {
            channel,
            text: text.into(),
            delay: None,
            queued_at: Instant::now(),
        })
    }

    pub fn speak_after(channel: Channel, text: impl Into<String>, delay: Duration) -> Self {
        Self::Speak(SpeakAction {
            channel,
            text: text.into(),
            delay: Some(delay),
            queued_at: Instant::now(),
        })
    }

    pub fn react(message: Message, reaction: impl Into<String>) -> Self {
        Self::React(ReactAction {
            message,
            reaction: reaction.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Speak(_) => "speak",
            Action::React(_) => "react",
        }
    }

    /// 执行动作；错误由调用方（动作循环）记录后丢弃
    pub async fn execute(self, ctx: &mut ActionContext) -> Result<()> {
        match self {
            Action::Speak(speak) => speak.execute(ctx).await,
            Action::React(react) => react.execute(ctx).await,
        }
    }
}

impl SpeakAction {
    async fn execute(self, ctx: &mut ActionContext) -> Result<()> {
        ctx.pacer.wait(self.queued_at, self.delay).await;

        ctx.client
            .send_message(&self.channel, &self.text)
            .await
            .map_err(BotError::Send)?;

        ctx.pacer.record_sent(Instant::now());
        tracing::debug!("{} spoke in {}", ctx.bot_name, self.channel.name);
        Ok(())
    }
}

impl ReactAction {
    async fn execute(self, ctx: &mut ActionContext) -> Result<()> {
        ctx.client
            .react_to_message(&self.message, &self.reaction)
            .await
            .map_err(BotError::Send)
    }
}

/// 动作执行上下文：后端句柄 + 节流状态，归动作循环独占
pub struct ActionContext {
    bot_name: String,
    client: Arc<dyn ChatClient>,
    pacer: SendPacer,
}

impl ActionContext {
    pub fn new(bot_name: impl Into<String>, client: Arc<dyn ChatClient>, pacer: SendPacer) -> Self {
        Self {
            bot_name: bot_name.into(),
            client,
            pacer,
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn pacer(&self) -> &SendPacer {
        &self.pacer
    }
}
