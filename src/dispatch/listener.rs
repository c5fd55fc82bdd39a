//! 入站消息监听器

use async_trait::async_trait;

use crate::models::Message;

/// 入站消息监听器：消息循环对每条消息调用一次，返回的错误只记录日志
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: Message) -> anyhow::Result<()>;
}

/// 用同步闭包实现的监听器
pub struct FnListener<F> {
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(Message) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> MessageListener for FnListener<F>
where
    F: Fn(Message) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_message(&self, message: Message) -> anyhow::Result<()> {
        (self.f)(message)
    }
}
