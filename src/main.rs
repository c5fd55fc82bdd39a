//! Robonaut 演示：连接内存后端的回声机器人
//!
//! 配置见 config/default.toml，环境变量 ROBONAUT__* 可覆盖；Ctrl+C 退出。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use robonaut::client::{MockChatClient, MockConnector};
use robonaut::config::load_config;
use robonaut::dispatch::FnListener;
use robonaut::models::{Channel, Message};
use robonaut::{observability, Robonaut};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).context("Failed to load config")?;
    let backend = Arc::new(MockChatClient::new());
    let mut bot = Robonaut::new(&config, Arc::new(MockConnector::new(backend.clone())));

    bot.start().await.context("Failed to start")?;
    bot.login_or_register().await.context("Failed to login")?;
    bot.establish_sync().await.context("Failed to establish sync")?;
    if let Err(e) = bot.sync_initial_data().await {
        tracing::warn!("Initial data incomplete: {}", e);
    }

    let general = bot
        .data()
        .my_channels
        .first()
        .cloned()
        .unwrap_or_else(|| Channel::new("GENERAL", "general"));
    bot.listen_to_comms_channel(&general).await?;

    let self_id = bot.identity().map(|u| u.id.clone()).unwrap_or_default();
    let handle = bot.handle();
    let echo_channel = general.clone();
    bot.set_message_listener(Arc::new(FnListener::new(move |message: Message| {
        if message.is_from(&self_id) {
            return Ok(());
        }
        handle
            .try_speak(&echo_channel, format!("echo: {}", message.text))
            .context("echo dropped")
    })));

    let bot = Arc::new(bot);
    let shutdown = bot.shutdown_manager();
    shutdown.install_signal_handlers();
    let mut reasons = shutdown.subscribe();

    let mut phases = bot.watch_phase();
    tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            tracing::debug!("Bot phase: {:?}", *phases.borrow_and_update());
        }
    });

    // 模拟用户在频道里说话
    let feeder = {
        let backend = backend.clone();
        let channel_id = general.id.clone();
        tokio::spawn(async move {
            for i in 1.. {
                tokio::time::sleep(Duration::from_secs(3)).await;
                let message = Message::new(channel_id.clone(), format!("hello #{}", i))
                    .with_sender("human", "human");
                if backend.deliver(message).await == 0 {
                    break;
                }
            }
        })
    };

    bot.speak(&general, "robonaut online").await?;
    bot.event_loop().await?;
    if let Ok(reason) = reasons.try_recv() {
        tracing::info!("Shutdown reason: {:?}", reason);
    }

    feeder.abort();
    if let Err(e) = bot.stop().await {
        tracing::debug!("Stop after shutdown: {}", e);
    }
    tracing::info!("{} messages sent", backend.sent().await.len());
    Ok(())
}
