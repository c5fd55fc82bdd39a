//! 两个消费循环：动作循环与消息循环
//!
//! 单条失败只记录日志，循环继续；关闭信号触发后立即退出，队列中剩余项被丢弃。
//! 监听器 panic 也按单条失败处理。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Message;

use super::action::{Action, ActionContext};
use super::listener::MessageListener;

/// 依次取出并执行动作，直到关闭
pub async fn run_action_loop(
    mut actions: mpsc::Receiver<Action>,
    mut ctx: ActionContext,
    token: CancellationToken,
) {
    let bot = ctx.bot_name().to_string();
    tracing::info!("{} action loop started", bot);
    loop {
        let action = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = actions.recv() => match next {
                Some(action) => action,
                None => break,
            },
        };

        let kind = action.kind();
        tracing::debug!("{} processing action: {}", bot, kind);

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::warn!("{} abandoned in-flight {} action on shutdown", bot, kind);
                break;
            }
            result = action.execute(&mut ctx) => {
                if let Err(e) = result {
                    tracing::error!("{} {} action failed: {}", bot, kind, e);
                }
            }
        }
    }

    tracing::info!("{} action loop stopped", bot);
}

/// 依次取出入站消息交给监听器，直到关闭
pub async fn run_message_loop(
    mut messages: mpsc::Receiver<Message>,
    listener: Option<Arc<dyn MessageListener>>,
    token: CancellationToken,
) {
    tracing::info!("Message loop started");
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = messages.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let Some(listener) = listener.as_ref() else {
            tracing::debug!("No message listener, dropping message {}", message.id);
            continue;
        };

        let id = message.id.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = AssertUnwindSafe(listener.on_message(message)).catch_unwind() => match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Message listener failed on {}: {:#}", id, e),
                Err(_) => tracing::error!("Message listener panicked on {}", id),
            },
        }
    }
    tracing::info!("Message loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::time::Instant;

    use async_trait::async_trait;

    use crate::client::{MockChatClient, MockEvent};
    use crate::dispatch::listener::FnListener;
    use crate::dispatch::pacer::SendPacer;
    use crate::models::Channel;

    fn spawn_action_loop(
        client: Arc<MockChatClient>,
    ) -> (mpsc::Sender<Action>, CancellationToken, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(100);
        let (last_tx, _) = watch::channel(None);
        let ctx = ActionContext::new("robo", client, SendPacer::new(Duration::from_secs(2), last_tx));
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_action_loop(rx, ctx, token.clone()));
        (tx, token, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_run_in_order() {
        let client = Arc::new(MockChatClient::new());
        let (tx, token, handle) = spawn_action_loop(client.clone());
        let general = Channel::new("GENERAL", "general");
        let target = Message::new("GENERAL", "x").with_id("m1");

        tx.send(Action::speak(general.clone(), "one")).await.unwrap();
        tx.send(Action::react(target, ":eyes:")).await.unwrap();
        tx.send(Action::speak(general.clone(), "two")).await.unwrap();
        tx.send(Action::speak(general, "three")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
        handle.await.unwrap();

        let order: Vec<String> = client
            .events()
            .await
            .into_iter()
            .map(|e| match e {
                MockEvent::Sent { text, .. } => text,
                MockEvent::Reacted { reaction, .. } => reaction,
            })
            .collect();
        assert_eq!(order, vec!["one", ":eyes:", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_does_not_stop_loop() {
        let client = Arc::new(MockChatClient::new());
        client.fail_send_of("bad").await;
        let (tx, token, handle) = spawn_action_loop(client.clone());
        let general = Channel::new("GENERAL", "general");

        tx.send(Action::speak(general.clone(), "bad")).await.unwrap();
        tx.send(Action::speak(general, "good")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
        handle.await.unwrap();

        let sent = client.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "good");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_queued_actions() {
        let client = Arc::new(MockChatClient::new());
        let (tx, token, handle) = spawn_action_loop(client.clone());
        let general = Channel::new("GENERAL", "general");

        tx.send(Action::speak(general.clone(), "first")).await.unwrap();
        tx.send(Action::speak(general, "second")).await.unwrap();

        // 第二条需要等待 2 秒节流，此时关闭
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
        handle.await.unwrap();

        let sent = client.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "first");
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_delay_does_not_kill_loop() {
        let client = Arc::new(MockChatClient::new());
        let (tx, token, handle) = spawn_action_loop(client.clone());
        let general = Channel::new("GENERAL", "general");

        tx.send(Action::speak(general.clone(), "first")).await.unwrap();
        tx.send(Action::speak_after(general, "never", Duration::MAX)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!handle.is_finished());
        token.cancel();
        handle.await.unwrap();
        assert_eq!(client.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_listener_sees_messages_in_order() {
        let (tx, rx) = mpsc::channel(100);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn MessageListener> = Arc::new(FnListener::new(move |m: Message| {
            sink.lock().unwrap().push(m.text);
            Ok(())
        }));
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_message_loop(rx, Some(listener), token.clone()));

        for text in ["M1", "M2", "M3"] {
            tx.send(Message::new("GENERAL", text)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["M1", "M2", "M3"]);
    }

    #[tokio::test]
    async fn test_listener_error_does_not_stop_loop() {
        let (tx, rx) = mpsc::channel(100);
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = count.clone();
        let listener: Arc<dyn MessageListener> = Arc::new(FnListener::new(move |m: Message| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if m.text == "bad" {
                anyhow::bail!("cannot handle {}", m.text);
            }
            Ok(())
        }));
        let handle = tokio::spawn(run_message_loop(rx, Some(listener), CancellationToken::new()));

        tx.send(Message::new("GENERAL", "bad")).await.unwrap();
        tx.send(Message::new("GENERAL", "ok")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_listener_drains_queue() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(run_message_loop(rx, None, CancellationToken::new()));
        for i in 0..10 {
            tx.send(Message::new("GENERAL", format!("m{}", i))).await.unwrap();
        }
        drop(tx);
        let started = Instant::now();
        handle.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_stop_loop() {
        let (tx, rx) = mpsc::channel(100);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn MessageListener> = Arc::new(FnListener::new(move |m: Message| {
            if m.text == "boom" {
                panic!("listener cannot handle {}", m.text);
            }
            sink.lock().unwrap().push(m.text);
            Ok(())
        }));
        let handle = tokio::spawn(run_message_loop(rx, Some(listener), CancellationToken::new()));

        for text in ["before", "boom", "after"] {
            tx.send(Message::new("GENERAL", text)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["before", "after"]);
    }

    /// 每条消息处理 10 秒的监听器
    struct SlowListener {
        started: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl MessageListener for SlowListener {
        async fn on_message(&self, _message: Message) -> anyhow::Result<()> {
            self.started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_queued_messages() {
        let (tx, rx) = mpsc::channel(100);
        let started = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let listener: Arc<dyn MessageListener> = Arc::new(SlowListener {
            started: started.clone(),
        });
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_message_loop(rx, Some(listener), token.clone()));

        for text in ["M1", "M2", "M3"] {
            tx.send(Message::new("GENERAL", text)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(started.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(tx.is_closed());
    }
}
