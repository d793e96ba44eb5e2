use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 会话级消息总线的默认容量
const DEFAULT_CAPACITY: usize = 64;

static GLOBAL_BUS: OnceCell<Arc<MessageBus>> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    Info,
    Error,
}

/// 展示给用户的状态消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub id: Uuid,
    pub level: MessageLevel,
    pub text: String,
    /// 触发该消息的操作，如 "toggle_reaction"
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// 用户状态消息总线
#[derive(Debug)]
pub struct MessageBus {
    tx: broadcast::Sender<StatusMessage>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 进程级总线，不会被销毁
    pub fn global() -> Arc<MessageBus> {
        GLOBAL_BUS
            .get_or_init(|| Arc::new(MessageBus::new(DEFAULT_CAPACITY)))
            .clone()
    }

    /// 以指定容量初始化进程级总线；已初始化时返回现有实例
    pub fn init_global(capacity: usize) -> Arc<MessageBus> {
        GLOBAL_BUS
            .get_or_init(|| Arc::new(MessageBus::new(capacity)))
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusMessage> {
        self.tx.subscribe()
    }

    pub fn publish(&self, level: MessageLevel, source: &str, text: impl Into<String>) -> StatusMessage {
        let message = StatusMessage {
            id: Uuid::new_v4(),
            level,
            text: text.into(),
            source: source.to_string(),
            timestamp: Utc::now(),
        };

        if self.tx.send(message.clone()).is_err() {
            debug!("No subscribers for status message from {}", source);
        }
        message
    }

    pub fn success(&self, source: &str, text: impl Into<String>) -> StatusMessage {
        self.publish(MessageLevel::Success, source, text)
    }

    pub fn info(&self, source: &str, text: impl Into<String>) -> StatusMessage {
        self.publish(MessageLevel::Info, source, text)
    }

    pub fn error(&self, source: &str, text: impl Into<String>) -> StatusMessage {
        self.publish(MessageLevel::Error, source, text)
    }
}

/// 把状态消息写入日志的后台任务
///
/// 订阅在 `spawn` 返回前完成；`shutdown` 会先处理完已发布的消息再退出。
pub struct MessageLogger {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<usize>,
}

impl MessageLogger {
    pub fn spawn(bus: &MessageBus) -> Self {
        let mut messages = bus.subscribe();
        let (shutdown, mut stop) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut logged = 0;
            loop {
                tokio::select! {
                    received = messages.recv() => match received {
                        Ok(message) => {
                            log_status(&message);
                            logged += 1;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Status message logger lagged, {} messages dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut stop => {
                        while let Ok(message) = messages.try_recv() {
                            log_status(&message);
                            logged += 1;
                        }
                        break;
                    }
                }
            }
            logged
        });

        Self { shutdown, handle }
    }

    /// 停止任务，返回共记录的消息数
    pub async fn shutdown(self) -> usize {
        // 任务已退出时发送失败，直接等待结果即可
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(logged) => logged,
            Err(e) => {
                warn!("Status message logger stopped abnormally: {}", e);
                0
            }
        }
    }
}

fn log_status(message: &StatusMessage) {
    match message.level {
        MessageLevel::Error => error!("[{}] {}", message.source, message.text),
        MessageLevel::Success | MessageLevel::Info => info!("[{}] {}", message.source, message.text),
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_messages() {
        let bus = MessageBus::new(8);
        let mut rx = bus.subscribe();

        bus.error("mark_read", "网络连接失败");
        bus.success("register", "报名成功");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, MessageLevel::Error);
        assert_eq!(first.source, "mark_read");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, MessageLevel::Success);
        assert_eq!(second.text, "报名成功");
    }

    #[tokio::test]
    async fn test_logger_drains_messages_published_before_shutdown() {
        let bus = MessageBus::new(16);
        let logger = MessageLogger::spawn(&bus);

        bus.success("register", "报名成功，等待审核");
        bus.error("toggle_reaction", "网络连接失败，请检查网络后重试");
        bus.info("load_events", "已加载 3 个活动");

        assert_eq!(logger.shutdown().await, 3);
    }

    #[test]
    fn test_global_bus_is_shared() {
        let a = MessageBus::global();
        let b = MessageBus::global();
        assert!(Arc::ptr_eq(&a, &b));

        // 没有订阅者时发布不会出错
        a.info("test", "hello");
    }
}
