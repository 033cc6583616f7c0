//! 用户通知
//!
//! 通知只做投递，不阻塞核心流程：`Notifier` 为每个通道单独 spawn 任务

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "🚨",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
        }
    }
}

/// 通知通道
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// 写入日志
#[derive(Debug, Default, Clone)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn deliver(&self, n: &Notification) -> Result<()> {
        match n.severity {
            Severity::Info => info!("{} [通知] {}: {}", n.severity.emoji(), n.title, n.body),
            Severity::Warning => warn!("{} [通知] {}: {}", n.severity.emoji(), n.title, n.body),
            Severity::Error => error!("{} [通知] {}: {}", n.severity.emoji(), n.title, n.body),
        }
        Ok(())
    }
}

/// Telegram Bot 通知
pub struct TelegramNotificationSink {
    client: Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

impl TelegramNotificationSink {
    /// 从环境变量创建通知器
    /// 需要设置: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN not set"))?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_CHAT_ID not set"))?;

        Ok(Self {
            client: Client::new(),
            bot_token,
            chat_id,
        })
    }

    fn format(n: &Notification) -> String {
        format!("{} *{}*\n\n{}", n.severity.emoji(), n.title, n.body)
    }

    /// 发送文本消息 (Markdown 格式)
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if response.status().is_success() {
            info!("📨 Telegram message sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to send Telegram message: {} - {}", status, body);
            Err(anyhow::anyhow!("Telegram API error: {}", status))
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotificationSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.send_message(&Self::format(notification)).await
    }
}

/// 内存通道，保留全部通知
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    received: Mutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn received(&self) -> Vec<Notification> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.received.lock().await.push(notification.clone());
        Ok(())
    }
}

/// 通知分发，调用方永不等待投递结果
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn notify(&self, notification: Notification) {
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let notification = notification.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.deliver(&notification).await {
                    warn!("通知投递失败: sink={}, title={}, err={}", sink.name(), notification.title, e);
                }
            });
        }
    }

    pub fn info(&self, title: impl Into<String>, body: impl Into<String>) {
        self.notify(Notification::new(title, body, Severity::Info));
    }

    pub fn warning(&self, title: impl Into<String>, body: impl Into<String>) {
        self.notify(Notification::new(title, body, Severity::Warning));
    }

    pub fn error(&self, title: impl Into<String>, body: impl Into<String>) {
        self.notify(Notification::new(title, body, Severity::Error));
    }
}
