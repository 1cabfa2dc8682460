//! Telegram Bot API — HTML notifications and long polling for bot commands.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use lockwarden_core::target::NotificationTarget;
use lockwarden_core::traits::{Notification, Notifier, NotifyError};
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://api.telegram.org";

/// Bot API client shared by the notifier and the command poller.
#[derive(Clone)]
pub struct TelegramApi {
    bot_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<TelegramUpdate>, NotifyError> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await
            .map_err(|e| NotifyError::Http(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| NotifyError::Http(format!("Invalid Telegram response: {e}")))?;

        body.into_result()
    }

    /// Send an HTML-formatted message.
    pub async fn send_message(&self, chat_id: &str, html: &str) -> Result<(), NotifyError> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured("telegram bot token".into()));
        }
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": html,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| NotifyError::Http(format!("Invalid send response: {e}")))?;

        result.into_result().map(|_| ())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser, NotifyError> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| NotifyError::Http(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| NotifyError::Http(format!("Invalid getMe response: {e}")))?;
        body.into_result()
    }

    /// Start polling loop, returning a stream of text messages.
    pub fn start_polling(self, timeout_secs: u64) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut offset = 0i64;
            tracing::info!("🤖 Telegram polling loop started");

            loop {
                match self.get_updates(offset, timeout_secs).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
                if tx.is_closed() {
                    return;
                }
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingText>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingText;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A text message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
}

/// Delivers notifications to the target's chat.
pub struct TelegramNotifier {
    api: TelegramApi,
}

impl TelegramNotifier {
    pub fn new(api: TelegramApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        notification: &Notification,
        target: &NotificationTarget,
    ) -> Result<(), NotifyError> {
        if !target.has_chat() {
            return Err(NotifyError::NotConfigured("telegram chat id".into()));
        }
        self.api
            .send_message(target.chat_id.trim(), &render_html(notification))
            .await?;
        tracing::debug!("📨 Telegram {} notification sent", notification.tier);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}

/// `<b>emoji subject</b>` followed by the escaped body.
pub fn render_html(notification: &Notification) -> String {
    format!(
        "{} <b>{}</b>\n{}",
        notification.tier.emoji(),
        escape_html(&notification.subject),
        escape_html(&notification.body)
    )
}

/// Escape the three characters Telegram's HTML mode treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> TelegramApiResponse<T> {
    fn into_result(self) -> Result<T, NotifyError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(NotifyError::Http("Telegram response without result".into())),
            (false, _) => Err(NotifyError::Rejected(
                self.description.unwrap_or_else(|| "unknown Telegram error".into()),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramUpdate {
    pub fn to_incoming(&self) -> Option<IncomingText> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;

        if from.is_bot {
            return None;
        }

        let sender_name = match &from.username {
            Some(username) => format!("@{username}"),
            None => format!(
                "{}{}",
                from.first_name,
                from.last_name
                    .as_deref()
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default()
            ),
        };

        Some(IncomingText {
            chat_id: msg.chat.id.to_string(),
            sender_id: from.id.to_string(),
            sender_name,
            text: text.clone(),
        })
    }
}
