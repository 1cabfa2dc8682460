//! Notifier trait and delivery errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::target::NotificationTarget;
use crate::types::EscalationTier;

/// Errors that can occur during notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("channel rejected the message: {0}")]
    Rejected(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("channel not configured: {0}")]
    NotConfigured(String),

    #[error("delivery timed out after {0}s")]
    Timeout(u64),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub tier: EscalationTier,
    /// Short title, used as email subject and bold chat header.
    pub subject: String,
    pub body: String,
    /// Action this notification is about, if any.
    pub action_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(tier: EscalationTier, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            tier,
            subject: subject.into(),
            body: body.into(),
            action_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_action(mut self, action_id: &str) -> Self {
        self.action_id = Some(action_id.to_string());
        self
    }
}

/// A delivery channel. The target is passed per call so operator edits apply
/// to the very next message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        notification: &Notification,
        target: &NotificationTarget,
    ) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g. "telegram", "email").
    fn channel_name(&self) -> &str;
}
