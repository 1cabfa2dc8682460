//! Email channel: plain-text alerts over SMTP (async lettre).
//!
//! A transport is built per message from the current target, so SMTP
//! changes apply immediately and no connection outlives a send.

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use lockwarden_core::target::{NotificationTarget, SmtpSettings};
use lockwarden_core::traits::{Notification, Notifier, NotifyError};

const SENDER_NAME: &str = "Lockwarden";

/// Port where the server expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Default)]
pub struct EmailNotifier;

impl EmailNotifier {
    pub fn new() -> Self {
        Self
    }

    fn transport(smtp: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let builder = if smtp.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| NotifyError::Smtp(format!("SMTP relay: {e}")))?;

        Ok(builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
            .build())
    }
}

/// Subject line, e.g. `[Lockwarden] CRITICAL: Unlock failed`.
pub fn subject_line(notification: &Notification) -> String {
    format!(
        "[Lockwarden] {}: {}",
        notification.tier.as_str().to_uppercase(),
        notification.subject
    )
}

/// Build the message without sending it.
pub fn build_message(
    notification: &Notification,
    target: &NotificationTarget,
) -> Result<LettreMessage, NotifyError> {
    let to = target
        .email_to
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| NotifyError::NotConfigured("email recipient".into()))?;

    let from: Mailbox = format!("{SENDER_NAME} <{}>", target.smtp.sender())
        .parse()
        .map_err(|e| NotifyError::Config(format!("Invalid from: {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| NotifyError::Config(format!("Invalid to: {e}")))?;

    let mut body = notification.body.clone();
    if let Some(id) = &notification.action_id {
        body.push_str(&format!("\n\nAction: {id}"));
    }
    body.push_str(&format!(
        "\nSent: {}",
        notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    LettreMessage::builder()
        .from(from)
        .to(to)
        .subject(subject_line(notification))
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| NotifyError::Config(format!("Build email: {e}")))
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(
        &self,
        notification: &Notification,
        target: &NotificationTarget,
    ) -> Result<(), NotifyError> {
        if !target.smtp.is_configured() {
            return Err(NotifyError::NotConfigured("SMTP server".into()));
        }
        let email = build_message(notification, target)?;
        let mailer = Self::transport(&target.smtp)?;

        mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(format!("SMTP send: {e}")))?;

        tracing::info!(
            "📤 Email {} notification sent to {}",
            notification.tier,
            target.email_to.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwarden_core::types::EscalationTier;

    fn target() -> NotificationTarget {
        NotificationTarget {
            chat_id: "1".into(),
            email_to: Some("ops@example.com".into()),
            smtp: SmtpSettings {
                host: "smtp.example.com".into(),
                username: "bot@example.com".into(),
                password: "pw".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_subject_line() {
        let n = Notification::new(EscalationTier::Degraded, "Unlock retrying", "body");
        assert_eq!(subject_line(&n), "[Lockwarden] DEGRADED: Unlock retrying");
    }

    #[test]
    fn test_build_message() {
        let n = Notification::new(EscalationTier::Critical, "Unlock failed", "10 attempts")
            .for_action("act-123");
        let message = build_message(&n, &target()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("Lockwarden <bot@example.com>"));
        assert!(raw.contains("Action: act-123"));
    }

    #[test]
    fn test_missing_recipient() {
        let mut t = target();
        t.email_to = None;
        let n = Notification::new(EscalationTier::Info, "s", "b");
        assert!(matches!(
            build_message(&n, &t),
            Err(NotifyError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_smtp_is_not_configured() {
        let mut t = target();
        t.smtp.host.clear();
        let n = Notification::new(EscalationTier::Info, "s", "b");
        let err = EmailNotifier::new().send(&n, &t).await.unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured(_)));
    }
}
