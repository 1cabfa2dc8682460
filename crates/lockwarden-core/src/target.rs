//! Notification addressing: who receives chat and email alerts.

use serde::{Deserialize, Serialize};

/// SMTP connection and credentials for the email channel.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmtpSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; the username is used when empty.
    #[serde(default)]
    pub from: Option<String>,
}

fn default_smtp_port() -> u16 {
    465
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: None,
        }
    }
}

impl SmtpSettings {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }

    pub fn sender(&self) -> &str {
        self.from
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.username)
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from", &self.from)
            .finish()
    }
}

/// Current notification recipients. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationTarget {
    /// Telegram chat id; also the only chat allowed to drive the bot.
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default)]
    pub smtp: SmtpSettings,
}

impl NotificationTarget {
    pub fn has_chat(&self) -> bool {
        !self.chat_id.trim().is_empty()
    }

    pub fn has_email(&self) -> bool {
        self.email_to.as_deref().is_some_and(|e| !e.is_empty()) && self.smtp.is_configured()
    }

    /// Fill empty fields from the environment (`TELEGRAM_CHAT_ID`, `EMAIL_TO`,
    /// `SMTP_SERVER`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`).
    pub fn fill_from_env(&mut self) {
        if self.chat_id.is_empty()
            && let Some(v) = env_opt("TELEGRAM_CHAT_ID")
        {
            self.chat_id = v;
        }
        if self.email_to.is_none() {
            self.email_to = env_opt("EMAIL_TO");
        }
        if self.smtp.host.is_empty()
            && let Some(v) = env_opt("SMTP_SERVER")
        {
            self.smtp.host = v;
            if let Some(port) = env_opt("SMTP_PORT").and_then(|p| p.parse().ok()) {
                self.smtp.port = port;
            }
        }
        if self.smtp.username.is_empty()
            && let Some(v) = env_opt("SMTP_USER")
        {
            self.smtp.username = v;
        }
        if self.smtp.password.is_empty()
            && let Some(v) = env_opt("SMTP_PASSWORD")
        {
            self.smtp.password = v;
        }
    }

    /// Parse file contents; unreadable JSON yields an empty target plus a reason.
    pub fn from_json_str(content: &str) -> (Self, Option<String>) {
        match serde_json::from_str::<Self>(content) {
            Ok(target) => (target, None),
            Err(e) => (Self::default(), Some(format!("unreadable notification target ({e})"))),
        }
    }
}

/// Very small sanity check for operator-entered addresses.
pub fn looks_like_email(input: &str) -> bool {
    let Some((local, domain)) = input.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !input.contains(char::is_whitespace)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}
