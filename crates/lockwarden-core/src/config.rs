//! Lockwarden configuration system.
//!
//! `~/.lockwarden/config.toml` holds service settings; every field has a
//! default so an empty file is valid. Credentials can come from the
//! environment instead (see [`AppConfig::apply_env`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LockwardenError, Result};
use crate::schedule::ConfigWarning;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ttlock: TtlockConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load config from the default path (~/.lockwarden/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LockwardenError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| LockwardenError::Toml(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LockwardenError::Toml(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the lockwarden home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lockwarden")
    }

    /// Override credentials and paths from environment variables. Empty
    /// variables are ignored.
    pub fn apply_env(&mut self) {
        let t = &mut self.ttlock;
        override_string(&mut t.client_id, "TTLOCK_CLIENT_ID");
        override_string(&mut t.client_secret, "TTLOCK_CLIENT_SECRET");
        override_string(&mut t.username, "TTLOCK_USERNAME");
        override_string(&mut t.password, "TTLOCK_PASSWORD");
        if let Some(id) = env_opt("TTLOCK_LOCK_ID") {
            t.lock_id = Some(id);
        }
        override_string(&mut self.telegram.bot_token, "TELEGRAM_BOT_TOKEN");
        override_string(&mut self.telegram.codeword, "TELEGRAM_CODEWORD");
        override_string(&mut self.storage.data_dir, "LOCKWARDEN_DATA_DIR");
    }

    /// Clamp inconsistent values and report what was changed.
    pub fn normalize(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let r = &mut self.retry;
        if r.max_attempts == 0 {
            warnings.push(ConfigWarning::new("retry.max_attempts", "must be at least 1, using 1"));
            r.max_attempts = 1;
        }
        if r.manual_max_attempts == 0 {
            warnings.push(ConfigWarning::new(
                "retry.manual_max_attempts",
                "must be at least 1, using 1",
            ));
            r.manual_max_attempts = 1;
        }
        if r.backoff_factor < 1.0 || !r.backoff_factor.is_finite() {
            warnings.push(ConfigWarning::new(
                "retry.backoff_factor",
                format!("{} would shrink delays, using 1.0", r.backoff_factor),
            ));
            r.backoff_factor = 1.0;
        }
        if r.max_delay_secs < r.base_delay_secs {
            warnings.push(ConfigWarning::new(
                "retry.max_delay_secs",
                format!("below base delay, using {}", r.base_delay_secs),
            ));
            r.max_delay_secs = r.base_delay_secs;
        }
        if self.scheduler.check_interval_secs == 0 || self.scheduler.check_interval_secs > 60 {
            warnings.push(ConfigWarning::new(
                "scheduler.check_interval_secs",
                "must be within 1..=60 to see every minute, using 30",
            ));
            self.scheduler.check_interval_secs = default_check_interval();
        }
        if self.ttlock.client_id.is_empty() || self.ttlock.username.is_empty() {
            warnings.push(ConfigWarning::new(
                "ttlock",
                "client_id/username not set, lock actions will fail with AuthError",
            ));
        }
        warnings
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn override_string(field: &mut String, key: &str) {
    if let Some(v) = env_opt(key) {
        *field = v;
    }
}

/// TTLock cloud account.
#[derive(Clone, Serialize, Deserialize)]
pub struct TtlockConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    /// Plain password; hashed before it leaves the process.
    #[serde(default)]
    pub password: String,
    /// Fixed lock; the first listed lock is used when absent.
    #[serde(default)]
    pub lock_id: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String { "https://euapi.ttlock.com".into() }
fn default_request_timeout() -> u64 { 15 }

impl Default for TtlockConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            lock_id: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for TtlockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlockConfig")
            .field("api_base", &self.api_base)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("lock_id", &self.lock_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Telegram bot settings (the chat id lives in the notification target).
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Shared secret required to change the notification target.
    #[serde(default = "default_codeword")]
    pub codeword: String,
    #[serde(default = "bool_true")]
    pub bot_enabled: bool,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn bool_true() -> bool { true }
fn default_codeword() -> String { "secretword".into() }
fn default_poll_timeout() -> u64 { 30 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            codeword: default_codeword(),
            bot_enabled: true,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_enabled", &self.bot_enabled)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Retry and escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Failed attempt number that triggers the degraded notification.
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Attempt budget for bot/CLI requests.
    #[serde(default = "default_manual_max_attempts")]
    pub manual_max_attempts: u32,
}

fn default_max_attempts() -> u32 { 10 }
fn default_degraded_after() -> u32 { 5 }
fn default_base_delay() -> u64 { 5 }
fn default_backoff_factor() -> f64 { 2.0 }
fn default_max_delay() -> u64 { 300 }
fn default_manual_max_attempts() -> u32 { 3 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            degraded_after: default_degraded_after(),
            base_delay_secs: default_base_delay(),
            backoff_factor: default_backoff_factor(),
            max_delay_secs: default_max_delay(),
            manual_max_attempts: default_manual_max_attempts(),
        }
    }
}

/// Scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Send an Info notification after each successful scheduled action.
    #[serde(default)]
    pub notify_on_success: bool,
    #[serde(default = "bool_true")]
    pub announce_startup: bool,
}

fn default_check_interval() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            notify_on_success: false,
            announce_startup: true,
        }
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Upper bound for one channel delivery.
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
}

fn default_channel_timeout() -> u64 { 15 }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel_timeout_secs: default_channel_timeout(),
        }
    }
}

/// Where data files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_schedule_file")]
    pub schedule_file: String,
    #[serde(default = "default_target_file")]
    pub target_file: String,
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

fn default_data_dir() -> String { "~/.lockwarden".into() }
fn default_schedule_file() -> String { "schedule.json".into() }
fn default_target_file() -> String { "notify_target.json".into() }
fn default_db_file() -> String { "lockwarden.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            schedule_file: default_schedule_file(),
            target_file: default_target_file(),
            db_file: default_db_file(),
        }
    }
}

impl StorageConfig {
    /// Data directory with a leading `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None if self.data_dir == "~" => {
                dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
            }
            None => PathBuf::from(&self.data_dir),
        }
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.data_dir().join(&self.schedule_file)
    }

    pub fn target_path(&self) -> PathBuf {
        self.data_dir().join(&self.target_file)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(&self.db_file)
    }
}
