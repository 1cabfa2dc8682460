//! # Lockwarden Core
//!
//! Shared vocabulary for the lockwarden workspace:
//! - `config`: application settings (TOML + environment overrides)
//! - `schedule`: the weekly open-time/break schedule and its tolerant loader
//! - `target`: where notifications are delivered
//! - `types`: actions, attempts, failure taxonomy, escalation tiers
//! - `traits`: the capability seams (`LockApi`, `Actuator`, `Notifier`)

pub mod config;
pub mod error;
pub mod schedule;
pub mod target;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{LockwardenError, Result};
pub use schedule::{BreakWindow, ConfigWarning, DaySchedule, Schedule};
pub use target::{NotificationTarget, SmtpSettings};
pub use types::{
    ActionOrigin, AttemptRecord, EscalationTier, FailureCategory, FailureReason, LockAction,
    LockStatus, ScheduledAction,
};
