//! Domain types: actions, attempts, failure taxonomy.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// What to do with the physical lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    Unlock,
    Lock,
}

impl LockAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockAction::Unlock => "unlock",
            LockAction::Lock => "lock",
        }
    }

    /// Past participle for user-facing messages ("Lock 123 unlocked").
    pub fn done_verb(&self) -> &'static str {
        match self {
            LockAction::Unlock => "unlocked",
            LockAction::Lock => "locked",
        }
    }
}

impl std::fmt::Display for LockAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOrigin {
    /// Derived from the weekly schedule.
    Scheduled,
    /// Requested through the control surface.
    Manual { requested_by: String },
}

impl ActionOrigin {
    pub fn is_manual(&self) -> bool {
        matches!(self, ActionOrigin::Manual { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionOrigin::Scheduled => "scheduled",
            ActionOrigin::Manual { .. } => "manual",
        }
    }
}

/// The unit of work handed to the retry engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAction {
    pub id: String,
    pub kind: LockAction,
    pub origin: ActionOrigin,
    /// Weekday the action was due for (local time).
    pub weekday: Weekday,
    /// Local minute the action was due for.
    pub due_at: NaiveDateTime,
    /// Version of the schedule that produced this action (0 for manual).
    pub schedule_version: u64,
}

impl ScheduledAction {
    /// An unlock derived from the schedule slot `due_at`.
    pub fn scheduled(weekday: Weekday, due_at: NaiveDateTime, schedule_version: u64) -> Self {
        Self {
            id: new_action_id(),
            kind: LockAction::Unlock,
            origin: ActionOrigin::Scheduled,
            weekday,
            due_at,
            schedule_version,
        }
    }

    /// A bot/CLI triggered action.
    pub fn manual(kind: LockAction, requested_by: &str, now_local: NaiveDateTime) -> Self {
        use chrono::Datelike;
        Self {
            id: new_action_id(),
            kind,
            origin: ActionOrigin::Manual {
                requested_by: requested_by.to_string(),
            },
            weekday: now_local.weekday(),
            due_at: now_local,
            schedule_version: 0,
        }
    }

    /// Minute-resolution key of the slot, e.g. `2026-10-19T09:00`.
    pub fn slot_key(&self) -> String {
        self.due_at.format("%Y-%m-%dT%H:%M").to_string()
    }
}

fn new_action_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("act-{}", &id[..12])
}

/// Coarse failure categories, used for counting and notification text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureCategory {
    AuthError,
    NetworkError,
    RemoteRejected,
    Timeout,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::AuthError => "AuthError",
            FailureCategory::NetworkError => "NetworkError",
            FailureCategory::RemoteRejected => "RemoteRejected",
            FailureCategory::Timeout => "Timeout",
            FailureCategory::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single actuator attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("lock rejected the command (code {code}): {message}")]
    RemoteRejected { code: i64, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl FailureReason {
    pub fn category(&self) -> FailureCategory {
        match self {
            FailureReason::Auth(_) => FailureCategory::AuthError,
            FailureReason::Network(_) => FailureCategory::NetworkError,
            FailureReason::RemoteRejected { .. } => FailureCategory::RemoteRejected,
            FailureReason::Timeout => FailureCategory::Timeout,
            FailureReason::Unknown(_) => FailureCategory::Unknown,
        }
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(FailureReason),
}

/// One actuator attempt inside a retry sequence. Dropped with the sequence.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub ordinal: u32,
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            AttemptOutcome::Failure(reason) => Some(reason),
            AttemptOutcome::Success => None,
        }
    }
}

/// Notification tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Info,
    Degraded,
    Critical,
}

impl EscalationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTier::Info => "info",
            EscalationTier::Degraded => "degraded",
            EscalationTier::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            EscalationTier::Info => "ℹ️",
            EscalationTier::Degraded => "⚠️",
            EscalationTier::Critical => "🚨",
        }
    }
}

impl std::fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed lock state. Each half is optional because the cloud may not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: Option<bool>,
    pub battery_pct: Option<u8>,
}

impl LockStatus {
    pub fn describe(&self) -> String {
        let state = match self.locked {
            Some(true) => "locked",
            Some(false) => "unlocked",
            None => "unknown",
        };
        match self.battery_pct {
            Some(pct) => format!("{state}, battery {pct}%"),
            None => format!("{state}, battery unknown"),
        }
    }
}
