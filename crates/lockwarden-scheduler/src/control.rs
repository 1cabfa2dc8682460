//! Control surface: the structured command API the bot and CLI drive.
//!
//! Every command returns a [`ControlReply`] or a [`ControlError`]; rendering
//! is left to the caller. Schedule and target edits are persisted first and
//! swapped into [`SharedState`] only after the write succeeded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, Utc, Weekday};
use lockwarden_core::schedule::{BreakWindow, Schedule, ScheduleError};
use lockwarden_core::target::{NotificationTarget, looks_like_email};
use lockwarden_core::traits::Notification;
use lockwarden_core::types::{EscalationTier, LockAction, LockStatus, ScheduledAction};
use serde::Serialize;

use crate::codeword::CodewordGuard;
use crate::engine::{EngineState, ExecutionReport};
use crate::evaluator;
use crate::executor::{ActionExecutor, ActiveAction};
use crate::notify::DispatchReport;
use crate::persistence::{ActionHistoryEntry, Journal};
use crate::state::SharedState;
use crate::store::ConfigStore;

/// A change to the notification target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    ChatId(String),
    Email(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Status,
    SetOpenTime { day: Weekday, time: NaiveTime },
    ClearOpenTime { day: Weekday },
    AddBreak { day: Weekday, window: BreakWindow },
    /// 1-based, as shown to the operator.
    RemoveBreak { day: Weekday, index: usize },
    SetScheduleEnabled(bool),
    SetTimezone(String),
    UnlockNow,
    LockNow,
    SetNotificationTarget { change: TargetChange, codeword: String },
    CancelRetry,
    TestNotification,
    /// Let a requester blocked by the codeword guard try again.
    Unblock { requester: String },
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Status => "status",
            ControlCommand::SetOpenTime { .. } => "set-open-time",
            ControlCommand::ClearOpenTime { .. } => "clear-open-time",
            ControlCommand::AddBreak { .. } => "add-break",
            ControlCommand::RemoveBreak { .. } => "remove-break",
            ControlCommand::SetScheduleEnabled(_) => "set-schedule-enabled",
            ControlCommand::SetTimezone(_) => "set-timezone",
            ControlCommand::UnlockNow => "unlock-now",
            ControlCommand::LockNow => "lock-now",
            ControlCommand::SetNotificationTarget { .. } => "set-notification-target",
            ControlCommand::CancelRetry => "cancel-retry",
            ControlCommand::TestNotification => "test-notification",
            ControlCommand::Unblock { .. } => "unblock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("lock is busy{}", busy_suffix(.active))]
    Busy { active: Option<ActiveAction> },

    #[error("wrong codeword, {remaining} attempt(s) left")]
    Unauthorized { remaining: u32 },

    #[error("too many wrong codewords, requester blocked")]
    Blocked,

    #[error("{0}")]
    Invalid(String),

    #[error("no action is running")]
    NothingToCancel,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("could not save: {0}")]
    Storage(String),
}

fn busy_suffix(active: &Option<ActiveAction>) -> String {
    active
        .as_ref()
        .map(|a| format!(" with {a}"))
        .unwrap_or_default()
}

impl From<ScheduleError> for ControlError {
    fn from(err: ScheduleError) -> Self {
        ControlError::Invalid(err.to_string())
    }
}

/// Result of a manual action, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSummary {
    pub action_id: String,
    pub kind: LockAction,
    pub state: EngineState,
    pub attempts: usize,
    pub last_error: Option<String>,
    pub lock_status: Option<LockStatus>,
}

impl From<&ExecutionReport> for ActionSummary {
    fn from(report: &ExecutionReport) -> Self {
        Self {
            action_id: report.action.id.clone(),
            kind: report.action.kind,
            state: report.state,
            attempts: report.attempts.len(),
            last_error: report.last_failure().map(|f| f.to_string()),
            lock_status: report.lock_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub timezone: String,
    pub timezone_warning: Option<String>,
    pub schedule_enabled: bool,
    pub schedule_version: u64,
    pub local_time: NaiveDateTime,
    pub in_break: bool,
    pub next_due: Option<NaiveDateTime>,
    pub active: Option<ActiveAction>,
    /// Exhausted actions in a row.
    pub consecutive_failures: u32,
    pub lock: Option<LockStatus>,
    pub chat_configured: bool,
    pub email_configured: bool,
    pub recent: Vec<ActionHistoryEntry>,
    #[serde(skip)]
    pub schedule: Arc<Schedule>,
}

#[derive(Debug, Clone)]
pub enum ControlReply {
    Status(Box<StatusReport>),
    ScheduleUpdated { schedule: Arc<Schedule>, version: u64 },
    ActionFinished(ActionSummary),
    TargetUpdated(Arc<NotificationTarget>),
    Cancelled(ActiveAction),
    TestNotification(DispatchReport),
    Unblocked { requester: String, was_blocked: bool },
}

pub struct ControlSurface {
    state: Arc<SharedState>,
    store: Arc<ConfigStore>,
    executor: Arc<ActionExecutor>,
    guard: CodewordGuard,
    journal: Option<Arc<Journal>>,
    /// Serializes read-modify-write edits.
    edit_lock: Mutex<()>,
    status_timeout: Duration,
}

impl ControlSurface {
    pub fn new(
        state: Arc<SharedState>,
        store: Arc<ConfigStore>,
        executor: Arc<ActionExecutor>,
        guard: CodewordGuard,
    ) -> Self {
        Self {
            state,
            store,
            executor,
            guard,
            journal: None,
            edit_lock: Mutex::new(()),
            status_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn guard(&self) -> &CodewordGuard {
        &self.guard
    }

    pub async fn handle(
        &self,
        requester: &str,
        command: ControlCommand,
    ) -> Result<ControlReply, ControlError> {
        tracing::debug!(requester, command = command.name(), "Control command");
        match command {
            ControlCommand::Status => Ok(ControlReply::Status(Box::new(self.status().await))),
            ControlCommand::SetOpenTime { day, time } => self.edit_schedule(|s| {
                s.set_open_time(day, time);
                Ok(())
            }),
            ControlCommand::ClearOpenTime { day } => self.edit_schedule(|s| {
                s.clear_open_time(day);
                Ok(())
            }),
            ControlCommand::AddBreak { day, window } => self.edit_schedule(|s| s.add_break(day, window)),
            ControlCommand::RemoveBreak { day, index } => {
                if index == 0 {
                    return Err(ControlError::Invalid("break numbers start at 1".into()));
                }
                self.edit_schedule(|s| s.remove_break(day, index - 1).map(|_| ()))
            }
            ControlCommand::SetScheduleEnabled(enabled) => self.edit_schedule(|s| {
                s.set_enabled(enabled);
                Ok(())
            }),
            ControlCommand::SetTimezone(name) => self.edit_schedule(|s| s.set_timezone(name.trim())),
            ControlCommand::UnlockNow => self.run_manual(requester, LockAction::Unlock).await,
            ControlCommand::LockNow => self.run_manual(requester, LockAction::Lock).await,
            ControlCommand::SetNotificationTarget { change, codeword } => {
                self.guard.verify(requester, &codeword)?;
                self.set_target(change)
            }
            ControlCommand::CancelRetry => self
                .executor
                .cancel_active()
                .map(ControlReply::Cancelled)
                .ok_or(ControlError::NothingToCancel),
            ControlCommand::TestNotification => {
                let notification = Notification::new(
                    EscalationTier::Info,
                    "Test notification",
                    format!("Requested by {requester}. If you can read this, the channel works."),
                );
                let report = self.executor.engine().dispatcher().notify(&notification).await;
                Ok(ControlReply::TestNotification(report))
            }
            ControlCommand::Unblock { requester: blocked } => {
                let was_blocked = self.guard.unblock(&blocked);
                if was_blocked {
                    tracing::info!(requester, "🔓 Lifted the codeword block on {blocked}");
                }
                Ok(ControlReply::Unblocked {
                    requester: blocked,
                    was_blocked,
                })
            }
        }
    }

    pub async fn status(&self) -> StatusReport {
        let (schedule, version) = self.state.schedule_with_version();
        let (local, warning) = evaluator::local_time(&schedule, Utc::now());
        let target = self.state.target();

        let lock = match tokio::time::timeout(
            self.status_timeout,
            self.executor.engine().actuator().lock_status(),
        )
        .await
        {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!("Lock status unavailable: {e}");
                None
            }
            Err(_) => None,
        };
        let recent = self
            .journal
            .as_ref()
            .and_then(|j| j.best_effort("recent actions", |db| db.recent_actions(5)))
            .unwrap_or_default();

        StatusReport {
            timezone: schedule.timezone.clone(),
            timezone_warning: warning.map(|w| w.to_string()),
            schedule_enabled: schedule.enabled,
            schedule_version: version,
            local_time: local,
            in_break: evaluator::is_in_break(&schedule, local),
            next_due: evaluator::next_due_time(&schedule, local),
            active: self.executor.active(),
            consecutive_failures: self.executor.engine().consecutive_failures(),
            lock,
            chat_configured: target.has_chat(),
            email_configured: target.has_email(),
            recent,
            schedule,
        }
    }

    /// Apply `edit` to a copy of the schedule, persist it, then swap it in.
    fn edit_schedule(
        &self,
        edit: impl FnOnce(&mut Schedule) -> Result<(), ScheduleError>,
    ) -> Result<ControlReply, ControlError> {
        let _edit = self.edit_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut schedule = (*self.state.schedule()).clone();
        edit(&mut schedule)?;
        self.store
            .save_schedule(&schedule)
            .map_err(|e| ControlError::Storage(e.to_string()))?;
        let version = self.state.replace_schedule(schedule);
        tracing::info!("📅 Schedule updated (version {version})");
        Ok(ControlReply::ScheduleUpdated {
            schedule: self.state.schedule(),
            version,
        })
    }

    fn set_target(&self, change: TargetChange) -> Result<ControlReply, ControlError> {
        let _edit = self.edit_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut target = (*self.state.target()).clone();
        match change {
            TargetChange::ChatId(chat_id) => {
                let chat_id = chat_id.trim();
                if chat_id.is_empty() {
                    return Err(ControlError::Invalid("chat id cannot be empty".into()));
                }
                target.chat_id = chat_id.to_string();
            }
            TargetChange::Email(email) => {
                let email = email.trim();
                if !looks_like_email(email) {
                    return Err(ControlError::Invalid(format!("'{email}' is not an email address")));
                }
                target.email_to = Some(email.to_string());
            }
        }
        self.store
            .save_target(&target)
            .map_err(|e| ControlError::Storage(e.to_string()))?;
        self.state.replace_target(target);
        tracing::info!("📬 Notification target updated");
        Ok(ControlReply::TargetUpdated(self.state.target()))
    }

    async fn run_manual(&self, requester: &str, kind: LockAction) -> Result<ControlReply, ControlError> {
        let schedule = self.state.schedule();
        let (local, _) = evaluator::local_time(&schedule, Utc::now());
        let action = ScheduledAction::manual(kind, requester, local);
        let report = self.executor.run_manual(action).await?;
        Ok(ControlReply::ActionFinished(ActionSummary::from(&report)))
    }
}
