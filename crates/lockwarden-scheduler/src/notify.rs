//! Notification dispatch: chat and email, attempted independently.
//!
//! Both channels run concurrently, each bounded by its own timeout. A channel
//! failure is logged and reported, never raised to the caller.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use lockwarden_core::target::NotificationTarget;
use lockwarden_core::traits::{Notification, Notifier, NotifyError};
use lockwarden_core::types::{
    AttemptRecord, EscalationTier, FailureCategory, LockStatus, ScheduledAction,
};

use crate::persistence::Journal;
use crate::state::SharedState;

/// Per-channel result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub tier: EscalationTier,
    pub chat: Result<(), NotifyError>,
    pub email: Result<(), NotifyError>,
}

impl DispatchReport {
    pub fn any_delivered(&self) -> bool {
        self.chat.is_ok() || self.email.is_ok()
    }
}

pub struct NotificationDispatcher {
    chat: Arc<dyn Notifier>,
    email: Arc<dyn Notifier>,
    state: Arc<SharedState>,
    channel_timeout: Duration,
    journal: Option<Arc<Journal>>,
}

impl NotificationDispatcher {
    pub fn new(
        chat: Arc<dyn Notifier>,
        email: Arc<dyn Notifier>,
        state: Arc<SharedState>,
        channel_timeout: Duration,
    ) -> Self {
        Self {
            chat,
            email,
            state,
            channel_timeout,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn channel_timeout(&self) -> Duration {
        self.channel_timeout
    }

    /// Send through both channels to the target current at call time.
    pub async fn notify(&self, notification: &Notification) -> DispatchReport {
        let target = self.state.target();
        let (chat, email) = tokio::join!(
            self.deliver(self.chat.as_ref(), notification, &target),
            self.deliver(self.email.as_ref(), notification, &target),
        );
        DispatchReport {
            tier: notification.tier,
            chat,
            email,
        }
    }

    async fn deliver(
        &self,
        channel: &dyn Notifier,
        notification: &Notification,
        target: &NotificationTarget,
    ) -> Result<(), NotifyError> {
        let name = channel.channel_name().to_string();
        let result = match tokio::time::timeout(
            self.channel_timeout,
            channel.send(notification, target),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.channel_timeout.as_secs())),
        };

        let status = match &result {
            Ok(()) => {
                tracing::info!(channel = %name, tier = %notification.tier, "📣 Notification delivered");
                "sent"
            }
            Err(NotifyError::NotConfigured(what)) => {
                tracing::debug!(channel = %name, "Notification skipped, {what} not configured");
                "skipped"
            }
            Err(e) => {
                tracing::warn!(channel = %name, tier = %notification.tier, "⚠️ Notification failed: {e}");
                "failed"
            }
        };

        if let Some(journal) = &self.journal {
            let error = result.as_ref().err().map(|e| e.to_string());
            journal.best_effort("notification log", |db| {
                db.record_notification(
                    notification.action_id.as_deref(),
                    notification.tier.as_str(),
                    &name,
                    status,
                    error.as_deref(),
                )
            });
        }
        result
    }
}

// ─── Message builders ─────────────────────────────────────────

fn action_title(action: &ScheduledAction) -> String {
    let kind = match action.kind {
        lockwarden_core::LockAction::Unlock => "Unlock",
        lockwarden_core::LockAction::Lock => "Lock",
    };
    format!("{kind} ({})", action.origin.label())
}

/// Distinct categories in first-seen order.
pub fn observed_categories(attempts: &[AttemptRecord]) -> Vec<FailureCategory> {
    let mut seen = BTreeSet::new();
    attempts
        .iter()
        .filter_map(|a| a.failure().map(|f| f.category()))
        .filter(|c| seen.insert(*c))
        .collect()
}

fn last_failure_line(attempts: &[AttemptRecord]) -> String {
    attempts
        .iter()
        .rev()
        .find_map(|a| a.failure())
        .map(|f| format!("Last error: {f}"))
        .unwrap_or_default()
}

/// "N failed attempts, still retrying".
pub fn degraded_notification(action: &ScheduledAction, attempts: &[AttemptRecord]) -> Notification {
    let failed = attempts.iter().filter(|a| !a.is_success()).count();
    let body = format!(
        "{failed} failed attempts, still retrying.\nSlot: {}\n{}",
        action.slot_key(),
        last_failure_line(attempts)
    );
    Notification::new(
        EscalationTier::Degraded,
        format!("{} is struggling", action_title(action)),
        body,
    )
    .for_action(&action.id)
}

/// Total attempts, failure categories and the lock state if it could be read.
pub fn critical_notification(
    action: &ScheduledAction,
    attempts: &[AttemptRecord],
    lock_status: Option<&LockStatus>,
) -> Notification {
    let categories = observed_categories(attempts)
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let lock_line = match lock_status {
        Some(status) => format!("Lock status: {}", status.describe()),
        None => "Lock status: unavailable".to_string(),
    };
    let body = format!(
        "Gave up after {} attempts.\nFailure categories: {categories}\n{}\n{lock_line}\nSlot: {}\nManual intervention required.",
        attempts.len(),
        last_failure_line(attempts),
        action.slot_key(),
    );
    Notification::new(
        EscalationTier::Critical,
        format!("{} failed", action_title(action)),
        body,
    )
    .for_action(&action.id)
}

pub fn success_notification(action: &ScheduledAction, attempts: usize) -> Notification {
    Notification::new(
        EscalationTier::Info,
        format!("{} done", action_title(action)),
        format!(
            "Lock {} at slot {} after {attempts} attempt(s).",
            action.kind.done_verb(),
            action.slot_key()
        ),
    )
    .for_action(&action.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNotifier;
    use chrono::{NaiveDate, Utc, Weekday};
    use lockwarden_core::schedule::Schedule;
    use lockwarden_core::types::{AttemptOutcome, FailureReason};

    fn state(chat_id: &str) -> Arc<SharedState> {
        Arc::new(SharedState::new(
            Schedule::default(),
            NotificationTarget {
                chat_id: chat_id.into(),
                ..Default::default()
            },
        ))
    }

    fn action() -> ScheduledAction {
        let due = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        ScheduledAction::scheduled(Weekday::Mon, due, 1)
    }

    fn failed(ordinal: u32, reason: FailureReason) -> AttemptRecord {
        AttemptRecord {
            ordinal,
            at: Utc::now(),
            outcome: AttemptOutcome::Failure(reason),
            latency: Duration::from_millis(120),
        }
    }

    #[tokio::test]
    async fn test_email_failure_does_not_block_chat() {
        let chat = Arc::new(MockNotifier::new("telegram", false));
        let email = Arc::new(MockNotifier::new("email", true));
        let dispatcher =
            NotificationDispatcher::new(chat.clone(), email.clone(), state("42"), Duration::from_secs(5));

        let report = dispatcher
            .notify(&Notification::new(EscalationTier::Critical, "s", "b"))
            .await;
        assert!(report.chat.is_ok());
        assert!(matches!(report.email, Err(NotifyError::Smtp(_))));
        assert_eq!(chat.sent.lock().unwrap().len(), 1);
        assert_eq!(email.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_failure_does_not_block_email() {
        let chat = Arc::new(MockNotifier::new("telegram", true));
        let email = Arc::new(MockNotifier::new("email", false));
        let dispatcher =
            NotificationDispatcher::new(chat.clone(), email.clone(), state("42"), Duration::from_secs(5));

        let report = dispatcher
            .notify(&Notification::new(EscalationTier::Critical, "s", "b"))
            .await;
        assert!(report.chat.is_err());
        assert!(report.email.is_ok());
        assert!(report.any_delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_channel_times_out() {
        let chat = Arc::new(MockNotifier::new("telegram", false));
        let dispatcher = NotificationDispatcher::new(
            chat.clone(),
            Arc::new(MockNotifier::hanging("email")),
            state("42"),
            Duration::from_secs(15),
        );

        let report = dispatcher
            .notify(&Notification::new(EscalationTier::Degraded, "s", "b"))
            .await;
        assert!(report.chat.is_ok());
        assert_eq!(report.email, Err(NotifyError::Timeout(15)));
    }

    #[tokio::test]
    async fn test_target_is_read_at_dispatch_time() {
        let chat = Arc::new(MockNotifier::new("telegram", false));
        let email = Arc::new(MockNotifier::new("email", false));
        let shared = state("old");
        let dispatcher =
            NotificationDispatcher::new(chat.clone(), email, shared.clone(), Duration::from_secs(5));

        shared.replace_target(NotificationTarget {
            chat_id: "new".into(),
            ..Default::default()
        });
        dispatcher
            .notify(&Notification::new(EscalationTier::Info, "s", "b"))
            .await;
        assert_eq!(chat.sent.lock().unwrap()[0].1, "new");
    }

    #[tokio::test]
    async fn test_deliveries_are_journaled() {
        let journal = Arc::new(Journal::new(
            crate::persistence::SchedulerDb::open_in_memory().unwrap(),
        ));
        let dispatcher = NotificationDispatcher::new(
            Arc::new(MockNotifier::new("telegram", false)),
            Arc::new(MockNotifier::new("email", true)),
            state("42"),
            Duration::from_secs(5),
        )
        .with_journal(journal.clone());

        dispatcher
            .notify(&Notification::new(EscalationTier::Critical, "s", "b"))
            .await;
        let count = journal
            .with(|db| db.notification_count("critical"))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_degraded_text() {
        let attempts: Vec<_> = (1..=5).map(|n| failed(n, FailureReason::Timeout)).collect();
        let n = degraded_notification(&action(), &attempts);
        assert_eq!(n.tier, EscalationTier::Degraded);
        assert!(n.body.starts_with("5 failed attempts, still retrying"));
        assert!(n.action_id.is_some());
    }

    #[test]
    fn test_critical_text() {
        let mut attempts: Vec<_> = (1..=9).map(|n| failed(n, FailureReason::Timeout)).collect();
        attempts.push(failed(
            10,
            FailureReason::RemoteRejected {
                code: -3037,
                message: "gateway busy".into(),
            },
        ));
        let status = LockStatus {
            locked: Some(true),
            battery_pct: Some(12),
        };
        let n = critical_notification(&action(), &attempts, Some(&status));
        assert_eq!(n.tier, EscalationTier::Critical);
        assert!(n.body.contains("Gave up after 10 attempts"));
        assert!(n.body.contains("Failure categories: Timeout, RemoteRejected"));
        assert!(n.body.contains("Lock status: locked, battery 12%"));

        let n = critical_notification(&action(), &attempts, None);
        assert!(n.body.contains("Lock status: unavailable"));
    }

    #[test]
    fn test_observed_categories_keep_first_seen_order() {
        let attempts = vec![
            failed(1, FailureReason::Network("reset".into())),
            failed(2, FailureReason::Auth("expired".into())),
            failed(3, FailureReason::Network("reset".into())),
        ];
        assert_eq!(
            observed_categories(&attempts),
            vec![FailureCategory::NetworkError, FailureCategory::AuthError]
        );
    }
}
