//! Test doubles shared by the scheduler unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use lockwarden_core::schedule::Schedule;
use lockwarden_core::target::NotificationTarget;
use lockwarden_core::traits::{Actuator, Notification, Notifier, NotifyError};
use lockwarden_core::types::{EscalationTier, FailureReason, LockAction, LockStatus, ScheduledAction};

use crate::notify::NotificationDispatcher;
use crate::state::SharedState;

/// Records every notification; optionally fails or never completes.
pub struct MockNotifier {
    name: &'static str,
    fail: bool,
    hang: bool,
    /// Tier and chat id of each send.
    pub sent: Mutex<Vec<(EscalationTier, String)>>,
    bodies: Mutex<Vec<String>>,
}

impl MockNotifier {
    pub fn new(name: &'static str, fail: bool) -> Self {
        Self {
            name,
            fail,
            hang: false,
            sent: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn hanging(name: &'static str) -> Self {
        Self {
            hang: true,
            ..Self::new(name, false)
        }
    }

    pub fn tiers(&self) -> Vec<EscalationTier> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> Option<String> {
        self.bodies.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(
        &self,
        notification: &Notification,
        target: &NotificationTarget,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((notification.tier, target.chat_id.clone()));
        self.bodies.lock().unwrap().push(notification.body.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(NotifyError::Smtp("535 authentication failed".into()));
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        self.name
    }
}

/// Scripted actuator. Pops outcomes from the script, then repeats the default.
pub struct MockActuator {
    script: Mutex<VecDeque<Result<(), FailureReason>>>,
    default: Mutex<Result<(), FailureReason>>,
    status: Option<LockStatus>,
    latency: Duration,
    calls: AtomicU32,
    actions: Mutex<Vec<LockAction>>,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl MockActuator {
    pub fn always(outcome: Result<(), FailureReason>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(outcome),
            status: None,
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            actions: Mutex::new(Vec::new()),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }

    pub fn failing_then_ok(failures: usize, reason: FailureReason) -> Self {
        let actuator = Self::always(Ok(()));
        actuator
            .script
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(Err(reason), failures));
        actuator
    }

    pub fn with_status(mut self, status: LockStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Each attempt takes `latency` of (tokio) time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_default(&self, outcome: Result<(), FailureReason>) {
        *self.default.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> Vec<LockAction> {
        self.actions.lock().unwrap().clone()
    }

    /// Highest number of attempts observed running at once.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn attempt(&self, action: LockAction) -> Result<(), FailureReason> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.actions.lock().unwrap().push(action);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let outcome = match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => self.default.lock().unwrap().clone(),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn lock_status(&self) -> Result<LockStatus, FailureReason> {
        self.status
            .ok_or_else(|| FailureReason::Unknown("status not scripted".into()))
    }
}

/// Dispatcher over the two mocks, addressed to chat `42`.
pub fn dispatcher(chat: Arc<MockNotifier>, email: Arc<MockNotifier>) -> Arc<NotificationDispatcher> {
    let state = Arc::new(SharedState::new(
        Schedule::default(),
        NotificationTarget {
            chat_id: "42".into(),
            ..Default::default()
        },
    ));
    Arc::new(NotificationDispatcher::new(
        chat,
        email,
        state,
        Duration::from_secs(15),
    ))
}

/// Monday 2026-10-19 09:00 unlock.
pub fn scheduled_action() -> ScheduledAction {
    let due = NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    ScheduledAction::scheduled(Weekday::Mon, due, 1)
}
