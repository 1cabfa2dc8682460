//! Retry & escalation engine: runs one action to a terminal state.
//!
//! `Idle → Attempting(n) → Success | Exhausted | Cancelled`
//!
//! Each action gets a fresh attempt budget. A failed attempt at the
//! degraded threshold notifies both channels once; running out of attempts
//! notifies both channels once more at critical tier. Backoff sleeps yield to
//! the runtime and can be interrupted by a [`CancelHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use lockwarden_core::traits::Actuator;
use lockwarden_core::types::{
    AttemptOutcome, AttemptRecord, EscalationTier, FailureCategory, FailureReason, LockStatus,
    ScheduledAction,
};
use serde::Serialize;
use tokio::sync::watch;

use crate::notify::{self, DispatchReport, NotificationDispatcher};
use crate::retry::RetryPolicy;

/// Engine state for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Attempting(u32),
    Success,
    Exhausted,
    Cancelled,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Attempting(_) => "attempting",
            EngineState::Success => "success",
            EngineState::Exhausted => "exhausted",
            EngineState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Attempting(n) => write!(f, "attempting #{n}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Sender half of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Receiver half, checked between attempts and raced against backoff sleeps.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), CancelSignal(rx))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything that happened while running one action.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub action: ScheduledAction,
    pub state: EngineState,
    /// Ordered by attempt ordinal.
    pub attempts: Vec<AttemptRecord>,
    /// Notifications fired for this action, in order.
    pub escalations: Vec<DispatchReport>,
    /// Lock state read for the critical notification.
    pub lock_status: Option<LockStatus>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.state == EngineState::Success
    }

    pub fn last_failure(&self) -> Option<&FailureReason> {
        self.attempts.iter().rev().find_map(|a| a.failure())
    }

    /// Distinct failure categories in first-seen order.
    pub fn failure_categories(&self) -> Vec<FailureCategory> {
        notify::observed_categories(&self.attempts)
    }

    pub fn tiers(&self) -> Vec<EscalationTier> {
        self.escalations.iter().map(|d| d.tier).collect()
    }
}

pub struct RetryEscalationEngine {
    actuator: Arc<dyn Actuator>,
    dispatcher: Arc<NotificationDispatcher>,
    /// Actions in a row that ended `Exhausted`; reset by any success.
    consecutive_failures: AtomicU32,
    notify_on_success: bool,
}

impl RetryEscalationEngine {
    pub fn new(actuator: Arc<dyn Actuator>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            actuator,
            dispatcher,
            consecutive_failures: AtomicU32::new(0),
            notify_on_success: false,
        }
    }

    /// Send an Info notification after successful scheduled actions.
    pub fn with_success_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_success = enabled;
        self
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn actuator(&self) -> &Arc<dyn Actuator> {
        &self.actuator
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub async fn execute(
        &self,
        action: ScheduledAction,
        policy: &RetryPolicy,
        cancel: CancelSignal,
    ) -> ExecutionReport {
        self.execute_with_progress(action, policy, cancel, &|_| {}).await
    }

    /// Like [`execute`](Self::execute), reporting each state change to `progress`.
    pub async fn execute_with_progress(
        &self,
        action: ScheduledAction,
        policy: &RetryPolicy,
        mut cancel: CancelSignal,
        progress: &(dyn Fn(EngineState) + Send + Sync),
    ) -> ExecutionReport {
        let mut run = Run::new(action);
        tracing::info!(
            action_id = %run.action.id,
            "🔐 {} {} started (slot {}, up to {} attempts)",
            run.action.origin.label(),
            run.action.kind,
            run.action.slot_key(),
            policy.max_attempts
        );

        for n in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                return self.finish(run, EngineState::Cancelled, progress);
            }
            progress(EngineState::Attempting(n));

            let started = tokio::time::Instant::now();
            let at = Utc::now();
            let result = self.actuator.attempt(run.action.kind).await;
            let latency = started.elapsed();

            match result {
                Ok(()) => {
                    run.attempts.push(AttemptRecord {
                        ordinal: n,
                        at,
                        outcome: AttemptOutcome::Success,
                        latency,
                    });
                    self.consecutive_failures.store(0, Ordering::Release);
                    if self.notify_on_success && !run.action.origin.is_manual() {
                        let notification = notify::success_notification(&run.action, run.attempts.len());
                        run.escalations.push(self.dispatcher.notify(&notification).await);
                    }
                    return self.finish(run, EngineState::Success, progress);
                }
                Err(reason) => {
                    tracing::warn!(
                        action_id = %run.action.id,
                        attempt = n,
                        category = %reason.category(),
                        "Attempt {n}/{} failed: {reason}",
                        policy.max_attempts
                    );
                    run.attempts.push(AttemptRecord {
                        ordinal: n,
                        at,
                        outcome: AttemptOutcome::Failure(reason),
                        latency,
                    });
                    // A cancel that landed mid-attempt wins over any escalation.
                    if cancel.is_cancelled() {
                        return self.finish(run, EngineState::Cancelled, progress);
                    }

                    if policy.is_degraded_threshold(n) {
                        let notification = notify::degraded_notification(&run.action, &run.attempts);
                        run.escalations.push(self.dispatcher.notify(&notification).await);
                    }

                    if n < policy.max_attempts {
                        let delay = policy.delay_after(n);
                        tracing::debug!(action_id = %run.action.id, "Backing off {delay:?}");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => {
                                return self.finish(run, EngineState::Cancelled, progress);
                            }
                        }
                    }
                }
            }
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::error!(
            action_id = %run.action.id,
            "🚨 {} exhausted after {} attempts ({failures} exhausted action(s) in a row)",
            run.action.kind,
            run.attempts.len()
        );

        run.lock_status = self.read_lock_status().await;
        let notification =
            notify::critical_notification(&run.action, &run.attempts, run.lock_status.as_ref());
        run.escalations.push(self.dispatcher.notify(&notification).await);
        self.finish(run, EngineState::Exhausted, progress)
    }

    /// Best-effort status for the critical message, bounded like a channel.
    async fn read_lock_status(&self) -> Option<LockStatus> {
        match tokio::time::timeout(self.dispatcher.channel_timeout(), self.actuator.lock_status()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!("Lock status unavailable: {e}");
                None
            }
            Err(_) => {
                tracing::debug!("Lock status query timed out");
                None
            }
        }
    }

    fn finish(
        &self,
        run: Run,
        state: EngineState,
        progress: &(dyn Fn(EngineState) + Send + Sync),
    ) -> ExecutionReport {
        progress(state);
        match state {
            EngineState::Success => tracing::info!(
                action_id = %run.action.id,
                "✅ Lock {} after {} attempt(s)",
                run.action.kind.done_verb(),
                run.attempts.len()
            ),
            EngineState::Cancelled => tracing::info!(
                action_id = %run.action.id,
                "🛑 {} cancelled after {} attempt(s)",
                run.action.kind,
                run.attempts.len()
            ),
            _ => {}
        }
        ExecutionReport {
            action: run.action,
            state,
            attempts: run.attempts,
            escalations: run.escalations,
            lock_status: run.lock_status,
            started_at: run.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Working state of one execution.
struct Run {
    action: ScheduledAction,
    attempts: Vec<AttemptRecord>,
    escalations: Vec<DispatchReport>,
    lock_status: Option<LockStatus>,
    started_at: DateTime<Utc>,
}

impl Run {
    fn new(action: ScheduledAction) -> Self {
        Self {
            action,
            attempts: Vec::new(),
            escalations: Vec::new(),
            lock_status: None,
            started_at: Utc::now(),
        }
    }
}
