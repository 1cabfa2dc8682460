//! Serializes actions on the physical lock.
//!
//! Scheduled actions queue on the gate. Manual actions are refused with
//! [`ControlError::Busy`] while anything holds it. The running action can be
//! cancelled from the control surface.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lockwarden_core::types::{ActionOrigin, LockAction, ScheduledAction};
use serde::Serialize;

use crate::control::ControlError;
use crate::engine::{CancelHandle, CancelSignal, EngineState, ExecutionReport, RetryEscalationEngine};
use crate::persistence::Journal;
use crate::retry::RetryPolicy;

/// Snapshot of the action currently holding the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveAction {
    pub action_id: String,
    pub kind: LockAction,
    pub origin: ActionOrigin,
    pub started_at: DateTime<Utc>,
    /// Attempt in progress, 0 before the first one starts.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl std::fmt::Display for ActiveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (attempt {}/{})",
            self.origin.label(),
            self.kind,
            self.attempt,
            self.max_attempts
        )
    }
}

struct ActiveSlot {
    info: ActiveAction,
    attempt: Arc<AtomicU32>,
    cancel: CancelHandle,
}

/// Clears the active slot even if the running future is dropped.
struct ActiveGuard<'a>(&'a Mutex<Option<ActiveSlot>>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

pub struct ActionExecutor {
    engine: Arc<RetryEscalationEngine>,
    gate: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveSlot>>,
    scheduled_policy: RetryPolicy,
    manual_policy: RetryPolicy,
    journal: Option<Arc<Journal>>,
}

impl ActionExecutor {
    pub fn new(
        engine: Arc<RetryEscalationEngine>,
        scheduled_policy: RetryPolicy,
        manual_policy: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            gate: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            scheduled_policy,
            manual_policy,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn engine(&self) -> &Arc<RetryEscalationEngine> {
        &self.engine
    }

    /// Run a schedule-derived action, waiting for any running action first.
    pub async fn run_scheduled(&self, action: ScheduledAction) -> ExecutionReport {
        if self.is_busy() {
            tracing::info!(action_id = %action.id, "⏳ Lock busy, scheduled action queued");
        }
        let _gate = self.gate.lock().await;
        self.run_locked(action, &self.scheduled_policy).await
    }

    /// Run a manual action now, or refuse if another action holds the lock.
    pub async fn run_manual(&self, action: ScheduledAction) -> Result<ExecutionReport, ControlError> {
        let Ok(_gate) = self.gate.try_lock() else {
            let active = self.active();
            tracing::info!(action_id = %action.id, "🚫 Manual {} refused, lock busy", action.kind);
            return Err(ControlError::Busy { active });
        };
        Ok(self.run_locked(action, &self.manual_policy).await)
    }

    async fn run_locked(&self, action: ScheduledAction, policy: &RetryPolicy) -> ExecutionReport {
        let (handle, signal) = CancelSignal::pair();
        let attempt = Arc::new(AtomicU32::new(0));
        {
            let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(ActiveSlot {
                info: ActiveAction {
                    action_id: action.id.clone(),
                    kind: action.kind,
                    origin: action.origin.clone(),
                    started_at: Utc::now(),
                    attempt: 0,
                    max_attempts: policy.max_attempts,
                },
                attempt: attempt.clone(),
                cancel: handle,
            });
        }
        let _guard = ActiveGuard(&self.active);

        let progress = move |state: EngineState| {
            if let EngineState::Attempting(n) = state {
                attempt.store(n, Ordering::Release);
            }
        };
        let report = self
            .engine
            .execute_with_progress(action, policy, signal, &progress)
            .await;

        if let Some(journal) = &self.journal {
            journal.best_effort("action history", |db| db.record_action(&report));
        }
        report
    }

    /// The action holding the lock, if any.
    pub fn active(&self) -> Option<ActiveAction> {
        let slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|s| ActiveAction {
            attempt: s.attempt.load(Ordering::Acquire),
            ..s.info.clone()
        })
    }

    pub fn is_busy(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Request cancellation of the running action. Returns what was cancelled.
    pub fn cancel_active(&self) -> Option<ActiveAction> {
        let slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slot.as_ref()?;
        slot.cancel.cancel();
        tracing::info!(action_id = %slot.info.action_id, "🛑 Cancellation requested");
        Some(ActiveAction {
            attempt: slot.attempt.load(Ordering::Acquire),
            ..slot.info.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SchedulerDb;
    use crate::testing::{MockActuator, MockNotifier, dispatcher, scheduled_action};
    use lockwarden_core::types::FailureReason;
    use std::time::Duration;

    fn executor(actuator: Arc<MockActuator>) -> Arc<ActionExecutor> {
        let dispatcher = dispatcher(
            Arc::new(MockNotifier::new("telegram", false)),
            Arc::new(MockNotifier::new("email", false)),
        );
        let engine = Arc::new(RetryEscalationEngine::new(actuator, dispatcher));
        Arc::new(ActionExecutor::new(
            engine,
            RetryPolicy::default(),
            RetryPolicy::manual(&Default::default()),
        ))
    }

    fn manual(kind: LockAction) -> ScheduledAction {
        ScheduledAction::manual(kind, "chat:42", scheduled_action().due_at)
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_rejected_while_scheduled_runs() {
        let actuator = Arc::new(MockActuator::always(Err(FailureReason::Timeout)));
        let executor = executor(actuator.clone());

        let scheduled = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run_scheduled(scheduled_action()).await }
        });
        tokio::time::sleep(Duration::from_secs(7)).await;

        let err = executor.run_manual(manual(LockAction::Unlock)).await.unwrap_err();
        let ControlError::Busy { active: Some(active) } = err else {
            panic!("expected busy with active action, got {err:?}");
        };
        assert_eq!(active.origin, ActionOrigin::Scheduled);
        assert_eq!(active.attempt, 2);

        let report = scheduled.await.unwrap();
        assert_eq!(report.attempts.len(), 10);
        // The refused manual request never reached the actuator.
        assert_eq!(actuator.calls(), 10);
        assert!(!executor.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_queues_behind_manual() {
        let actuator = Arc::new(
            MockActuator::always(Ok(())).with_latency(Duration::from_secs(3)),
        );
        let executor = executor(actuator.clone());

        let manual_task = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run_manual(manual(LockAction::Lock)).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(executor.is_busy());

        let report = executor.run_scheduled(scheduled_action()).await;
        assert!(report.succeeded());
        assert!(manual_task.await.unwrap().unwrap().succeeded());

        assert_eq!(actuator.actions(), vec![LockAction::Lock, LockAction::Unlock]);
        assert_eq!(actuator.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_never_interleave() {
        let actuator = Arc::new(
            MockActuator::failing_then_ok(4, FailureReason::Timeout)
                .with_latency(Duration::from_secs(2)),
        );
        let executor = executor(actuator.clone());

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let executor = executor.clone();
                tokio::spawn(async move { executor.run_scheduled(scheduled_action()).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().succeeded());
        }
        assert_eq!(actuator.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_active_stops_sequence() {
        let actuator = Arc::new(MockActuator::always(Err(FailureReason::Timeout)));
        let executor = executor(actuator);
        assert!(executor.cancel_active().is_none());

        let task = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run_scheduled(scheduled_action()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let cancelled = executor.cancel_active().unwrap();
        assert_eq!(cancelled.kind, LockAction::Unlock);
        let report = task.await.unwrap();
        assert_eq!(report.state, EngineState::Cancelled);
        assert!(executor.active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_actions_are_journaled() {
        let actuator = Arc::new(MockActuator::failing_then_ok(1, FailureReason::Timeout));
        let journal = Arc::new(Journal::new(SchedulerDb::open_in_memory().unwrap()));
        let dispatcher = dispatcher(
            Arc::new(MockNotifier::new("telegram", false)),
            Arc::new(MockNotifier::new("email", false)),
        );
        let executor = ActionExecutor::new(
            Arc::new(RetryEscalationEngine::new(actuator, dispatcher)),
            RetryPolicy::default(),
            RetryPolicy::default(),
        )
        .with_journal(journal.clone());

        executor.run_scheduled(scheduled_action()).await;
        let history = journal.with(|db| db.recent_actions(5)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, "success");
        assert_eq!(history[0].attempts, 2);
        assert_eq!(history[0].failure_categories, "Timeout");
        assert_eq!(history[0].slot, "2026-10-19T09:00");
    }
}
