//! Scheduler loop: ticks on a tokio interval and hands due slots to the executor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lockwarden_core::types::ScheduledAction;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::CancelSignal;
use crate::evaluator::{self, ScheduleEvaluator};
use crate::executor::ActionExecutor;
use crate::persistence::Journal;
use crate::state::SharedState;
use crate::store::ConfigStore;

pub struct SchedulerLoop {
    state: Arc<SharedState>,
    store: Arc<ConfigStore>,
    executor: Arc<ActionExecutor>,
    evaluator: ScheduleEvaluator,
    journal: Option<Arc<Journal>>,
    check_interval: Duration,
    /// Timezone name already reported as invalid.
    warned_timezone: Option<String>,
}

impl SchedulerLoop {
    pub fn new(
        state: Arc<SharedState>,
        store: Arc<ConfigStore>,
        executor: Arc<ActionExecutor>,
        check_interval: Duration,
    ) -> Self {
        Self {
            state,
            store,
            executor,
            evaluator: ScheduleEvaluator::new(),
            journal: None,
            check_interval,
            warned_timezone: None,
        }
    }

    /// Record dispatched slots in `journal`, resuming from the last one.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        let last = journal.best_effort("last slot", |db| db.last_slot()).flatten();
        if let Some(slot) = &last {
            tracing::debug!("Last dispatched slot: {slot}");
        }
        self.evaluator = ScheduleEvaluator::with_last_slot(last.as_deref());
        self.journal = Some(journal);
        self
    }

    /// One evaluation pass. Returns the action that became due, if any.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<ScheduledAction> {
        if let Some((schedule, warnings)) = self.store.reload_schedule_if_changed() {
            for warning in &warnings {
                tracing::warn!("⚠️ schedule.json {warning}");
            }
            let version = self.state.replace_schedule(schedule);
            tracing::info!("📅 Schedule reloaded from disk (version {version})");
        }

        let (schedule, version) = self.state.schedule_with_version();
        let (local, warning) = evaluator::local_time(&schedule, now);
        match warning {
            Some(warning) if self.warned_timezone.as_deref() != Some(schedule.timezone.as_str()) => {
                tracing::warn!("⚠️ {warning}");
                self.warned_timezone = Some(schedule.timezone.clone());
            }
            Some(_) => {}
            None => self.warned_timezone = None,
        }

        let action = self.evaluator.poll(&schedule, local, version)?;
        tracing::info!(action_id = %action.id, "⏰ Slot {} is due", action.slot_key());
        if let Some(journal) = &self.journal {
            let slot = action.slot_key();
            journal.best_effort("last slot", |db| db.set_last_slot(&slot));
        }
        Some(action)
    }

    /// Tick until `shutdown` fires. Each due action runs on its own task so a
    /// long retry sequence never delays the next evaluation.
    pub async fn run(mut self, mut shutdown: CancelSignal) {
        tracing::info!(
            "⏰ Scheduler started (check every {}s)",
            self.check_interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            if let Some(action) = self.tick(Utc::now()) {
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    executor.run_scheduled(action).await;
                });
            }
        }
        tracing::info!("⏰ Scheduler stopped");
    }

    pub fn spawn(self, shutdown: CancelSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RetryEscalationEngine;
    use crate::persistence::SchedulerDb;
    use crate::retry::RetryPolicy;
    use crate::testing::{MockActuator, MockNotifier, dispatcher};
    use lockwarden_core::schedule::Schedule;
    use lockwarden_core::target::NotificationTarget;
    use lockwarden_core::types::FailureReason;

    struct Fixture {
        runner: SchedulerLoop,
        state: Arc<SharedState>,
        store: Arc<ConfigStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture(actuator: MockActuator) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConfigStore::new(
            dir.path().join("schedule.json"),
            dir.path().join("notify_target.json"),
        ));
        let (schedule, _) = store.load_schedule();
        let state = Arc::new(SharedState::new(schedule, NotificationTarget::default()));
        let actuator = Arc::new(actuator);
        let dispatcher = dispatcher(
            Arc::new(MockNotifier::new("telegram", false)),
            Arc::new(MockNotifier::new("email", false)),
        );
        let engine = Arc::new(RetryEscalationEngine::new(actuator, dispatcher));
        let executor = Arc::new(ActionExecutor::new(
            engine,
            RetryPolicy::default(),
            RetryPolicy::default(),
        ));
        let runner = SchedulerLoop::new(
            state.clone(),
            store.clone(),
            executor,
            Duration::from_secs(30),
        );
        Fixture {
            runner,
            state,
            store,
            _dir: dir,
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_tick_dispatches_due_slot_once() {
        let mut f = fixture(MockActuator::always(Ok(())));
        // 09:00 Monday in Novosibirsk.
        assert!(f.runner.tick(utc("2026-10-19T01:59:40Z")).is_none());
        let action = f.runner.tick(utc("2026-10-19T02:00:05Z")).unwrap();
        assert_eq!(action.slot_key(), "2026-10-19T09:00");
        assert!(f.runner.tick(utc("2026-10-19T02:00:35Z")).is_none());
        assert!(f.runner.tick(utc("2026-10-19T02:01:05Z")).is_none());
    }

    #[test]
    fn test_tick_picks_up_external_schedule_edit() {
        let mut f = fixture(MockActuator::always(Ok(())));
        let version = f.state.schedule_version();

        std::fs::write(
            f.store.schedule_path(),
            r#"{"timezone": "UTC", "open_times": {"mon": "07:30"}}"#,
        )
        .unwrap();
        let action = f.runner.tick(utc("2026-10-19T07:30:10Z")).unwrap();
        assert_eq!(f.state.schedule().timezone, "UTC");
        assert!(f.state.schedule_version() > version);
        assert_eq!(action.schedule_version, f.state.schedule_version());
    }

    #[test]
    fn test_disabled_schedule_never_dispatches() {
        let mut f = fixture(MockActuator::always(Ok(())));
        let mut schedule = Schedule::default();
        schedule.set_enabled(false);
        f.state.replace_schedule(schedule);
        assert!(f.runner.tick(utc("2026-10-19T02:00:05Z")).is_none());
    }

    #[test]
    fn test_last_slot_survives_restart() {
        let journal = Arc::new(Journal::new(SchedulerDb::open_in_memory().unwrap()));
        let mut f = fixture(MockActuator::always(Ok(())));
        f.runner = f.runner.with_journal(journal.clone());
        assert!(f.runner.tick(utc("2026-10-19T02:00:05Z")).is_some());
        assert_eq!(
            journal.with(|db| db.last_slot()).unwrap().as_deref(),
            Some("2026-10-19T09:00")
        );

        let mut restarted = fixture(MockActuator::always(Ok(()))).runner.with_journal(journal);
        assert!(restarted.tick(utc("2026-10-19T02:00:45Z")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_until_shutdown() {
        let f = fixture(MockActuator::always(Err(FailureReason::Network("down".into()))));
        let (handle, signal) = CancelSignal::pair();
        let task = f.runner.spawn(signal);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!task.is_finished());
        handle.cancel();
        task.await.unwrap();
    }
}
