//! Wiring: builds the object graph from an [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use lockwarden_channels::{EmailNotifier, TelegramApi, TelegramNotifier};
use lockwarden_core::AppConfig;
use lockwarden_core::traits::Notification;
use lockwarden_core::types::EscalationTier;
use lockwarden_scheduler::evaluator;
use lockwarden_scheduler::{
    ActionExecutor, CodewordGuard, ConfigStore, ControlSurface, Journal, NotificationDispatcher,
    RetryEscalationEngine, RetryPolicy, SchedulerDb, SchedulerLoop, SharedState,
};
use lockwarden_ttlock::{LockActuator, TtlockClient};

pub struct Runtime {
    pub config: AppConfig,
    pub state: Arc<SharedState>,
    pub store: Arc<ConfigStore>,
    pub journal: Option<Arc<Journal>>,
    pub lock_api: Arc<TtlockClient>,
    pub telegram: TelegramApi,
    pub executor: Arc<ActionExecutor>,
    pub surface: Arc<ControlSurface>,
}

impl Runtime {
    pub fn build(config: AppConfig) -> Result<Self> {
        let store = Arc::new(ConfigStore::new(
            config.storage.schedule_path(),
            config.storage.target_path(),
        ));
        let (schedule, warnings) = store.load_schedule();
        for warning in &warnings {
            tracing::warn!("⚠️ schedule.json {warning}");
        }
        let (target, warnings) = store.load_target();
        for warning in &warnings {
            tracing::warn!("⚠️ {warning}");
        }
        let state = Arc::new(SharedState::new(schedule, target));

        let db_path = config.storage.db_path();
        let journal = match SchedulerDb::open(&db_path) {
            Ok(db) => Some(Arc::new(Journal::new(db))),
            Err(e) => {
                tracing::warn!("⚠️ Journal unavailable at {} ({e}), continuing without it", db_path.display());
                None
            }
        };

        let lock_api = Arc::new(
            TtlockClient::from_config(&config.ttlock).context("Failed to create TTLock client")?,
        );
        let actuator = Arc::new(LockActuator::new(lock_api.clone(), config.ttlock.lock_id.clone()));

        let telegram = TelegramApi::new(config.telegram.bot_token.clone());
        let mut dispatcher = NotificationDispatcher::new(
            Arc::new(TelegramNotifier::new(telegram.clone())),
            Arc::new(EmailNotifier::new()),
            state.clone(),
            Duration::from_secs(config.notify.channel_timeout_secs),
        );
        if let Some(journal) = &journal {
            dispatcher = dispatcher.with_journal(journal.clone());
        }

        let engine = Arc::new(
            RetryEscalationEngine::new(actuator, Arc::new(dispatcher))
                .with_success_notifications(config.scheduler.notify_on_success),
        );
        let mut executor = ActionExecutor::new(
            engine,
            RetryPolicy::scheduled(&config.retry),
            RetryPolicy::manual(&config.retry),
        );
        let mut guard = CodewordGuard::new(config.telegram.codeword.clone());
        if let Some(journal) = &journal {
            executor = executor.with_journal(journal.clone());
            guard = guard.with_journal(journal.clone());
        }
        let executor = Arc::new(executor);

        let mut surface = ControlSurface::new(state.clone(), store.clone(), executor.clone(), guard)
            .with_status_timeout(Duration::from_secs(config.ttlock.request_timeout_secs));
        if let Some(journal) = &journal {
            surface = surface.with_journal(journal.clone());
        }

        Ok(Self {
            config,
            state,
            store,
            journal,
            lock_api,
            telegram,
            executor,
            surface: Arc::new(surface),
        })
    }

    pub fn scheduler(&self) -> SchedulerLoop {
        let runner = SchedulerLoop::new(
            self.state.clone(),
            self.store.clone(),
            self.executor.clone(),
            Duration::from_secs(self.config.scheduler.check_interval_secs),
        );
        match &self.journal {
            Some(journal) => runner.with_journal(journal.clone()),
            None => runner,
        }
    }

    /// Info notification that the service is up, with the lock and next slot.
    pub async fn announce_startup(&self) {
        let schedule = self.state.schedule();
        let (local, _) = evaluator::local_time(&schedule, Utc::now());
        let next = match evaluator::next_due_time(&schedule, local) {
            Some(next) => next.format("%a %Y-%m-%d %H:%M").to_string(),
            None => "none scheduled".to_string(),
        };
        let lock = self
            .config
            .ttlock
            .lock_id
            .clone()
            .unwrap_or_else(|| "first lock on the account".to_string());
        let body = format!(
            "Lock: {lock}\nSchedule: {} ({})\nNext unlock: {next}",
            if schedule.enabled { "enabled" } else { "disabled" },
            schedule.timezone
        );
        let notification = Notification::new(EscalationTier::Info, "Lockwarden started", body);
        self.executor.engine().dispatcher().notify(&notification).await;
    }
}
