//! Shared schedule and notification target.
//!
//! Readers get an `Arc` snapshot; writers swap the whole value. A dispatch
//! that already holds a snapshot keeps a consistent view while an operator
//! edit lands.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use lockwarden_core::schedule::Schedule;
use lockwarden_core::target::NotificationTarget;

pub struct SharedState {
    schedule: RwLock<Arc<Schedule>>,
    target: RwLock<Arc<NotificationTarget>>,
    schedule_version: AtomicU64,
}

impl SharedState {
    pub fn new(schedule: Schedule, target: NotificationTarget) -> Self {
        Self {
            schedule: RwLock::new(Arc::new(schedule)),
            target: RwLock::new(Arc::new(target)),
            schedule_version: AtomicU64::new(1),
        }
    }

    pub fn schedule(&self) -> Arc<Schedule> {
        self.schedule
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Schedule snapshot together with its version.
    pub fn schedule_with_version(&self) -> (Arc<Schedule>, u64) {
        let guard = self.schedule.read().unwrap_or_else(|e| e.into_inner());
        (guard.clone(), self.schedule_version.load(Ordering::Acquire))
    }

    pub fn schedule_version(&self) -> u64 {
        self.schedule_version.load(Ordering::Acquire)
    }

    /// Swap in a new schedule and return its version.
    pub fn replace_schedule(&self, schedule: Schedule) -> u64 {
        let mut guard = self.schedule.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(schedule);
        self.schedule_version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn target(&self) -> Arc<NotificationTarget> {
        self.target.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn replace_target(&self, target: NotificationTarget) {
        let mut guard = self.target.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(target);
    }
}
