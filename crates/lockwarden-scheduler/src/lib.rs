//! # Lockwarden Scheduler
//!
//! The schedule-driven retry and escalation engine.
//!
//! ## Architecture
//! ```text
//! SchedulerLoop (tokio interval, reloads schedule.json on change)
//!   ├── ScheduleEvaluator: is the open time due this minute? inside a break?
//!   └── on due slot → ActionExecutor (one action at a time, cancellable)
//!                       └── RetryEscalationEngine
//!                             ├── Actuator.attempt × up to max_attempts (backoff between)
//!                             └── NotificationDispatcher (degraded @5, critical @exhaustion)
//!                                   ├── chat  (Telegram)
//!                                   └── email (SMTP)
//!
//! ControlSurface (bot / CLI)
//!   ├── status, schedule edits (atomic write + swap)
//!   ├── unlock-now / lock-now (busy when an action runs), cancel-retry
//!   └── set-notification-target (CodewordGuard)
//! ```

pub mod codeword;
pub mod control;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod notify;
pub mod persistence;
pub mod retry;
pub mod runner;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use codeword::CodewordGuard;
pub use control::{
    ActionSummary, ControlCommand, ControlError, ControlReply, ControlSurface, StatusReport,
    TargetChange,
};
pub use engine::{CancelHandle, CancelSignal, EngineState, ExecutionReport, RetryEscalationEngine};
pub use evaluator::ScheduleEvaluator;
pub use executor::{ActionExecutor, ActiveAction};
pub use notify::{DispatchReport, NotificationDispatcher};
pub use persistence::{ActionHistoryEntry, Journal, SchedulerDb};
pub use retry::RetryPolicy;
pub use runner::SchedulerLoop;
pub use state::SharedState;
pub use store::ConfigStore;
