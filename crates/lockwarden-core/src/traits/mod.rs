//! Capability seams between the engine and the outside world.

pub mod lock;
pub mod notifier;

pub use lock::{AccessToken, Actuator, LockApi, LockApiError, LockInfo};
pub use notifier::{Notification, Notifier, NotifyError};
