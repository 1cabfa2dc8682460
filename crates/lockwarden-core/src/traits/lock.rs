//! Lock-control capability and the single-attempt actuator seam.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::types::{FailureReason, LockAction, LockStatus};

/// Cloud access token with its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// True when the token stays valid for at least `margin` after `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A lock visible to the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub lock_id: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub battery_pct: Option<u8>,
}

/// Errors reported by a lock-control backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockApiError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("transport failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("remote error {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<LockApiError> for FailureReason {
    fn from(err: LockApiError) -> Self {
        match err {
            LockApiError::Auth(msg) => FailureReason::Auth(msg),
            LockApiError::Network(msg) => FailureReason::Network(msg),
            LockApiError::Timeout => FailureReason::Timeout,
            LockApiError::Rejected { code, message } => {
                FailureReason::RemoteRejected { code, message }
            }
            LockApiError::Malformed(msg) => FailureReason::Unknown(msg),
        }
    }
}

/// The remote lock-control API (TTLock cloud or a test double).
#[async_trait]
pub trait LockApi: Send + Sync {
    /// Exchange the configured account credentials for a token.
    async fn authenticate(&self) -> Result<AccessToken, LockApiError>;

    async fn list_locks(&self, token: &AccessToken) -> Result<Vec<LockInfo>, LockApiError>;

    async fn unlock(&self, token: &AccessToken, lock_id: &str) -> Result<(), LockApiError>;

    async fn lock(&self, token: &AccessToken, lock_id: &str) -> Result<(), LockApiError>;

    async fn status(&self, token: &AccessToken, lock_id: &str) -> Result<LockStatus, LockApiError>;
}

/// One attempt against the physical lock, with every error already classified.
/// Implementations never retry; that is the engine's job.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn attempt(&self, action: LockAction) -> Result<(), FailureReason>;

    /// Best-effort state query used in status and critical reports.
    async fn lock_status(&self) -> Result<LockStatus, FailureReason>;
}
