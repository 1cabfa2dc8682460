//! Single-attempt actuator over a [`LockApi`].
//!
//! Holds the access token between attempts and refreshes it when it is
//! close to expiry. An `AuthError` drops the cached token so the next attempt
//! starts with a fresh login.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lockwarden_core::traits::{AccessToken, Actuator, LockApi, LockApiError};
use lockwarden_core::types::{FailureReason, LockAction, LockStatus};
use tokio::sync::RwLock;

/// Refresh tokens this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

pub struct LockActuator {
    api: Arc<dyn LockApi>,
    configured_lock_id: Option<String>,
    token: RwLock<Option<AccessToken>>,
    discovered_lock_id: RwLock<Option<String>>,
}

impl LockActuator {
    pub fn new(api: Arc<dyn LockApi>, lock_id: Option<String>) -> Self {
        Self {
            api,
            configured_lock_id: lock_id.filter(|id| !id.trim().is_empty()),
            token: RwLock::new(None),
            discovered_lock_id: RwLock::new(None),
        }
    }

    /// Cached token, or a new one when missing or about to expire.
    async fn token(&self) -> Result<AccessToken, LockApiError> {
        let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if let Some(token) = self.token.read().await.as_ref()
            && token.is_fresh(Utc::now(), margin)
        {
            return Ok(token.clone());
        }

        let mut slot = self.token.write().await;
        // Another attempt may have refreshed it while we waited.
        if let Some(token) = slot.as_ref()
            && token.is_fresh(Utc::now(), margin)
        {
            return Ok(token.clone());
        }
        let token = self.api.authenticate().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token; the next call re-authenticates.
    pub async fn invalidate_token(&self) {
        if self.token.write().await.take().is_some() {
            tracing::info!("🔑 TTLock token invalidated");
        }
    }

    /// Configured lock id, else the first lock the account can see.
    pub async fn lock_id(&self, token: &AccessToken) -> Result<String, LockApiError> {
        if let Some(id) = &self.configured_lock_id {
            return Ok(id.clone());
        }
        if let Some(id) = self.discovered_lock_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let locks = self.api.list_locks(token).await?;
        let first = locks.into_iter().next().ok_or_else(|| LockApiError::Rejected {
            code: 0,
            message: "no locks visible to this account".into(),
        })?;
        tracing::info!(
            "🔒 Using lock {} ({})",
            first.lock_id,
            first.alias.as_deref().or(first.name.as_deref()).unwrap_or("unnamed")
        );
        *self.discovered_lock_id.write().await = Some(first.lock_id.clone());
        Ok(first.lock_id)
    }

    async fn run_once(&self, action: LockAction) -> Result<(), LockApiError> {
        let token = self.token().await?;
        let lock_id = self.lock_id(&token).await?;
        match action {
            LockAction::Unlock => self.api.unlock(&token, &lock_id).await,
            LockAction::Lock => self.api.lock(&token, &lock_id).await,
        }
    }

    async fn on_error(&self, err: LockApiError) -> FailureReason {
        if matches!(err, LockApiError::Auth(_)) {
            self.invalidate_token().await;
        }
        err.into()
    }
}

#[async_trait]
impl Actuator for LockActuator {
    async fn attempt(&self, action: LockAction) -> Result<(), FailureReason> {
        match self.run_once(action).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.on_error(err).await),
        }
    }

    async fn lock_status(&self) -> Result<LockStatus, FailureReason> {
        let result = async {
            let token = self.token().await?;
            let lock_id = self.lock_id(&token).await?;
            self.api.status(&token, &lock_id).await
        }
        .await;
        match result {
            Ok(status) => Ok(status),
            Err(err) => Err(self.on_error(err).await),
        }
    }
}
