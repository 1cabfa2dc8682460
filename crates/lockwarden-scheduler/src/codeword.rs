//! Shared-secret check for notification target changes.
//!
//! Wrong codewords are counted per requester. At the limit the requester is
//! blocked, persisted in the journal, and refused without evaluating the proof.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use subtle::ConstantTimeEq;

use crate::control::ControlError;
use crate::persistence::Journal;

/// Wrong codewords allowed before a requester is blocked.
pub const MAX_CODEWORD_FAILURES: u32 = 5;

#[derive(Default)]
struct GuardState {
    failures: HashMap<String, u32>,
    blocked: HashSet<String>,
}

pub struct CodewordGuard {
    codeword: String,
    max_failures: u32,
    state: Mutex<GuardState>,
    journal: Option<Arc<Journal>>,
}

impl CodewordGuard {
    pub fn new(codeword: impl Into<String>) -> Self {
        Self {
            codeword: codeword.into(),
            max_failures: MAX_CODEWORD_FAILURES,
            state: Mutex::new(GuardState::default()),
            journal: None,
        }
    }

    /// Persist blocks in `journal` and restore the ones already there.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        let restored = journal.best_effort("blocked list", |db| db.blocked()).unwrap_or_default();
        if !restored.is_empty() {
            tracing::info!("🔒 {} requester(s) still blocked", restored.len());
        }
        self.state.get_mut().unwrap_or_else(|e| e.into_inner()).blocked = restored.into_iter().collect();
        self.journal = Some(journal);
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.codeword.is_empty()
    }

    pub fn is_blocked(&self, requester: &str) -> bool {
        self.lock().blocked.contains(requester)
    }

    /// Check `proof` for `requester`.
    pub fn verify(&self, requester: &str, proof: &str) -> Result<(), ControlError> {
        if !self.is_configured() {
            return Err(ControlError::Unavailable("no codeword configured".into()));
        }
        let mut state = self.lock();
        if state.blocked.contains(requester) {
            return Err(ControlError::Blocked);
        }

        if bool::from(proof.trim().as_bytes().ct_eq(self.codeword.as_bytes())) {
            state.failures.remove(requester);
            return Ok(());
        }

        let failures = state.failures.entry(requester.to_string()).or_insert(0);
        *failures += 1;
        let failures = *failures;
        tracing::warn!(requester, failures, "🔑 Wrong codeword");

        if failures >= self.max_failures {
            state.failures.remove(requester);
            state.blocked.insert(requester.to_string());
            drop(state);
            tracing::warn!(requester, "⛔ Requester blocked after {failures} wrong codewords");
            if let Some(journal) = &self.journal {
                journal.best_effort("block requester", |db| db.block(requester));
            }
            return Err(ControlError::Blocked);
        }
        Err(ControlError::Unauthorized {
            remaining: self.max_failures - failures,
        })
    }

    /// Lift a block. Returns whether the requester was blocked.
    pub fn unblock(&self, requester: &str) -> bool {
        let removed = self.lock().blocked.remove(requester);
        if let Some(journal) = &self.journal {
            journal.best_effort("unblock requester", |db| db.unblock(requester));
        }
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
