//! SQLite-backed action journal.
//! Keeps aggregate history only: one row per finished action, one row per
//! channel delivery, the last dispatched schedule slot, and blocked chats.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lockwarden_core::error::{LockwardenError, Result};
use serde::Serialize;

use crate::engine::ExecutionReport;

const KV_LAST_SLOT: &str = "last_dispatched_slot";

/// SQLite-backed persistence store for scheduler data.
pub struct SchedulerDb {
    conn: rusqlite::Connection,
}

/// One row of `action_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionHistoryEntry {
    pub action_id: String,
    pub kind: String,
    pub origin: String,
    pub slot: String,
    pub outcome: String,
    pub attempts: u32,
    /// Comma-separated failure categories, empty on a clean success.
    pub failure_categories: String,
    pub finished_at: DateTime<Utc>,
}

fn storage_err(context: &str) -> impl FnOnce(rusqlite::Error) -> LockwardenError + '_ {
    move |e| LockwardenError::Storage(format!("{context}: {e}"))
}

impl SchedulerDb {
    /// Open or create the journal database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(storage_err("DB open"))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(storage_err("DB open"))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            -- Finished actions (scheduled and manual)
            CREATE TABLE IF NOT EXISTS action_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_id TEXT NOT NULL,
                kind TEXT NOT NULL,              -- 'unlock', 'lock'
                origin TEXT NOT NULL,            -- 'scheduled', 'manual'
                requested_by TEXT,
                slot TEXT NOT NULL,              -- local minute, e.g. 2026-10-19T09:00
                outcome TEXT NOT NULL,           -- 'success', 'exhausted', 'cancelled'
                attempts INTEGER NOT NULL,
                failure_categories TEXT NOT NULL DEFAULT '',
                finished_at TEXT NOT NULL
            );

            -- Notification deliveries, one row per channel
            CREATE TABLE IF NOT EXISTS notification_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_id TEXT,
                tier TEXT NOT NULL,              -- 'info', 'degraded', 'critical'
                channel TEXT NOT NULL,           -- 'telegram', 'email'
                status TEXT NOT NULL,            -- 'sent', 'failed', 'skipped'
                error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Requesters locked out by the codeword guard
            CREATE TABLE IF NOT EXISTS blocked_chats (
                requester TEXT PRIMARY KEY,
                blocked_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_action_history_finished
                ON action_history(finished_at);
         ",
            )
            .map_err(storage_err("Migration"))?;
        Ok(())
    }

    // ─── Action history ───────────────────────────────────────

    pub fn record_action(&self, report: &ExecutionReport) -> Result<()> {
        let requested_by = match &report.action.origin {
            lockwarden_core::ActionOrigin::Manual { requested_by } => Some(requested_by.as_str()),
            lockwarden_core::ActionOrigin::Scheduled => None,
        };
        let categories = report
            .failure_categories()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");

        self.conn
            .execute(
                "INSERT INTO action_history
                 (action_id, kind, origin, requested_by, slot, outcome, attempts, failure_categories, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    report.action.id,
                    report.action.kind.as_str(),
                    report.action.origin.label(),
                    requested_by,
                    report.action.slot_key(),
                    report.state.as_str(),
                    report.attempts.len() as u32,
                    categories,
                    report.finished_at.to_rfc3339(),
                ],
            )
            .map_err(storage_err("Save action"))?;
        Ok(())
    }

    /// Most recent actions first.
    pub fn recent_actions(&self, limit: usize) -> Result<Vec<ActionHistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT action_id, kind, origin, slot, outcome, attempts, failure_categories, finished_at
                 FROM action_history ORDER BY id DESC LIMIT ?1",
            )
            .map_err(storage_err("Load actions"))?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                let finished_at: String = row.get(7)?;
                Ok(ActionHistoryEntry {
                    action_id: row.get(0)?,
                    kind: row.get(1)?,
                    origin: row.get(2)?,
                    slot: row.get(3)?,
                    outcome: row.get(4)?,
                    attempts: row.get(5)?,
                    failure_categories: row.get(6)?,
                    finished_at: DateTime::parse_from_rfc3339(&finished_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(storage_err("Load actions"))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err("Load actions"))
    }

    // ─── Notifications ────────────────────────────────────────

    pub fn record_notification(
        &self,
        action_id: Option<&str>,
        tier: &str,
        channel: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO notification_log (action_id, tier, channel, status, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![action_id, tier, channel, status, error, Utc::now().to_rfc3339()],
            )
            .map_err(storage_err("Save notification"))?;
        Ok(())
    }

    pub fn notification_count(&self, tier: &str) -> Result<u32> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM notification_log WHERE tier = ?1",
                [tier],
                |row| row.get(0),
            )
            .map_err(storage_err("Count notifications"))
    }

    // ─── Key/value ────────────────────────────────────────────

    pub fn get_kv(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(storage_err("Read kv"))?;
        let mut rows = stmt.query([key]).map_err(storage_err("Read kv"))?;
        match rows.next().map_err(storage_err("Read kv"))? {
            Some(row) => Ok(Some(row.get(0).map_err(storage_err("Read kv"))?)),
            None => Ok(None),
        }
    }

    pub fn set_kv(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                [key, value],
            )
            .map_err(storage_err("Write kv"))?;
        Ok(())
    }

    pub fn last_slot(&self) -> Result<Option<String>> {
        self.get_kv(KV_LAST_SLOT)
    }

    pub fn set_last_slot(&self, slot: &str) -> Result<()> {
        self.set_kv(KV_LAST_SLOT, slot)
    }

    // ─── Blocked requesters ───────────────────────────────────

    pub fn block(&self, requester: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO blocked_chats (requester, blocked_at) VALUES (?1, ?2)",
                rusqlite::params![requester, Utc::now().to_rfc3339()],
            )
            .map_err(storage_err("Block requester"))?;
        Ok(())
    }

    pub fn unblock(&self, requester: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM blocked_chats WHERE requester = ?1", [requester])
            .map_err(storage_err("Unblock requester"))?;
        Ok(n > 0)
    }

    pub fn blocked(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT requester FROM blocked_chats ORDER BY blocked_at")
            .map_err(storage_err("Load blocked"))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(storage_err("Load blocked"))?;
        rows.collect::<std::result::Result<Vec<String>, _>>()
            .map_err(storage_err("Load blocked"))
    }
}

/// Thread-safe journal handle. Writes are best effort: a failing journal is
/// logged and never interrupts an action.
pub struct Journal {
    db: Mutex<SchedulerDb>,
}

impl Journal {
    pub fn new(db: SchedulerDb) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Run `f` against the database.
    pub fn with<T>(&self, f: impl FnOnce(&SchedulerDb) -> Result<T>) -> Result<T> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        f(&db)
    }

    /// Like [`with`](Self::with), logging instead of returning the error.
    pub fn best_effort<T>(&self, what: &str, f: impl FnOnce(&SchedulerDb) -> Result<T>) -> Option<T> {
        match self.with(f) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("⚠️ Journal {what} failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_and_last_slot() {
        let db = SchedulerDb::open_in_memory().unwrap();
        assert_eq!(db.last_slot().unwrap(), None);
        db.set_last_slot("2026-10-19T09:00").unwrap();
        db.set_last_slot("2026-10-20T09:00").unwrap();
        assert_eq!(db.last_slot().unwrap().as_deref(), Some("2026-10-20T09:00"));
    }

    #[test]
    fn test_blocked_requesters() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.block("chat:42").unwrap();
        db.block("chat:42").unwrap();
        assert_eq!(db.blocked().unwrap(), vec!["chat:42".to_string()]);
        assert!(db.unblock("chat:42").unwrap());
        assert!(!db.unblock("chat:42").unwrap());
    }

    #[test]
    fn test_notification_log() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.record_notification(Some("act-1"), "critical", "telegram", "sent", None)
            .unwrap();
        db.record_notification(Some("act-1"), "critical", "email", "failed", Some("auth"))
            .unwrap();
        assert_eq!(db.notification_count("critical").unwrap(), 2);
        assert_eq!(db.notification_count("degraded").unwrap(), 0);
    }

    #[test]
    fn test_open_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.db");
        {
            let db = SchedulerDb::open(&path).unwrap();
            db.set_last_slot("2026-10-19T09:00").unwrap();
        }
        let db = SchedulerDb::open(&path).unwrap();
        assert_eq!(db.last_slot().unwrap().as_deref(), Some("2026-10-19T09:00"));
    }
}
