//! File-based config store for `schedule.json` and `notify_target.json`.
//! Writes go to a temp file in the same directory and are renamed into
//! place, so readers never see a partial file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use lockwarden_core::error::{LockwardenError, Result};
use lockwarden_core::schedule::{ConfigWarning, Schedule};
use lockwarden_core::target::NotificationTarget;

pub struct ConfigStore {
    schedule_path: PathBuf,
    target_path: PathBuf,
    /// Modification time of the schedule file as last loaded or written.
    schedule_mtime: Mutex<Option<SystemTime>>,
}

impl ConfigStore {
    pub fn new(schedule_path: PathBuf, target_path: PathBuf) -> Self {
        Self {
            schedule_path,
            target_path,
            schedule_mtime: Mutex::new(None),
        }
    }

    pub fn schedule_path(&self) -> &Path {
        &self.schedule_path
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Load the schedule. A missing file yields the defaults; an unreadable
    /// one yields the defaults plus a warning.
    pub fn load_schedule(&self) -> (Schedule, Vec<ConfigWarning>) {
        self.remember_mtime();
        match std::fs::read_to_string(&self.schedule_path) {
            Ok(content) => Schedule::from_json_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "📅 No schedule at {}, using defaults",
                    self.schedule_path.display()
                );
                (Schedule::default(), Vec::new())
            }
            Err(e) => (
                Schedule::default(),
                vec![ConfigWarning::new(
                    "schedule",
                    format!("cannot read {} ({e}), using defaults", self.schedule_path.display()),
                )],
            ),
        }
    }

    /// Reload the schedule only when the file changed since the last load or write.
    pub fn reload_schedule_if_changed(&self) -> Option<(Schedule, Vec<ConfigWarning>)> {
        let current = file_mtime(&self.schedule_path);
        let known = *self.schedule_mtime.lock().unwrap_or_else(|e| e.into_inner());
        if current.is_none() || current == known {
            return None;
        }
        tracing::info!("📅 Schedule file changed, reloading");
        Some(self.load_schedule())
    }

    pub fn save_schedule(&self, schedule: &Schedule) -> Result<()> {
        let json = schedule.to_json_string()?;
        write_atomic(&self.schedule_path, json.as_bytes())?;
        self.remember_mtime();
        tracing::debug!("💾 Schedule saved to {}", self.schedule_path.display());
        Ok(())
    }

    /// Load the notification target, then fill unset fields from the environment.
    pub fn load_target(&self) -> (NotificationTarget, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();
        let mut target = match std::fs::read_to_string(&self.target_path) {
            Ok(content) => {
                let (target, problem) = NotificationTarget::from_json_str(&content);
                if let Some(problem) = problem {
                    warnings.push(ConfigWarning::new("notify_target", problem));
                }
                target
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NotificationTarget::default(),
            Err(e) => {
                warnings.push(ConfigWarning::new(
                    "notify_target",
                    format!("cannot read {} ({e})", self.target_path.display()),
                ));
                NotificationTarget::default()
            }
        };
        target.fill_from_env();
        (target, warnings)
    }

    pub fn save_target(&self, target: &NotificationTarget) -> Result<()> {
        let json = serde_json::to_string_pretty(target)?;
        write_atomic(&self.target_path, json.as_bytes())?;
        tracing::debug!("💾 Notification target saved to {}", self.target_path.display());
        Ok(())
    }

    fn remember_mtime(&self) {
        let mtime = file_mtime(&self.schedule_path);
        *self.schedule_mtime.lock().unwrap_or_else(|e| e.into_inner()) = mtime;
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Replace `path` with `contents` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| LockwardenError::Storage(format!("rename into {}: {}", path.display(), e.error)))?;
    Ok(())
}
