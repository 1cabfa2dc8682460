//! Workspace-wide error type.

/// Errors surfaced by lockwarden crates outside the typed seams.
#[derive(Debug, thiserror::Error)]
pub enum LockwardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, LockwardenError>;
