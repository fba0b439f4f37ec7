//! Error types for the TE CLI
//!
//! Every crate in the workspace funnels failures through this enum so the
//! CLI layer can map them onto its stable exit-code taxonomy.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// TE CLI error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Task supervision
    // ========================================================================
    #[error("Task already running: {0}")]
    Conflict(String),

    #[error("Failed to spawn task: {0}")]
    Spawn(String),

    #[error("Task is not running: {0}")]
    NotRunning(String),

    #[error("Stale task record: {0}")]
    StaleRecord(String),

    #[error("Unsupported task kind: {0}")]
    UnsupportedKind(String),

    // ========================================================================
    // Environment
    // ========================================================================
    #[error("Missing dependency: {tool} - {detail}")]
    MissingDependency { tool: String, detail: String },

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Misc
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors the user can recover from without treating the invocation as
    /// broken (stop the other task, wait, reconcile, ...)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_)
                | Error::NotRunning(_)
                | Error::StaleRecord(_)
                | Error::NotFound(_)
        )
    }

    /// MissingDependency construction helper
    pub fn missing_dependency(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::MissingDependency {
            tool: tool.into(),
            detail: detail.into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
