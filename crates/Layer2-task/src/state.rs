//! Task status state machine
//!
//! `Pending` is the short-lived claim state between record creation and a
//! confirmed spawn. `Unknown` is recoverable: a later probe (or operator
//! reconciliation) moves it to a terminal state.

use serde::{Deserialize, Serialize};

/// Possible states of a supervised task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Record exists, process not yet spawned (launch claim)
    Pending,

    /// Process confirmed started
    Running,

    /// Process exited with code 0
    Completed,

    /// Process exited with a nonzero code
    Failed,

    /// Process was stopped through the terminator
    Killed,

    /// Liveness could not be proven (stale record, recycled pid)
    Unknown,
}

impl TaskStatus {
    /// Terminal states cannot transition further
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Killed
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Pending or running: the task still occupies its kind
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// Terminal status for an observed exit code
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Killed => "Killed",
            TaskStatus::Unknown => "Unknown",
        }
    }

    /// Status marker for console output
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "◯",
            TaskStatus::Running => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
            TaskStatus::Killed => "⊘",
            TaskStatus::Unknown => "?",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
