//! Task records - durable identity and metadata of launched tasks

use crate::kind::TaskKind;
use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exit code recorded when a task was killed without a recoverable code
pub const EXIT_CODE_UNKNOWN: i32 = -1;

/// Unique task identifier: `<kind>-<unix-millis>-<launcher-pid>-<seq>`
///
/// Lexicographic order of same-kind ids follows creation order down to the
/// millisecond (the millis field is zero-padded); the pid and sequence
/// suffixes keep simultaneous launchers - and repeated launches within one
/// process - distinct, and give every observer the same total order to
/// arbitrate concurrent claims with.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate(kind: TaskKind) -> Self {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Self(format!(
            "{}-{:013}-{}-{}",
            kind,
            Utc::now().timestamp_millis(),
            std::process::id(),
            seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable metadata of one launched task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier, immutable once created
    pub id: TaskId,

    /// Task category
    pub kind: TaskKind,

    /// Exact argument vector (before supervision wrapping)
    pub command: Vec<String>,

    /// OS pid of the detached process; meaningful only while running
    pub pid: Option<u32>,

    /// Process start time in clock ticks (`/proc/<pid>/stat`), the secondary
    /// signature that guards against pid reuse
    pub start_ticks: Option<u64>,

    /// Combined stdout/stderr capture file
    pub log_path: PathBuf,

    /// Record creation time
    pub started_at: DateTime<Utc>,

    /// Current state
    pub status: TaskStatus,

    /// Populated once status leaves running
    pub exit_code: Option<i32>,
}

impl TaskRecord {
    /// Create a launch claim (no process yet)
    pub fn claim(kind: TaskKind, command: Vec<String>, log_path: PathBuf) -> Self {
        Self {
            id: TaskId::generate(kind),
            kind,
            command,
            pid: None,
            start_ticks: None,
            log_path,
            started_at: Utc::now(),
            status: TaskStatus::Pending,
            exit_code: None,
        }
    }

    /// Confirm the spawn
    pub fn mark_running(&mut self, pid: u32, start_ticks: Option<u64>) {
        self.pid = Some(pid);
        self.start_ticks = start_ticks;
        self.status = TaskStatus::Running;
    }

    /// Record an observed exit
    pub fn mark_exited(&mut self, code: i32) {
        self.status = TaskStatus::from_exit_code(code);
        self.exit_code = Some(code);
    }

    /// Record a termination through the terminator
    pub fn mark_killed(&mut self, code: Option<i32>) {
        self.status = TaskStatus::Killed;
        self.exit_code = Some(code.unwrap_or(EXIT_CODE_UNKNOWN));
    }

    /// Liveness could not be proven
    pub fn mark_unknown(&mut self) {
        self.status = TaskStatus::Unknown;
    }

    /// Seconds since the record was created
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Command line for display
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskRecord {
        TaskRecord::claim(
            TaskKind::BuildCppTests,
            vec!["bash".to_string(), "-c".to_string(), "true".to_string()],
            PathBuf::from("/tmp/te/logs/x.log"),
        )
    }

    #[test]
    fn test_id_embeds_kind() {
        let record = sample();
        assert!(record.id.as_str().starts_with("build-cpp-tests-"));
    }

    #[test]
    fn test_same_kind_ids_order_by_creation() {
        let a = TaskId::generate(TaskKind::Rebuild);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = TaskId::generate(TaskKind::Rebuild);
        assert!(a < b);
    }

    #[test]
    fn test_claim_then_running() {
        let mut record = sample();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.pid.is_none());

        record.mark_running(4242, Some(12345));
        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.pid, Some(4242));
        assert_eq!(record.start_ticks, Some(12345));
    }

    #[test]
    fn test_exit_transitions() {
        let mut record = sample();
        record.mark_running(1, None);
        record.mark_exited(0);
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.exit_code, Some(0));

        let mut record = sample();
        record.mark_running(1, None);
        record.mark_exited(7);
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.exit_code, Some(7));
    }

    #[test]
    fn test_killed_sentinel() {
        let mut record = sample();
        record.mark_running(1, None);
        record.mark_killed(None);
        assert_eq!(record.status, TaskStatus::Killed);
        assert_eq!(record.exit_code, Some(EXIT_CODE_UNKNOWN));
    }

    #[test]
    fn test_serde_roundtrip_preserves_every_field() {
        let mut record = sample();
        record.mark_running(99, Some(777));
        let json = serde_json::to_string_pretty(&record).unwrap();
        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
