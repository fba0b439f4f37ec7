//! Liveness probe - reconcile records with what the OS actually reports
//!
//! A pid alone is not identity: the OS recycles pids, so an alive pid is
//! trusted only when the process start time still matches the signature
//! captured at spawn. A dead (or mismatched) pid resolves through the exit
//! marker the supervision wrapper leaves behind; without a marker the record
//! becomes `Unknown` rather than guessing an outcome.

use crate::record::TaskRecord;
use crate::state::TaskStatus;
use crate::store::TaskStore;
use std::path::Path;
use te_foundation::Result;
use tracing::{debug, warn};

/// Claims older than this are assumed to belong to a crashed launcher
pub(crate) const CLAIM_TTL_SECS: i64 = 30;

/// Re-evaluates records against the OS; safe to call redundantly from any
/// invocation at any time.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    store: TaskStore,
}

impl LivenessProbe {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }

    /// Refresh one record. Transitions are written back through the store;
    /// records in a terminal state are returned unchanged.
    pub fn refresh(&self, record: TaskRecord) -> Result<TaskRecord> {
        match record.status {
            TaskStatus::Running => self.refresh_running(record),
            TaskStatus::Pending => self.refresh_pending(record),
            TaskStatus::Unknown => self.resolve_from_exit_marker(record),
            _ => Ok(record),
        }
    }

    fn refresh_running(&self, record: TaskRecord) -> Result<TaskRecord> {
        // Children of this very process stay zombies until reaped; reap
        // before asking the OS whether the pid is alive.
        reap_zombies();

        let Some(pid) = record.pid else {
            warn!(id = %record.id, "running record without a pid");
            return self.transition_unknown(record);
        };

        if process_alive(pid) {
            match (record.start_ticks, process_start_ticks(pid)) {
                // Signature matches: provably still our process
                (Some(recorded), Some(current)) if recorded == current => {
                    return Ok(record);
                }
                // No signature was captured at spawn; the pid is the best
                // signal available
                (None, _) => return Ok(record),
                _ => {
                    debug!(id = %record.id, pid, "pid alive but start time differs (recycled)");
                }
            }
        }

        self.resolve_from_exit_marker(record)
    }

    /// A pending claim normally becomes running within milliseconds; one
    /// older than the claim TTL belongs to a launcher that died mid-flight.
    fn refresh_pending(&self, record: TaskRecord) -> Result<TaskRecord> {
        if record.age_secs() > CLAIM_TTL_SECS {
            warn!(id = %record.id, "stale launch claim");
            return self.transition_unknown(record);
        }
        Ok(record)
    }

    fn resolve_from_exit_marker(&self, mut record: TaskRecord) -> Result<TaskRecord> {
        match read_exit_code(&self.store.exit_path(&record.id)) {
            Some(code) => {
                debug!(id = %record.id, code, "exit marker found");
                record.mark_exited(code);
                self.store.put(&record)?;
                Ok(record)
            }
            None if record.status == TaskStatus::Unknown => Ok(record),
            None => self.transition_unknown(record),
        }
    }

    fn transition_unknown(&self, mut record: TaskRecord) -> Result<TaskRecord> {
        record.mark_unknown();
        self.store.put(&record)?;
        Ok(record)
    }
}

/// Read the exit code persisted by the supervision wrapper
pub(crate) fn read_exit_code(path: &Path) -> Option<i32> {
    let content = std::fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

/// Whether a process with this pid currently exists
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Process start time in clock ticks: field 22 of `/proc/<pid>/stat`.
/// `None` when procfs is unavailable (non-Linux unix) or the pid is gone.
pub fn process_start_ticks(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm (field 2) may contain spaces; fields resume after the last ')'
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().nth(19)?.parse().ok()
}

/// Reap any exited children of this process (non-blocking). A detached child
/// whose launcher is still alive would otherwise linger as a zombie and keep
/// reading as "alive".
#[cfg(unix)]
pub(crate) fn reap_zombies() {
    loop {
        let reaped = unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) };
        if reaped <= 0 {
            break;
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn reap_zombies() {}
