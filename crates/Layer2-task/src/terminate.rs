//! Terminator - graceful process-group shutdown with escalation
//!
//! Builds and test suites fork compilers and workers; signaling only the
//! recorded pid would orphan them. The whole process group (the child's own
//! session, see the launcher) gets SIGTERM, a grace window, then SIGKILL.

use crate::probe::{self, LivenessProbe};
use crate::record::TaskRecord;
use crate::store::TaskStore;
use std::time::{Duration, Instant};
use te_foundation::{Error, Result};
use tracing::{info, warn};

/// Poll interval while waiting for the group to die
const KILL_POLL: Duration = Duration::from_millis(200);

/// Extra wait after SIGKILL before giving up on confirmation
const POST_KILL_WAIT: Duration = Duration::from_secs(2);

/// Stops supervised tasks
#[derive(Debug, Clone)]
pub struct Terminator {
    store: TaskStore,
    probe: LivenessProbe,
}

impl Terminator {
    pub fn new(store: TaskStore) -> Self {
        let probe = LivenessProbe::new(store.clone());
        Self { store, probe }
    }

    /// Stop the record's process group. SIGTERM first, up to `grace` to
    /// comply, then SIGKILL. The record transitions to `Killed` with the
    /// wrapper's exit code when one was persisted, the sentinel otherwise.
    pub async fn stop(&self, record: TaskRecord, grace: Duration) -> Result<TaskRecord> {
        let mut record = self.probe.refresh(record)?;
        if !record.status.is_running() {
            return Err(Error::NotRunning(format!(
                "{} is {}",
                record.kind.display_name(),
                record.status
            )));
        }
        let pid = record
            .pid
            .ok_or_else(|| Error::StaleRecord(record.id.to_string()))?;

        info!(id = %record.id, pid, "sending SIGTERM to process group");
        signal_group(pid, term_signal())?;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !group_alive(pid) {
                break;
            }
            tokio::time::sleep(KILL_POLL).await;
        }

        if group_alive(pid) {
            warn!(id = %record.id, pid, "group survived SIGTERM, escalating to SIGKILL");
            signal_group(pid, kill_signal())?;

            let deadline = Instant::now() + POST_KILL_WAIT;
            while group_alive(pid) && Instant::now() < deadline {
                tokio::time::sleep(KILL_POLL).await;
            }
        }

        // A graceful exit may still have written the exit marker
        let code = probe::read_exit_code(&self.store.exit_path(&record.id));
        record.mark_killed(code);
        self.store.put(&record)?;
        info!(id = %record.id, "task killed");
        Ok(record)
    }
}

#[cfg(unix)]
fn term_signal() -> i32 {
    libc::SIGTERM
}

#[cfg(unix)]
fn kill_signal() -> i32 {
    libc::SIGKILL
}

#[cfg(not(unix))]
fn term_signal() -> i32 {
    0
}

#[cfg(not(unix))]
fn kill_signal() -> i32 {
    0
}

/// Signal every process in the group. A vanished group is success.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: i32) -> Result<()> {
    let ret = unsafe { libc::killpg(pgid as i32, signal) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(Error::Io(err));
    }
    Ok(())
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: i32) -> Result<()> {
    Err(Error::NotRunning(
        "task supervision requires a Unix host".to_string(),
    ))
}

/// Whether any process of the group is still around. Exited-but-unreaped
/// children are reaped first so zombies never read as alive.
#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    probe::reap_zombies();
    unsafe { libc::killpg(pgid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn group_alive(_pgid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::kind::TaskKind;
    use crate::launcher::{CommandPlan, ProcessLauncher};
    use crate::state::TaskStatus;
    use tempfile::TempDir;

    fn launch(store: &TaskStore, dir: &std::path::Path, script: &str) -> TaskRecord {
        ProcessLauncher::new(store.clone())
            .launch(
                TaskKind::TestL1Distributed,
                CommandPlan::new(
                    vec!["bash".to_string(), "-c".to_string(), script.to_string()],
                    dir,
                ),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_stop_cooperative_task() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let terminator = Terminator::new(store.clone());

        let record = launch(&store, dir.path(), "sleep 60");
        let pid = record.pid.unwrap();

        let stopped = terminator
            .stop(record, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stopped.status, TaskStatus::Killed);
        assert!(!group_alive(pid));
    }

    #[tokio::test]
    async fn test_stop_escalates_on_ignored_sigterm() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let terminator = Terminator::new(store.clone());

        // Child that ignores SIGTERM, plus a grandchild in the same group
        let record = launch(
            &store,
            dir.path(),
            "trap '' TERM; sleep 120 & while true; do sleep 0.2; done",
        );
        let pid = record.pid.unwrap();

        let started = Instant::now();
        let stopped = terminator
            .stop(record, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(stopped.status, TaskStatus::Killed);
        assert_eq!(stopped.exit_code, Some(crate::record::EXIT_CODE_UNKNOWN));
        // grace + post-kill confirmation, with some slack
        assert!(started.elapsed() < Duration::from_secs(4));
        // The whole group is gone, including the background sleep
        assert!(!group_alive(pid));
    }

    #[tokio::test]
    async fn test_stop_non_running_task_fails() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let terminator = Terminator::new(store.clone());
        let probe = LivenessProbe::new(store.clone());

        let record = launch(&store, dir.path(), "true");

        // Wait for the exit marker to land, then refresh to terminal
        let mut refreshed = record.clone();
        for _ in 0..100 {
            refreshed = probe.refresh(store.get(&record.id).unwrap()).unwrap();
            if refreshed.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(refreshed.status, TaskStatus::Completed);

        let err = terminator
            .stop(refreshed, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }
}
