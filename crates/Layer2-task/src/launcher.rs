//! Process launcher - detached spawn with a durable record
//!
//! The child is started in its own session (`setsid`), with both output
//! streams redirected into the task log, so it survives the CLI invocation
//! that launched it. A small shell wrapper persists the command's exit code
//! next to the record; that marker is the only way a later invocation can
//! recover the outcome, since a detached child cannot be waited on from an
//! unrelated process.
//!
//! Two invocations can race to launch the same kind at the same wall-clock
//! instant. Arbitration uses only the store's atomic renames: each launcher
//! first persists a `Pending` claim, then re-lists the conflict group - a
//! rival that is already running, or a rival claim with a smaller id, wins,
//! and the loser withdraws with `Conflict`.

use crate::kind::TaskKind;
use crate::probe::{self, LivenessProbe};
use crate::record::{TaskId, TaskRecord};
use crate::state::TaskStatus;
use crate::store::TaskStore;
use std::path::PathBuf;
use te_foundation::{Error, Result};
use tracing::{debug, info, warn};

/// Argv plus the directory it runs in
#[derive(Debug, Clone)]
pub struct CommandPlan {
    /// Exact argument vector to execute
    pub argv: Vec<String>,

    /// Working directory for the child
    pub workdir: PathBuf,
}

impl CommandPlan {
    pub fn new(argv: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            workdir: workdir.into(),
        }
    }
}

/// Wrapper that persists the wrapped command's exit code before exiting
/// with it. `$1` is the marker path, the rest is the user argv.
const SUPERVISE_WRAPPER: &str = r#"exit_file="$1"; shift
"$@"
rc=$?
printf '%s' "$rc" > "${exit_file}.tmp" && mv "${exit_file}.tmp" "$exit_file"
exit "$rc""#;

/// Launches detached tasks and persists their records
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    store: TaskStore,
    probe: LivenessProbe,
}

impl ProcessLauncher {
    pub fn new(store: TaskStore) -> Self {
        let probe = LivenessProbe::new(store.clone());
        Self { store, probe }
    }

    /// Launch `plan` as a detached task of `kind`.
    ///
    /// Returns as soon as the child is confirmed started; the returned record
    /// is already persisted as `Running`. Fails with `Conflict` when a task
    /// of the same conflict group is active, `Spawn` when the OS refuses the
    /// process.
    pub fn launch(&self, kind: TaskKind, plan: CommandPlan) -> Result<TaskRecord> {
        self.ensure_kind_free(kind, None)?;

        let mut record = TaskRecord::claim(kind, plan.argv.clone(), PathBuf::new());
        record.log_path = self.store.log_path(&record.id);
        self.store.put(&record)?;
        debug!(id = %record.id, "launch claim persisted");

        // Re-verify after our claim landed: a concurrent launcher may have
        // claimed or even spawned in the meantime.
        if let Err(e) = self.ensure_kind_free(kind, Some(&record.id)) {
            let _ = self.store.delete(&record.id);
            return Err(e);
        }

        match self.spawn_detached(&record, &plan) {
            Ok((pid, start_ticks)) => {
                record.mark_running(pid, start_ticks);
                self.store.put(&record)?;
                info!(id = %record.id, pid, "task started");
                Ok(record)
            }
            Err(e) => {
                let _ = self.store.delete(&record.id);
                Err(e)
            }
        }
    }

    /// Error out when a refreshed record of the conflict group is active.
    /// `own` skips the caller's claim; rival claims lose to a smaller id.
    fn ensure_kind_free(&self, kind: TaskKind, own: Option<&TaskId>) -> Result<()> {
        for record in self.store.list()? {
            if !record.kind.conflicts_with(kind) || Some(&record.id) == own {
                continue;
            }
            let record = self.probe.refresh(record)?;
            match record.status {
                TaskStatus::Running => {
                    return Err(Error::Conflict(format!(
                        "{} (pid {})",
                        record.kind.display_name(),
                        record.pid.unwrap_or(0)
                    )));
                }
                TaskStatus::Pending => {
                    let outranked = own.map_or(true, |own| record.id < *own);
                    if outranked {
                        return Err(Error::Conflict(format!(
                            "{} is being launched",
                            record.kind.display_name()
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Spawn the wrapped command fully detached. Returns the child pid and
    /// its start-time signature.
    #[cfg(unix)]
    fn spawn_detached(&self, record: &TaskRecord, plan: &CommandPlan) -> Result<(u32, Option<u64>)> {
        use std::os::unix::process::CommandExt;
        use std::process::{Command, Stdio};

        let log = std::fs::File::create(&record.log_path)
            .map_err(|e| Error::Spawn(format!("cannot create log file: {}", e)))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Error::Spawn(format!("cannot clone log handle: {}", e)))?;

        let exit_path = self.store.exit_path(&record.id);

        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(SUPERVISE_WRAPPER)
            .arg("te-task")
            .arg(&exit_path)
            .args(&plan.argv)
            .current_dir(&plan.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // New session: the child keeps running after this invocation exits,
        // and its process group id equals its pid for group signaling.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", plan.argv.join(" "), e)))?;
        let pid = child.id();

        let start_ticks = probe::process_start_ticks(pid);
        if start_ticks.is_none() {
            warn!(pid, "no start-time signature available; liveness degrades to pid-only");
        }

        // The child handle is dropped on purpose: the probe reaps it if this
        // process is still around when it exits.
        Ok((pid, start_ticks))
    }

    #[cfg(not(unix))]
    fn spawn_detached(
        &self,
        _record: &TaskRecord,
        _plan: &CommandPlan,
    ) -> Result<(u32, Option<u64>)> {
        Err(Error::Spawn(
            "task supervision requires a Unix host".to_string(),
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plan(script: &str, workdir: &std::path::Path) -> CommandPlan {
        CommandPlan::new(
            vec!["bash".to_string(), "-c".to_string(), script.to_string()],
            workdir,
        )
    }

    fn kill_group(pid: u32) {
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }

    #[test]
    fn test_launch_persists_running_record() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let launcher = ProcessLauncher::new(store.clone());

        let record = launcher
            .launch(TaskKind::TestL0Cpp, plan("sleep 30", dir.path()))
            .unwrap();

        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.pid.is_some());
        assert!(record.log_path.exists());

        // Visible to a separate store over the same directory
        let other = TaskStore::open(dir.path()).unwrap();
        let loaded = other.get(&record.id).unwrap();
        assert_eq!(loaded.command, record.command);
        assert_eq!(loaded.status, TaskStatus::Running);

        kill_group(record.pid.unwrap());
    }

    #[test]
    fn test_failed_spawn_leaves_no_record() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let launcher = ProcessLauncher::new(store.clone());

        let bad = CommandPlan::new(
            vec!["/definitely/not/a/binary".to_string()],
            dir.path().join("missing-workdir"),
        );
        let err = launcher.launch(TaskKind::TestL0Cpp, bad).unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));

        // No record survives a failed spawn
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_second_launch_of_same_kind_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let launcher = ProcessLauncher::new(store.clone());

        let first = launcher
            .launch(TaskKind::BuildCppTests, plan("sleep 30", dir.path()))
            .unwrap();
        let second = launcher.launch(TaskKind::BuildCppTests, plan("sleep 30", dir.path()));
        assert!(matches!(second, Err(Error::Conflict(_))));

        // A different conflict group proceeds
        let other = launcher
            .launch(TaskKind::TestL0Cpp, plan("sleep 30", dir.path()))
            .unwrap();

        kill_group(first.pid.unwrap());
        kill_group(other.pid.unwrap());
    }

    #[test]
    fn test_relaunch_after_completion_appends_new_record() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let launcher = ProcessLauncher::new(store.clone());
        let probe = LivenessProbe::new(store.clone());

        let first = launcher
            .launch(TaskKind::TestL0Pytorch, plan("true", dir.path()))
            .unwrap();
        wait_until_terminal(&probe, &store, &first.id);

        let second = launcher
            .launch(TaskKind::TestL0Pytorch, plan("true", dir.path()))
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.log_path, second.log_path);

        // Both records and both logs are retained
        assert_eq!(store.list().unwrap().len(), 2);
        assert!(first.log_path.exists());
        wait_until_terminal(&probe, &store, &second.id);
    }

    fn wait_until_terminal(probe: &LivenessProbe, store: &TaskStore, id: &TaskId) {
        for _ in 0..100 {
            let record = probe.refresh(store.get(id).unwrap()).unwrap();
            if record.status.is_terminal() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        panic!("task {} never reached a terminal state", id);
    }
}
