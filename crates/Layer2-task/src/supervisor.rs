//! Task supervisor - maps user intents onto launch/probe/tail/stop
//!
//! The supervisor owns the single-active-task-per-kind invariant (by always
//! refreshing liveness before deciding a kind is free) and is the only
//! component that decides user-facing behavior for errors bubbling up from
//! the components below it.

use crate::kind::TaskKind;
use crate::launcher::{CommandPlan, ProcessLauncher};
use crate::probe::LivenessProbe;
use crate::record::TaskRecord;
use crate::state::TaskStatus;
use crate::store::TaskStore;
use crate::tail::{LogFollower, LogTailer};
use crate::terminate::Terminator;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use te_foundation::{Error, Result};
use tracing::{debug, info};

/// Builds the concrete command line for a task kind. Pure; no side effects.
pub trait CommandBuilder: Send + Sync {
    fn build(&self, kind: TaskKind, extra_args: &[String]) -> Result<CommandPlan>;
}

/// Environment pre-flight check, invoked before every launch. A failing
/// precheck blocks the spawn and must not create a record.
#[async_trait]
pub trait Precheck: Send + Sync {
    async fn precheck(&self, kind: TaskKind) -> Result<()>;
}

/// A precheck that always passes (tests, trusted environments)
pub struct NoPrecheck;

#[async_trait]
impl Precheck for NoPrecheck {
    async fn precheck(&self, _kind: TaskKind) -> Result<()> {
        Ok(())
    }
}

/// Drives the task supervision components on behalf of the CLI
pub struct TaskSupervisor {
    store: TaskStore,
    launcher: ProcessLauncher,
    probe: LivenessProbe,
    terminator: Terminator,
    builder: Arc<dyn CommandBuilder>,
    precheck: Arc<dyn Precheck>,
    grace: Duration,
}

impl TaskSupervisor {
    pub fn new(
        store: TaskStore,
        builder: Arc<dyn CommandBuilder>,
        precheck: Arc<dyn Precheck>,
    ) -> Self {
        Self {
            launcher: ProcessLauncher::new(store.clone()),
            probe: LivenessProbe::new(store.clone()),
            terminator: Terminator::new(store.clone()),
            store,
            builder,
            precheck,
            grace: Duration::from_secs(10),
        }
    }

    /// Grace period for graceful stops
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start a task of `kind`. Precheck, then conflict-checked detached
    /// launch; returns the persisted running record.
    pub async fn start(&self, kind: TaskKind, extra_args: &[String]) -> Result<TaskRecord> {
        self.precheck.precheck(kind).await?;
        let plan = self.builder.build(kind, extra_args)?;
        debug!(%kind, command = %plan.argv.join(" "), "launching");
        self.launcher.launch(kind, plan)
    }

    /// Probe-refreshed current record for `kind`, if any was ever launched
    pub fn status(&self, kind: TaskKind) -> Result<Option<TaskRecord>> {
        match self.store.latest(kind)? {
            Some(record) => Ok(Some(self.probe.refresh(record)?)),
            None => Ok(None),
        }
    }

    /// Probe-refreshed view of every stored record, most recent first
    pub fn status_all(&self) -> Result<Vec<TaskRecord>> {
        self.store
            .list()?
            .into_iter()
            .map(|r| self.probe.refresh(r))
            .collect()
    }

    /// Last `lines` lines of the current record's log
    pub async fn tail(&self, kind: TaskKind, lines: usize) -> Result<Vec<String>> {
        let record = self.current(kind)?;
        LogTailer::read_tail(&record, lines).await
    }

    /// Follow the current record's log
    pub async fn follow(&self, kind: TaskKind, lines: usize) -> Result<LogFollower> {
        let record = self.current(kind)?;
        LogTailer::follow(&record, lines).await
    }

    /// Stop the current record of `kind` (graceful, then forceful)
    pub async fn stop(&self, kind: TaskKind) -> Result<TaskRecord> {
        let record = self.current(kind)?;
        self.terminator.stop(record, self.grace).await
    }

    /// Operator resolution for a record stuck in `Unknown`: one final probe
    /// (the exit marker may have appeared), then mark it killed.
    pub fn reconcile(&self, kind: TaskKind) -> Result<TaskRecord> {
        let record = self.probe.refresh(self.current(kind)?)?;
        match record.status {
            TaskStatus::Unknown => {
                let mut record = record;
                record.mark_killed(None);
                self.store.put(&record)?;
                info!(id = %record.id, "unknown task reconciled as killed");
                Ok(record)
            }
            _ => Ok(record),
        }
    }

    /// Delete terminal records of `kind` (or all kinds) together with their
    /// logs. Active tasks are left untouched; returns the number removed.
    pub fn clean(&self, kind: Option<TaskKind>) -> Result<usize> {
        let mut removed = 0;
        for record in self.store.list()? {
            if kind.is_some_and(|k| record.kind != k) {
                continue;
            }
            let record = self.probe.refresh(record)?;
            if record.status.is_active() || record.status == TaskStatus::Unknown {
                continue;
            }
            self.store.delete(&record.id)?;
            if record.log_path.exists() {
                std::fs::remove_file(&record.log_path)?;
            }
            removed += 1;
        }
        info!(removed, "cleaned task history");
        Ok(removed)
    }

    fn current(&self, kind: TaskKind) -> Result<TaskRecord> {
        self.store
            .latest(kind)?
            .ok_or_else(|| Error::NotFound(format!("no task record for {}", kind)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Fixed kind → script table standing in for the real script builder
    struct StaticBuilder {
        workdir: std::path::PathBuf,
        scripts: HashMap<TaskKind, String>,
    }

    impl CommandBuilder for StaticBuilder {
        fn build(&self, kind: TaskKind, _extra_args: &[String]) -> Result<CommandPlan> {
            let script = self
                .scripts
                .get(&kind)
                .ok_or_else(|| Error::UnsupportedKind(kind.to_string()))?;
            Ok(CommandPlan::new(
                vec!["bash".to_string(), "-c".to_string(), script.clone()],
                &self.workdir,
            ))
        }
    }

    /// Precheck that always refuses
    struct FailingPrecheck;

    #[async_trait]
    impl Precheck for FailingPrecheck {
        async fn precheck(&self, _kind: TaskKind) -> Result<()> {
            Err(Error::missing_dependency("cmake", "not found on PATH"))
        }
    }

    fn supervisor(dir: &TempDir, scripts: &[(TaskKind, &str)]) -> TaskSupervisor {
        let store = TaskStore::open(dir.path()).unwrap();
        let builder = StaticBuilder {
            workdir: dir.path().to_path_buf(),
            scripts: scripts
                .iter()
                .map(|(k, s)| (*k, s.to_string()))
                .collect(),
        };
        TaskSupervisor::new(store, Arc::new(builder), Arc::new(NoPrecheck))
            .with_grace(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_failed_precheck_blocks_launch_without_record() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let builder = StaticBuilder {
            workdir: dir.path().to_path_buf(),
            scripts: HashMap::new(),
        };
        let supervisor =
            TaskSupervisor::new(store.clone(), Arc::new(builder), Arc::new(FailingPrecheck));

        let err = supervisor
            .start(TaskKind::BuildCppTests, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingDependency { .. }));
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmapped_kind_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, &[]);
        let err = supervisor.start(TaskKind::Rebuild, &[]).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(_)));
    }

    #[tokio::test]
    async fn test_start_status_stop_cycle() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, &[(TaskKind::BuildPythonIncremental, "sleep 60")]);

        let record = supervisor
            .start(TaskKind::BuildPythonIncremental, &[])
            .await
            .unwrap();
        assert_eq!(record.status, TaskStatus::Running);

        let status = supervisor
            .status(TaskKind::BuildPythonIncremental)
            .unwrap()
            .unwrap();
        assert_eq!(status.id, record.id);
        assert_eq!(status.status, TaskStatus::Running);

        let stopped = supervisor.stop(TaskKind::BuildPythonIncremental).await.unwrap();
        assert_eq!(stopped.status, TaskStatus::Killed);

        // Stopping again is a NotRunning error, not a crash
        let err = supervisor
            .stop(TaskKind::BuildPythonIncremental)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_status_of_never_launched_kind() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, &[]);
        assert!(supervisor.status(TaskKind::BuildAll).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clean_removes_terminal_but_not_running() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(
            &dir,
            &[
                (TaskKind::TestL0Cpp, "true"),
                (TaskKind::BuildPythonIncremental, "sleep 60"),
            ],
        );

        let done = supervisor.start(TaskKind::TestL0Cpp, &[]).await.unwrap();
        for _ in 0..100 {
            let status = supervisor.status(TaskKind::TestL0Cpp).unwrap().unwrap();
            if status.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let running = supervisor
            .start(TaskKind::BuildPythonIncremental, &[])
            .await
            .unwrap();

        let removed = supervisor.clean(None).unwrap();
        assert_eq!(removed, 1);
        assert!(!done.log_path.exists());
        assert!(supervisor
            .status(TaskKind::BuildPythonIncremental)
            .unwrap()
            .is_some());

        supervisor.stop(TaskKind::BuildPythonIncremental).await.unwrap();
        let _ = running;
    }
}
