//! Task record store - one JSON file per task id
//!
//! The store owns the canonical on-disk representation. Writers go through
//! `put` (temp file + atomic rename), so concurrent CLI invocations can race
//! on the same directory without ever exposing a half-written record. File
//! names derive from the task id alone, which lets independent processes
//! resolve the same paths with no extra coordination.

use crate::kind::TaskKind;
use crate::record::{TaskId, TaskRecord};
use std::path::{Path, PathBuf};
use te_foundation::{Error, JsonStore, Result};

/// Record directory under the state dir
const TASKS_DIR: &str = "tasks";

/// Log directory under the state dir
const LOGS_DIR: &str = "logs";

/// Durable task record store rooted at a state directory
#[derive(Debug, Clone)]
pub struct TaskStore {
    records: JsonStore,
    logs_dir: PathBuf,
}

impl TaskStore {
    /// Open (creating directories as needed) under an explicit state dir
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        let tasks_dir = state_dir.join(TASKS_DIR);
        let logs_dir = state_dir.join(LOGS_DIR);
        std::fs::create_dir_all(&tasks_dir)?;
        std::fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            records: JsonStore::new(tasks_dir),
            logs_dir,
        })
    }

    /// Open under the per-user state directory (`~/.te`)
    pub fn user() -> Result<Self> {
        let base = JsonStore::user()?;
        Self::open(base.base_dir())
    }

    /// Log file path for a task id
    pub fn log_path(&self, id: &TaskId) -> PathBuf {
        self.logs_dir.join(format!("{}.log", id))
    }

    /// Exit-marker file path for a task id
    pub fn exit_path(&self, id: &TaskId) -> PathBuf {
        self.records.file_path(&format!("{}.exit", id))
    }

    fn record_file(id: &TaskId) -> String {
        format!("{}.json", id)
    }

    /// All records, most recent first
    pub fn list(&self) -> Result<Vec<TaskRecord>> {
        let dir = self.records.base_dir();
        let mut records = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") {
                continue;
            }
            match self.records.load::<TaskRecord>(&name) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A record mid-rename reads as either old or new, never
                    // partial; anything unparsable here is genuinely damaged.
                    tracing::warn!(file = %name, error = %e, "skipping unreadable task record");
                }
            }
        }
        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records)
    }

    /// Fetch one record
    pub fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        let file = Self::record_file(id);
        if !self.records.exists(&file) {
            return Err(Error::NotFound(format!("task record {}", id)));
        }
        self.records.load(&file)
    }

    /// Create or replace a record atomically
    pub fn put(&self, record: &TaskRecord) -> Result<()> {
        self.records
            .save_atomic(&Self::record_file(&record.id), record)
    }

    /// Remove a record and its exit marker. The log file is kept for
    /// postmortem inspection; explicit cleanup deletes it separately.
    pub fn delete(&self, id: &TaskId) -> Result<()> {
        self.records.remove(&Self::record_file(id))?;
        self.records.remove(&format!("{}.exit", id))
    }

    /// The current (most recent) record for a kind
    pub fn latest(&self, kind: TaskKind) -> Result<Option<TaskRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.kind == kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskStatus;
    use tempfile::TempDir;

    fn record(kind: TaskKind, store: &TaskStore) -> TaskRecord {
        let mut r = TaskRecord::claim(
            kind,
            vec!["bash".to_string(), "-c".to_string(), "true".to_string()],
            PathBuf::from("placeholder.log"),
        );
        r.log_path = store.log_path(&r.id);
        r
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();

        let mut rec = record(TaskKind::BuildPythonIncremental, &store);
        rec.mark_running(314, Some(161803));
        store.put(&rec).unwrap();

        let loaded = store.get(&rec.id).unwrap();
        assert_eq!(loaded, rec);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let id = TaskId::generate(TaskKind::Rebuild);
        assert!(matches!(store.get(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_orders_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();

        let older = record(TaskKind::BuildPythonIncremental, &store);
        store.put(&older).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let newer = record(TaskKind::TestL0Cpp, &store);
        store.put(&newer).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }

    #[test]
    fn test_latest_per_kind() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();

        let mut first = record(TaskKind::TestL0Cpp, &store);
        first.mark_running(1, None);
        first.mark_exited(1);
        store.put(&first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = record(TaskKind::TestL0Cpp, &store);
        store.put(&second).unwrap();

        let latest = store.latest(TaskKind::TestL0Cpp).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.status, TaskStatus::Pending);
        assert!(store.latest(TaskKind::Rebuild).unwrap().is_none());
    }

    #[test]
    fn test_visible_from_second_store_instance() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let rec = record(TaskKind::BuildAll, &store);
        store.put(&rec).unwrap();

        // A separate CLI invocation opens its own store over the same dir
        let other = TaskStore::open(dir.path()).unwrap();
        let loaded = other.get(&rec.id).unwrap();
        assert_eq!(loaded, rec);
    }

    #[test]
    fn test_delete_keeps_log_file() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let rec = record(TaskKind::BuildCppTests, &store);
        store.put(&rec).unwrap();
        std::fs::write(&rec.log_path, "output\n").unwrap();

        store.delete(&rec.id).unwrap();
        assert!(store.get(&rec.id).is_err());
        assert!(rec.log_path.exists());
    }

    #[test]
    fn test_list_skips_crashed_writer_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        let rec = record(TaskKind::Rebuild, &store);
        store.put(&rec).unwrap();

        // Leftover temp file from a writer that died before its rename
        std::fs::write(
            dir.path().join(TASKS_DIR).join("zzz.json.tmp.4242"),
            "{\"id\": \"zz",
        )
        .unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, rec.id);
    }
}
