//! # te-task
//!
//! Task supervision core for the TE CLI. Build and test commands run as
//! detached processes that outlive the short-lived CLI invocation which
//! started them; coordination happens exclusively through durable on-disk
//! records updated with atomic renames.
//!
//! Components:
//! - Record store: one JSON file per task id, crash-consistent writes
//! - Launcher: detached spawn (own session), log capture, exit marker
//! - Liveness probe: pid + start-time signature, zombie reaping
//! - Log tailer: bounded tails and follow mode
//! - Terminator: process-group SIGTERM → SIGKILL escalation
//! - Supervisor: intent routing and the one-active-task-per-kind invariant

pub mod kind;
pub mod launcher;
pub mod probe;
pub mod record;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod tail;
pub mod terminate;

pub use kind::TaskKind;
pub use launcher::{CommandPlan, ProcessLauncher};
pub use probe::LivenessProbe;
pub use record::{TaskId, TaskRecord, EXIT_CODE_UNKNOWN};
pub use state::TaskStatus;
pub use store::TaskStore;
pub use supervisor::{CommandBuilder, NoPrecheck, Precheck, TaskSupervisor};
pub use tail::{LogFollower, LogTailer};
pub use terminate::Terminator;
