//! TE CLI - main entry point
//!
//! Short-lived invocations over a shared on-disk task state: `te -b -c`
//! starts a detached build, `te -p` inspects it from a later shell, and
//! `te -b -k` stops it from yet another.
//!
//! Exit codes are stable; scripts depend on them:
//! - `0` success
//! - `1` operation failed (spawn error, missing dependency, cancelled)
//! - `2` no such task / nothing recorded for the request
//! - `3` a task of that kind is still running (conflict)

mod artifact;
mod commands;
mod output;

use clap::Parser;
use commands::{clean_cpp_artifacts, TeCommandBuilder, TePrecheck};
use output::{CYAN, GREEN, GREY, RED, RESET, YELLOW};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use te_foundation::{EnvironmentReport, Error, TeConfig};
use te_task::{TaskKind, TaskStatus, TaskStore, TaskSupervisor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_NO_TASK: i32 = 2;
const EXIT_STILL_RUNNING: i32 = 3;

/// Lines shown before follow mode starts streaming
const TAIL_LINES: usize = 50;

/// TE developer workflow CLI
#[derive(Parser, Debug)]
#[command(name = "te")]
#[command(version, about = "TE developer workflow CLI", long_about = None, disable_version_flag = true)]
struct Args {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Build commands
    #[arg(short = 'b', long)]
    build: bool,

    /// Python core (build), or C++ suite selector (tests)
    #[arg(short = 'c', long)]
    core: bool,

    /// C++ suite selector, same meaning as -c under -0
    #[arg(long)]
    cpp: bool,

    /// C++ tests (build), or Torch suite selector (tests)
    #[arg(short = 't', long, visible_alias = "torch")]
    test: bool,

    /// Incremental rebuild; with -d, full clean rebuild
    #[arg(short = 'r', long)]
    rebuild: bool,

    /// Clean variant of the selected build
    #[arg(short = 'd', long, visible_alias = "clean")]
    delete: bool,

    /// Tail the selected task's log (follows until Ctrl-C)
    #[arg(short = 'l', long)]
    log: bool,

    /// Stop the selected task
    #[arg(short = 'k', long)]
    kill: bool,

    /// L0 test suites
    #[arg(short = '0', long)]
    l0: bool,

    /// L1 test suites
    #[arg(short = '1', long)]
    l1: bool,

    /// Show running tasks
    #[arg(short = 'p', long)]
    process: bool,

    /// Build artifact status report
    #[arg(short = 's', long)]
    status: bool,

    /// Check environment dependencies
    #[arg(long)]
    check_env: bool,

    /// Remove finished task records and their logs
    #[arg(long)]
    clear: bool,

    /// Resolve a task stuck in unknown state as reclaimed
    #[arg(long)]
    reconcile: bool,

    /// Verbose logging
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Extra source files to touch before a rebuild
    #[arg(trailing_var_arg = true)]
    extra: Vec<String>,
}

/// What one invocation asks for
#[derive(Debug, Clone, PartialEq)]
enum Intent {
    Start(TaskKind),
    Tail(TaskKind),
    Kill(TaskKind),
    /// `-b -k`: stop whichever build-group task is active
    KillBuild,
    ShowHelp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = TeConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config: {}", e);
        TeConfig::default()
    });

    let code = run(args, config).await;
    std::process::exit(code);
}

async fn run(args: Args, config: TeConfig) -> i32 {
    if args.check_env {
        return check_env(&config).await;
    }
    if args.status {
        artifact::print_report(&config).await;
        return EXIT_OK;
    }

    let supervisor = match build_supervisor(&config) {
        Ok(s) => s,
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            return EXIT_FAILED;
        }
    };

    if args.process {
        return show_processes(&supervisor);
    }
    if args.clear {
        return clear_history(&supervisor, &args);
    }
    if args.reconcile {
        return reconcile(&supervisor, &args);
    }

    let intent = match resolve_intent(&args) {
        Ok(intent) => intent,
        Err(message) => {
            println!("{}❌ Error: conflicting flags{}", RED, RESET);
            println!("{}{}{}", GREY, message, RESET);
            return EXIT_FAILED;
        }
    };

    match intent {
        Intent::ShowHelp => {
            use clap::CommandFactory;
            let _ = Args::command().print_help();
            EXIT_OK
        }
        Intent::Start(kind) => start_task(&supervisor, &config, kind, &args).await,
        Intent::Tail(kind) => tail_log(&supervisor, kind).await,
        Intent::Kill(kind) => kill_task(&supervisor, kind).await,
        Intent::KillBuild => kill_build_group(&supervisor).await,
    }
}

/// Flag grammar → intent. Mirrors the historical short-flag layout.
fn resolve_intent(args: &Args) -> Result<Intent, String> {
    if args.build {
        if args.rebuild && (args.core || args.test) {
            return Err(
                "Rebuild (-r) is a standalone build; it cannot be combined with Core (-c) or Test (-t)"
                    .to_string(),
            );
        }
        if args.core && args.test {
            return Err(
                "Core (-c) and Test (-t) cannot run together (run them separately)".to_string(),
            );
        }
        if args.kill {
            return Ok(Intent::KillBuild);
        }

        let kind = if args.rebuild {
            if args.delete {
                TaskKind::BuildAll
            } else {
                TaskKind::Rebuild
            }
        } else if args.core {
            if args.delete {
                TaskKind::BuildPythonClean
            } else {
                TaskKind::BuildPythonIncremental
            }
        } else if args.test {
            TaskKind::BuildCppTests
        } else {
            return Ok(Intent::ShowHelp);
        };

        return Ok(if args.log {
            Intent::Tail(kind)
        } else {
            Intent::Start(kind)
        });
    }

    if args.l0 {
        let kind = if args.cpp || args.core {
            TaskKind::TestL0Cpp
        } else if args.test {
            TaskKind::TestL0Pytorch
        } else {
            return Ok(Intent::ShowHelp);
        };
        return Ok(route_modifiers(args, kind));
    }

    if args.l1 && args.test {
        return Ok(route_modifiers(args, TaskKind::TestL1Distributed));
    }

    // Long-form rebuild without -b
    if args.rebuild {
        let kind = if args.delete {
            TaskKind::BuildAll
        } else {
            TaskKind::Rebuild
        };
        return Ok(if args.log {
            Intent::Tail(kind)
        } else {
            Intent::Start(kind)
        });
    }

    Ok(Intent::ShowHelp)
}

fn route_modifiers(args: &Args, kind: TaskKind) -> Intent {
    if args.log {
        Intent::Tail(kind)
    } else if args.kill {
        Intent::Kill(kind)
    } else {
        Intent::Start(kind)
    }
}

fn build_supervisor(config: &TeConfig) -> te_foundation::Result<TaskSupervisor> {
    let store = TaskStore::user()?;
    let builder = TeCommandBuilder::new(config.clone());
    let precheck = TePrecheck::new(config.clone());
    Ok(
        TaskSupervisor::new(store, Arc::new(builder), Arc::new(precheck))
            .with_grace(Duration::from_secs(config.stop_grace_secs)),
    )
}

async fn start_task(
    supervisor: &TaskSupervisor,
    config: &TeConfig,
    kind: TaskKind,
    args: &Args,
) -> i32 {
    // `-b -t -d`: wipe the C++ build tree before rebuilding it
    if kind == TaskKind::BuildCppTests && args.delete {
        println!("   {}├─ Step:{} Cleaning C++ build artifacts...", GREY, RESET);
        if let Err(e) = clean_cpp_artifacts(config) {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            return EXIT_FAILED;
        }
    }

    match supervisor.start(kind, &args.extra).await {
        Ok(record) => {
            output::print_started(&record);
            EXIT_OK
        }
        Err(Error::Conflict(detail)) => {
            let running = supervisor
                .status_all()
                .unwrap_or_default()
                .into_iter()
                .find(|r| r.kind.conflicts_with(kind) && r.status.is_active());
            output::print_conflict(running.as_ref(), &detail);
            EXIT_STILL_RUNNING
        }
        Err(Error::MissingDependency { tool, detail }) => {
            println!("{}❌ Missing dependency: {} ({}){}", RED, tool, detail, RESET);
            println!("   {}└─ Run:{} te --check-env", GREY, RESET);
            EXIT_FAILED
        }
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            EXIT_FAILED
        }
    }
}

async fn tail_log(supervisor: &TaskSupervisor, kind: TaskKind) -> i32 {
    let mut follower = match supervisor.follow(kind, TAIL_LINES).await {
        Ok(follower) => follower,
        Err(Error::NotFound(detail)) => {
            println!("{}❌ Log not available:{} {}", RED, RESET, detail);
            println!("   {}(Task might not have started yet){}", GREY, RESET);
            return EXIT_NO_TASK;
        }
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            return EXIT_FAILED;
        }
    };

    println!(
        "{}📄 Tailing log for {}{} (Ctrl-C to stop)",
        GREEN,
        kind.display_name(),
        RESET
    );

    // Cancelling only stops reading; the task itself keeps running
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("{}Log tail stopped by user.{}", GREY, RESET);
                return EXIT_OK;
            }
            line = follower.next_line() => {
                match line {
                    Ok(line) => println!("{}", line),
                    Err(e) => {
                        println!("{}❌ Error: {}{}", RED, e, RESET);
                        return EXIT_FAILED;
                    }
                }
            }
        }
    }
}

async fn kill_task(supervisor: &TaskSupervisor, kind: TaskKind) -> i32 {
    let record = match supervisor.status(kind) {
        Ok(Some(record)) if record.status.is_running() => record,
        Ok(_) => {
            println!(
                "{}⚠️  No {} running.{}",
                YELLOW,
                kind.display_name(),
                RESET
            );
            return EXIT_NO_TASK;
        }
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            return EXIT_FAILED;
        }
    };

    confirm_and_stop(supervisor, record).await
}

/// `-b -k`: any running task of the build group is the target
async fn kill_build_group(supervisor: &TaskSupervisor) -> i32 {
    let running = match supervisor.status_all() {
        Ok(records) => records
            .into_iter()
            .find(|r| r.kind.is_build() && r.status.is_running()),
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            return EXIT_FAILED;
        }
    };

    match running {
        Some(record) => confirm_and_stop(supervisor, record).await,
        None => {
            println!("{}⚠️  No build task running.{}", YELLOW, RESET);
            EXIT_NO_TASK
        }
    }
}

async fn confirm_and_stop(supervisor: &TaskSupervisor, record: te_task::TaskRecord) -> i32 {
    println!(
        "{}⚠️  {} is running:{}",
        YELLOW,
        record.kind.display_name(),
        RESET
    );
    if let Some(pid) = record.pid {
        println!("   {}├─ PID:{}     {}{}{}", GREY, RESET, RED, pid, RESET);
    }
    println!(
        "   {}├─ Started:{} {}{}{}",
        GREY,
        RESET,
        CYAN,
        record.started_at.format("%Y-%m-%d %H:%M:%S"),
        RESET
    );
    println!(
        "   {}└─ Elapsed:{} {}{}{}",
        GREY,
        RESET,
        CYAN,
        output::format_elapsed(&record),
        RESET
    );
    println!();

    if !confirm(&format!("   {}Kill this task? [y/N]:{} ", RED, RESET)) {
        println!("{}ℹ️  Cancelled.{}", CYAN, RESET);
        return EXIT_FAILED;
    }

    match supervisor.stop(record.kind).await {
        Ok(stopped) => {
            println!(
                "{}✅ {} killed.{}",
                GREEN,
                stopped.kind.display_name(),
                RESET
            );
            EXIT_OK
        }
        Err(Error::NotRunning(detail)) => {
            println!("{}⚠️  {}{}", YELLOW, detail, RESET);
            EXIT_NO_TASK
        }
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            EXIT_FAILED
        }
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
    let mut choice = String::new();
    if std::io::stdin().read_line(&mut choice).is_err() {
        return false;
    }
    matches!(choice.trim(), "y" | "Y")
}

fn show_processes(supervisor: &TaskSupervisor) -> i32 {
    println!("{}📋 Running TE Tasks:{}", GREEN, RESET);
    println!();

    let records = match supervisor.status_all() {
        Ok(records) => records,
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            return EXIT_FAILED;
        }
    };

    let mut found = false;
    for record in &records {
        match record.status {
            TaskStatus::Running | TaskStatus::Pending => {
                found = true;
                output::print_task_block(record);
            }
            TaskStatus::Unknown => {
                found = true;
                output::print_unknown_warning(record);
            }
            _ => {}
        }
    }

    if !found {
        println!("   {}No running tasks found.{}", GREY, RESET);
    }
    EXIT_OK
}

fn clear_history(supervisor: &TaskSupervisor, args: &Args) -> i32 {
    let kind = resolve_intent(args).ok().and_then(|intent| match intent {
        Intent::Start(kind) | Intent::Tail(kind) | Intent::Kill(kind) => Some(kind),
        _ => None,
    });

    match supervisor.clean(kind) {
        Ok(removed) => {
            println!(
                "{}🧹 Removed {} finished task record(s).{}",
                GREEN, removed, RESET
            );
            EXIT_OK
        }
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            EXIT_FAILED
        }
    }
}

fn reconcile(supervisor: &TaskSupervisor, args: &Args) -> i32 {
    let kind = match resolve_intent(args) {
        Ok(Intent::Start(kind)) | Ok(Intent::Tail(kind)) | Ok(Intent::Kill(kind)) => kind,
        _ => {
            println!(
                "{}❌ --reconcile needs a task selection (e.g. te --reconcile -b -c){}",
                RED, RESET
            );
            return EXIT_FAILED;
        }
    };

    match supervisor.reconcile(kind) {
        Ok(record) if record.status == TaskStatus::Killed => {
            println!(
                "{}✅ {} reconciled as killed.{}",
                GREEN,
                record.kind.display_name(),
                RESET
            );
            EXIT_OK
        }
        Ok(record) => {
            println!(
                "{}ℹ️  {} is {} - nothing to reconcile.{}",
                CYAN,
                record.kind.display_name(),
                record.status,
                RESET
            );
            EXIT_OK
        }
        Err(Error::NotFound(_)) => {
            println!("{}⚠️  No task record for {}.{}", YELLOW, kind, RESET);
            EXIT_NO_TASK
        }
        Err(e) => {
            println!("{}❌ Error: {}{}", RED, e, RESET);
            EXIT_FAILED
        }
    }
}

async fn check_env(config: &TeConfig) -> i32 {
    let report = EnvironmentReport::gather(config).await;

    println!("{}", "=".repeat(60));
    println!("Environment Dependency Report");
    println!("{}", "=".repeat(60));

    for check in &report.checks {
        let icon = if check.exists {
            format!("{}✓{}", GREEN, RESET)
        } else if check.required {
            format!("{}✗{}", RED, RESET)
        } else {
            format!("{}⚠{}", YELLOW, RESET)
        };
        let requirement = if check.required {
            "[required]"
        } else {
            "[optional]"
        };
        let detail = check
            .version
            .clone()
            .or_else(|| check.path.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "not found".to_string());
        println!("{} {} {:20} {}", icon, requirement, check.name, detail);
    }

    println!("{}", "=".repeat(60));
    if report.all_ok() {
        println!("{}✓ All required dependencies are ready{}", GREEN, RESET);
        EXIT_OK
    } else {
        let missing: Vec<_> = report.failures().map(|c| c.name.clone()).collect();
        println!(
            "{}✗ Missing {} required dependencies: {}{}",
            RED,
            missing.len(),
            missing.join(", "),
            RESET
        );
        EXIT_FAILED
    }
}
