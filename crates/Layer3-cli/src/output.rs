//! Console output helpers - tree-style task blocks and ANSI palette

use chrono::Utc;
use te_task::{TaskKind, TaskRecord, TaskStatus};

pub const RED: &str = "\x1b[1;31m";
pub const GREEN: &str = "\x1b[1;32m";
pub const YELLOW: &str = "\x1b[1;33m";
pub const BLUE: &str = "\x1b[1;34m";
pub const CYAN: &str = "\x1b[1;36m";
pub const GREY: &str = "\x1b[0;37m";
pub const RESET: &str = "\x1b[0m";

/// `-l` invocation that tails this kind's log
pub fn view_hint(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::BuildPythonIncremental => "te -b -c -l",
        TaskKind::BuildPythonClean => "te -b -c -d -l",
        TaskKind::BuildCppTests => "te -b -t -l",
        TaskKind::Rebuild => "te -b -r -l",
        TaskKind::BuildAll => "te -b -r -d -l",
        TaskKind::TestL0Cpp => "te -0 -c -l",
        TaskKind::TestL0Pytorch => "te -0 -t -l",
        TaskKind::TestL1Distributed => "te -1 -t -l",
    }
}

/// `-k` invocation that stops this kind
pub fn kill_hint(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::BuildPythonIncremental
        | TaskKind::BuildPythonClean
        | TaskKind::BuildCppTests
        | TaskKind::Rebuild
        | TaskKind::BuildAll => "te -b -k",
        TaskKind::TestL0Cpp => "te -0 -c -k",
        TaskKind::TestL0Pytorch => "te -0 -t -k",
        TaskKind::TestL1Distributed => "te -1 -t -k",
    }
}

/// Seconds since the record started, as `3m 12s` style text
pub fn format_elapsed(record: &TaskRecord) -> String {
    let secs = (Utc::now() - record.started_at).num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Success banner after a launch
pub fn print_started(record: &TaskRecord) {
    println!(
        "{}✅ {} Started (Background){}",
        GREEN,
        record.kind.display_name(),
        RESET
    );
    println!(
        "   {}├─ Log:{}   {}{}{}",
        GREY,
        RESET,
        BLUE,
        record.log_path.display(),
        RESET
    );
    println!("   {}├─ View:{}  {}", GREY, RESET, view_hint(record.kind));
    println!(
        "   {}└─ Kill:{}  {}{}{}",
        GREY,
        RESET,
        YELLOW,
        kill_hint(record.kind),
        RESET
    );
}

/// Conflict banner when the kind is already occupied
pub fn print_conflict(running: Option<&TaskRecord>, detail: &str) {
    println!("{}❌ Task Already Running!{}", RED, RESET);
    println!("   {}├─ Task:{}  {}{}{}", GREY, RESET, CYAN, detail, RESET);
    if let Some(record) = running {
        if let Some(pid) = record.pid {
            println!("   {}├─ PID:{}   {}{}{}", GREY, RESET, RED, pid, RESET);
        }
        println!(
            "   {}├─ Log:{}   {}{}{}",
            GREY,
            RESET,
            BLUE,
            record.log_path.display(),
            RESET
        );
        println!("   {}├─ View:{}  {}", GREY, RESET, view_hint(record.kind));
        println!(
            "   {}└─ Kill:{}  {}{}{}",
            GREY,
            RESET,
            YELLOW,
            kill_hint(record.kind),
            RESET
        );
    } else {
        println!("   {}└─ Kill:{}  {}te -b -k{}", GREY, RESET, YELLOW, RESET);
    }
}

/// One block per task for the `-p` listing
pub fn print_task_block(record: &TaskRecord) {
    println!(
        "{}[{}]{} {}{}{}",
        CYAN,
        record.kind.display_name(),
        RESET,
        status_color(record.status),
        record.status,
        RESET
    );
    if let Some(pid) = record.pid {
        println!("   {}├─ PID:{}     {}{}{}", GREY, RESET, RED, pid, RESET);
    }
    println!(
        "   {}├─ Elapsed:{} {}{}{}",
        GREY,
        RESET,
        CYAN,
        format_elapsed(record),
        RESET
    );
    if let Some(code) = record.exit_code {
        println!("   {}├─ Exit:{}    {}", GREY, RESET, code);
    }
    println!("   {}├─ View:{}    {}", GREY, RESET, view_hint(record.kind));
    println!(
        "   {}└─ Kill:{}    {}{}{}",
        GREY,
        RESET,
        YELLOW,
        kill_hint(record.kind),
        RESET
    );
    println!();
}

fn status_color(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running | TaskStatus::Completed => GREEN,
        TaskStatus::Pending => CYAN,
        TaskStatus::Failed | TaskStatus::Killed => RED,
        TaskStatus::Unknown => YELLOW,
    }
}

/// Warning block for records needing operator attention
pub fn print_unknown_warning(record: &TaskRecord) {
    println!(
        "{}⚠️  {} liveness could not be proven{}",
        YELLOW,
        record.kind.display_name(),
        RESET
    );
    println!("   {}├─ Record:{} {}", GREY, RESET, record.id);
    println!(
        "   {}└─ Check the log, then reconcile:{} {}",
        GREY,
        RESET,
        view_hint(record.kind).replace(" -l", " --reconcile")
    );
}

/// Bytes as a human-readable size
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}
