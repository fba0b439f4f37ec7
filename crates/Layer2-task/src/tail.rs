//! Log tailer - bounded tails and follow mode over task log files
//!
//! The log is single-writer (the detached child) and multi-reader; readers
//! only ever open it for reading and tolerate concurrent appends. Right
//! after a launch the file may not exist yet, so both entry points wait
//! briefly instead of failing.

use crate::record::TaskRecord;
use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use te_foundation::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// How long to wait for a freshly launched task's log to appear
const FILE_WAIT: Duration = Duration::from_secs(2);

/// Poll step while waiting for the file
const FILE_WAIT_STEP: Duration = Duration::from_millis(100);

/// Poll interval for appended content in follow mode
const FOLLOW_POLL: Duration = Duration::from_millis(250);

/// Block size for the backward suffix scan
const SCAN_CHUNK: u64 = 8192;

/// Read access to task logs
#[derive(Debug, Clone, Copy)]
pub struct LogTailer;

impl LogTailer {
    /// The last `lines` lines currently in the record's log (fewer when the
    /// file is shorter). Finite snapshot; concurrent appends after the call
    /// starts are not included.
    pub async fn read_tail(record: &TaskRecord, lines: usize) -> Result<Vec<String>> {
        wait_for_file(&record.log_path).await?;
        let end = std::fs::metadata(&record.log_path)?.len();
        last_lines_within(&record.log_path, lines, end)
    }

    /// Follow the record's log: the last `lines` lines first, then every
    /// appended line, indefinitely. Cancellation is the caller's concern and
    /// never affects the child process or the record.
    pub async fn follow(record: &TaskRecord, lines: usize) -> Result<LogFollower> {
        wait_for_file(&record.log_path).await?;
        let end = std::fs::metadata(&record.log_path)?.len();
        let initial = last_lines_within(&record.log_path, lines, end)?;

        let mut file = tokio::fs::File::open(&record.log_path).await?;
        file.seek(SeekFrom::Start(end)).await?;

        Ok(LogFollower {
            path: record.log_path.clone(),
            file,
            offset: end,
            partial: Vec::new(),
            pending: initial.into(),
        })
    }
}

/// Lazy line stream over a growing log file
pub struct LogFollower {
    path: PathBuf,
    file: tokio::fs::File,
    offset: u64,
    partial: Vec<u8>,
    pending: VecDeque<String>,
}

impl LogFollower {
    /// Next line, waiting for new content as long as it takes
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(line);
            }

            let len = tokio::fs::metadata(&self.path).await?.len();
            if len < self.offset {
                // Truncated under us (fresh relaunch of the kind would use a
                // new file, but be defensive about manual edits): restart.
                self.file = tokio::fs::File::open(&self.path).await?;
                self.offset = 0;
                self.partial.clear();
            }

            if len > self.offset {
                self.drain_new_bytes(len).await?;
                continue;
            }

            tokio::time::sleep(FOLLOW_POLL).await;
        }
    }

    async fn drain_new_bytes(&mut self, len: u64) -> Result<()> {
        // Re-seek every time: callers may drop a pending `next_line` future
        // (Ctrl-C select arms), which can leave the cursor mid-read.
        self.file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = vec![0u8; (len - self.offset) as usize];
        self.file.read_exact(&mut buf).await?;
        self.offset = len;

        for byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.partial).into_owned();
                self.pending.push_back(line);
                self.partial.clear();
            } else {
                self.partial.push(byte);
            }
        }
        Ok(())
    }
}

/// Wait briefly for the log file to exist (launch race)
async fn wait_for_file(path: &Path) -> Result<()> {
    let deadline = std::time::Instant::now() + FILE_WAIT;
    while !path.exists() {
        if std::time::Instant::now() >= deadline {
            return Err(Error::NotFound(format!(
                "log file {} (task may not have started yet)",
                path.display()
            )));
        }
        tokio::time::sleep(FILE_WAIT_STEP).await;
    }
    Ok(())
}

/// Exact last-`n` suffix of the file's first `end` bytes, scanning backward
/// in blocks so large build logs are never read whole.
fn last_lines_within(path: &Path, n: usize, end: u64) -> Result<Vec<String>> {
    if n == 0 || end == 0 {
        return Ok(Vec::new());
    }

    let mut file = std::fs::File::open(path)?;
    let mut buf: Vec<u8> = Vec::new();
    let mut pos = end;
    let mut newlines = 0usize;

    while pos > 0 {
        let take = SCAN_CHUNK.min(pos);
        pos -= take;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; take as usize];
        file.read_exact(&mut chunk)?;

        newlines += chunk.iter().filter(|b| **b == b'\n').count();
        chunk.extend_from_slice(&buf);
        buf = chunk;

        // n + 1 newlines guarantee n complete lines are buffered
        if newlines > n {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].to_vec())
}
