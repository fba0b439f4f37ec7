//! Environment dependency detection
//!
//! Pre-flight checks for the external tools and paths the build/test
//! commands rely on. A failed required check blocks launching.

use crate::config::TeConfig;
use std::path::PathBuf;
use std::time::Duration;

/// How long a `--version` probe may take before it is abandoned
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a single dependency check
#[derive(Debug, Clone)]
pub struct ToolCheck {
    /// Display name ("CMake", "TE_PATH", ...)
    pub name: String,

    /// Whether the dependency is required for launching tasks
    pub required: bool,

    /// Whether the dependency was found
    pub exists: bool,

    /// Resolved path, when found
    pub path: Option<PathBuf>,

    /// First line of `--version` output, when obtainable
    pub version: Option<String>,
}

impl ToolCheck {
    /// A missing optional dependency still passes
    pub fn is_ok(&self) -> bool {
        self.exists || !self.required
    }
}

/// Aggregated environment report
#[derive(Debug, Clone)]
pub struct EnvironmentReport {
    pub checks: Vec<ToolCheck>,
}

impl EnvironmentReport {
    /// Run every path and tool check against the given config
    pub async fn gather(config: &TeConfig) -> Self {
        let mut checks = Vec::new();

        checks.push(check_dir("TE_PATH", &config.te_path, true));
        checks.push(check_dir("WORK_SPACE", &config.work_space, true));
        checks.push(check_file("init script", &config.init_script(), true));
        checks.push(check_dir("DTK", &config.dtk_base, true));

        checks.push(check_tool("CMake", "cmake", true).await);
        checks.push(check_tool("Ninja", "ninja", false).await);
        checks.push(check_tool("Python3", "python3", true).await);
        checks.push(check_tool("pip", "pip", true).await);

        Self { checks }
    }

    /// Whether every required dependency is present
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(ToolCheck::is_ok)
    }

    /// Required checks that failed
    pub fn failures(&self) -> impl Iterator<Item = &ToolCheck> {
        self.checks.iter().filter(|c| !c.is_ok())
    }
}

fn check_dir(name: &str, path: &std::path::Path, required: bool) -> ToolCheck {
    let exists = path.is_dir();
    tracing::debug!(name, exists, path = %path.display(), "directory check");
    ToolCheck {
        name: name.to_string(),
        required,
        exists,
        path: Some(path.to_path_buf()),
        version: None,
    }
}

fn check_file(name: &str, path: &std::path::Path, required: bool) -> ToolCheck {
    let exists = path.is_file();
    tracing::debug!(name, exists, path = %path.display(), "file check");
    ToolCheck {
        name: name.to_string(),
        required,
        exists,
        path: Some(path.to_path_buf()),
        version: None,
    }
}

async fn check_tool(name: &str, binary: &str, required: bool) -> ToolCheck {
    let Ok(path) = which::which(binary) else {
        tracing::debug!(name, binary, "tool not on PATH");
        return ToolCheck {
            name: name.to_string(),
            required,
            exists: false,
            path: None,
            version: None,
        };
    };

    let version = probe_version(&path).await;
    ToolCheck {
        name: name.to_string(),
        required,
        exists: true,
        path: Some(path),
        version,
    }
}

/// Run `<binary> --version` and keep the first output line
async fn probe_version(binary: &std::path::Path) -> Option<String> {
    let probe = tokio::process::Command::new(binary)
        .arg("--version")
        .output();

    match tokio::time::timeout(VERSION_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout.lines().next().map(|l| l.trim().to_string())
        }
        Ok(Err(e)) => {
            tracing::debug!(binary = %binary.display(), error = %e, "version probe failed");
            None
        }
        Err(_) => {
            tracing::debug!(binary = %binary.display(), "version probe timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_missing_tool_passes() {
        let check = ToolCheck {
            name: "Ninja".to_string(),
            required: false,
            exists: false,
            path: None,
            version: None,
        };
        assert!(check.is_ok());
    }

    #[test]
    fn test_required_missing_tool_fails() {
        let check = ToolCheck {
            name: "CMake".to_string(),
            required: true,
            exists: false,
            path: None,
            version: None,
        };
        assert!(!check.is_ok());
    }

    #[tokio::test]
    async fn test_gather_reports_every_check() {
        let config = TeConfig::default();
        let report = EnvironmentReport::gather(&config).await;
        // 4 path checks + 4 tool checks
        assert_eq!(report.checks.len(), 8);
    }

    #[tokio::test]
    async fn test_probe_version_of_missing_binary() {
        let version = probe_version(std::path::Path::new("/nonexistent/binary")).await;
        assert!(version.is_none());
    }
}
