//! Task kinds - the fixed catalogue of build and test operations

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use te_foundation::Error;

/// One long-running operation the CLI can supervise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Incremental Python build (`pip install -e .`)
    BuildPythonIncremental,

    /// Clean Python build (wipes `build/` and egg-info first)
    BuildPythonClean,

    /// C++ test build (`cmake -GNinja` + `cmake --build`)
    BuildCppTests,

    /// Touch key sources, then Python + C++ incremental builds
    Rebuild,

    /// Full clean followed by Python and C++ builds
    BuildAll,

    /// L0 C++ unit test suite
    TestL0Cpp,

    /// L0 PyTorch unit test suite
    TestL0Pytorch,

    /// L1 PyTorch distributed test suite
    TestL1Distributed,
}

impl TaskKind {
    /// Every kind, build variants first
    pub const ALL: [TaskKind; 8] = [
        TaskKind::BuildPythonIncremental,
        TaskKind::BuildPythonClean,
        TaskKind::BuildCppTests,
        TaskKind::Rebuild,
        TaskKind::BuildAll,
        TaskKind::TestL0Cpp,
        TaskKind::TestL0Pytorch,
        TaskKind::TestL1Distributed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::BuildPythonIncremental => "build-python-incremental",
            TaskKind::BuildPythonClean => "build-python-clean",
            TaskKind::BuildCppTests => "build-cpp-tests",
            TaskKind::Rebuild => "rebuild",
            TaskKind::BuildAll => "build-all",
            TaskKind::TestL0Cpp => "test-l0-cpp",
            TaskKind::TestL0Pytorch => "test-l0-pytorch",
            TaskKind::TestL1Distributed => "test-l1-distributed",
        }
    }

    /// Human-facing name for status output
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskKind::BuildPythonIncremental => "Python Build",
            TaskKind::BuildPythonClean => "Python Clean Build",
            TaskKind::BuildCppTests => "C++ Build",
            TaskKind::Rebuild => "Rebuild",
            TaskKind::BuildAll => "Full Build",
            TaskKind::TestL0Cpp => "L0 CPP Test",
            TaskKind::TestL0Pytorch => "L0 Torch Test",
            TaskKind::TestL1Distributed => "L1 Torch Test",
        }
    }

    /// All build variants compile into the same tree, so they exclude each
    /// other. Test suites only exclude themselves.
    pub fn conflict_group(&self) -> &'static str {
        match self {
            TaskKind::BuildPythonIncremental
            | TaskKind::BuildPythonClean
            | TaskKind::BuildCppTests
            | TaskKind::Rebuild
            | TaskKind::BuildAll => "build",
            TaskKind::TestL0Cpp => "test-l0-cpp",
            TaskKind::TestL0Pytorch => "test-l0-pytorch",
            TaskKind::TestL1Distributed => "test-l1-distributed",
        }
    }

    pub fn conflicts_with(&self, other: TaskKind) -> bool {
        self.conflict_group() == other.conflict_group()
    }

    pub fn is_build(&self) -> bool {
        self.conflict_group() == "build"
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnsupportedKind(s.to_string()))
    }
}
