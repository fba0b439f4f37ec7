//! TE Config - repository paths and supervision settings
//!
//! Resolution order per field: environment variable > config file > default,
//! mirroring how the tool is used inside build containers where `TE_PATH` is
//! usually exported by the shell profile.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name inside the state directory
pub const TE_CONFIG_FILE: &str = "config.json";

/// Default DTK install prefix
const DTK_BASE_DEFAULT: &str = "/opt/dtk-25.04.2";

/// Newer DTK prefix, preferred when present
const DTK_26_PATH: &str = "/opt/dtk-26.04";

/// TE CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeConfig {
    /// Repository root the build/test commands run against
    pub te_path: PathBuf,

    /// Workspace directory (parent checkout area, cwd for test suites)
    pub work_space: PathBuf,

    /// Shell snippet sourced at the top of every generated script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub te_init_script: Option<PathBuf>,

    /// DTK toolkit prefix
    pub dtk_base: PathBuf,

    /// Seconds a graceful stop waits before escalating to SIGKILL
    pub stop_grace_secs: u64,
}

impl Default for TeConfig {
    fn default() -> Self {
        Self {
            te_path: PathBuf::from("/workspace/TransformerEngine"),
            work_space: PathBuf::from("/workspace"),
            te_init_script: None,
            dtk_base: PathBuf::from(DTK_BASE_DEFAULT),
            stop_grace_secs: 10,
        }
    }
}

impl TeConfig {
    /// Load from the user config file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let store = JsonStore::user()?;
        let mut config: Self = store.load_or_default(TE_CONFIG_FILE);
        config.apply_env();
        config.detect_dtk();
        Ok(config)
    }

    /// Save to the user config file (env-derived values included as-is)
    pub fn save(&self) -> Result<()> {
        let store = JsonStore::user()?;
        store.save(TE_CONFIG_FILE, self)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("TE_PATH") {
            self.te_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("WORK_SPACE") {
            self.work_space = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TE_INIT_SCRIPT") {
            if !path.is_empty() {
                self.te_init_script = Some(PathBuf::from(path));
            }
        }
    }

    /// Prefer the newer DTK install when both are present
    fn detect_dtk(&mut self) {
        let dtk_26 = Path::new(DTK_26_PATH);
        if dtk_26.is_dir() {
            tracing::debug!("detected DTK 26.04 at {}", dtk_26.display());
            self.dtk_base = dtk_26.to_path_buf();
        }
    }

    /// cmake module suffix differs between DTK generations
    pub fn dtk_cmake_suffix(&self) -> &'static str {
        if self.dtk_base == Path::new(DTK_26_PATH) {
            "dcc/comgr/lib/cmake/amd_comgr"
        } else {
            "lib64/cmake/amd_comgr"
        }
    }

    /// Init script: explicit setting, or `te_init.sh` in the state directory
    pub fn init_script(&self) -> PathBuf {
        if let Some(script) = &self.te_init_script {
            return script.clone();
        }
        JsonStore::user()
            .map(|s| s.base_dir().join("te_init.sh"))
            .unwrap_or_else(|_| PathBuf::from("te_init.sh"))
    }

    /// Validate paths this config points at
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.te_path.is_dir() {
            errors.push(format!("TE_PATH does not exist: {}", self.te_path.display()));
        }
        if !self.work_space.is_dir() {
            errors.push(format!(
                "WORK_SPACE does not exist: {}",
                self.work_space.display()
            ));
        }
        let init = self.init_script();
        if !init.is_file() {
            errors.push(format!("init script not found: {}", init.display()));
        }
        errors
    }
}
