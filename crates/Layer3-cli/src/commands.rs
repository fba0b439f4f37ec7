//! Build/test command construction
//!
//! Generates the bash scripts behind every task kind and implements the
//! launch precheck. Scripts are self-contained: they source the init script,
//! export the build environment, run the work, and print a duration footer
//! the user sees when tailing the log.

use async_trait::async_trait;
use te_foundation::{EnvironmentReport, Error, Result, TeConfig, ToolCheck};
use te_task::{CommandBuilder, CommandPlan, Precheck, TaskKind};

/// Build environment shared by every build script
const COMMON_ENV_VARS: &str = "\
export NVTE_BUILD_SUPPRESS_UNUSED_WARNING=1
export NVTE_BUILD_SUPPRESS_RETURN_TYPE_WARNING=1
export NVTE_BUILD_SUPPRESS_SIGN_COMPARE_WARNING=1
export NVTE_FRAMEWORK=pytorch
export NVTE_USE_ROCM=1
export NVTE_USE_HIPBLASLT=1
export NVTE_USE_ROCBLAS=1
export NVTE_UB_WITH_MPI=0
export CXX=hipcc
export VERBOSE=1";

/// Conda activation for test suites; a no-op when the env is absent
const CONDA_ACTIVATION: &str = "\
if [ -f '/opt/miniconda3/etc/profile.d/conda.sh' ]; then
    source /opt/miniconda3/etc/profile.d/conda.sh
    if conda env list | grep -q '^te27 '; then conda activate te27; fi
fi";

/// Script builder for the TE repository
pub struct TeCommandBuilder {
    config: TeConfig,
}

impl TeCommandBuilder {
    pub fn new(config: TeConfig) -> Self {
        Self { config }
    }

    fn dtk_config(&self) -> String {
        format!(
            "export CMAKE_PREFIX_PATH=\"{}/{}\"\nexport MPI_HOME=/opt/mpi",
            self.config.dtk_base.display(),
            self.config.dtk_cmake_suffix()
        )
    }

    /// Common header: timer start, init script sourcing, DTK and build env
    fn script_header(&self) -> String {
        format!(
            r#"start_time=$(date +%s)

INIT_SCRIPT="{init}"

if [ -f "$INIT_SCRIPT" ]; then
    source "$INIT_SCRIPT"
else
    echo "Error: TE init script not found at: $INIT_SCRIPT"
    exit 1
fi

{dtk}

{env}"#,
            init = self.config.init_script().display(),
            dtk = self.dtk_config(),
            env = COMMON_ENV_VARS,
        )
    }

    fn python_build_script(&self, clean: bool) -> String {
        let te_path = self.config.te_path.display();
        let clean_cmd = if clean {
            format!("cd {} && rm -rf build transformer_engine.egg-info/", te_path)
        } else {
            format!("cd {} || exit 2", te_path)
        };
        let finish_label = if clean {
            "Python Clean Build Completed"
        } else {
            "Python Build Completed"
        };

        format!(
            r#"{header}

{clean_cmd}

export PYTHONPATH="{te_path}/3rdparty/hipify_torch:$PYTHONPATH"

python3 -m pip install -e . -vv --no-build-isolation 2>&1

end_time=$(date +%s)
echo ""
echo "{finish_label} (Duration: $((end_time - start_time))s)"
"#,
            header = self.script_header(),
        )
    }

    fn cpp_build_script(&self) -> String {
        let te_path = self.config.te_path.display();
        format!(
            r#"{header}

cd {te_path}/tests/cpp || exit 2

export PYTHONPATH={te_path}/3rdparty/hipify_torch:$PYTHONPATH

cmake -GNinja -Bbuild . 2>&1
cmake --build build 2>&1

end_time=$(date +%s)
echo ""
echo "C++ Build Completed (Duration: $((end_time - start_time))s)"
"#,
            header = self.script_header(),
        )
    }

    fn full_build_script(&self) -> String {
        let te_path = self.config.te_path.display();
        format!(
            r#"{header}

echo "Full Clean & Build Started"

echo "Cleaning up..."
cd "{te_path}" || exit 2
rm -rf build transformer_engine.egg-info/ tests/cpp/build dist
find . -name "*.so" -type f -delete
find . -name "__pycache__" -type d -exec rm -rf {{}} +

echo "Building Python..."
export PYTHONPATH="{te_path}/3rdparty/hipify_torch:$PYTHONPATH"
python3 -m pip install -e . -vv --no-build-isolation 2>&1
py_status=$?

if [ $py_status -eq 0 ]; then
    echo "Building C++ Tests..."
    cd "{te_path}/tests/cpp" || exit 2
    cmake -GNinja -Bbuild . 2>&1
    cmake --build build 2>&1
else
    echo "Python Build Failed"
    exit $py_status
fi

end_time=$(date +%s)
echo ""
echo "Full Build Completed (Duration: $((end_time - start_time))s)"
"#,
            header = self.script_header(),
        )
    }

    /// Incremental rebuild: touch the pivot sources (plus any user-supplied
    /// files) so the build system picks them up, then build Python and C++.
    fn rebuild_script(&self, extra_files: &[String]) -> Result<String> {
        let te_path = self.config.te_path.display();
        let mut quoted = Vec::with_capacity(extra_files.len());
        for file in extra_files {
            let q = shlex::try_quote(file)
                .map_err(|_| Error::Config(format!("unquotable rebuild argument: {}", file)))?;
            quoted.push(q.into_owned());
        }
        let extra = quoted.join(" ");

        Ok(format!(
            r#"{header}

cu_files=("{te_path}/transformer_engine/common/swizzle/swizzle.cu" {extra})
for cu_file in "${{cu_files[@]}}"; do
    [[ -z "$cu_file" ]] && continue
    if [ -f "$cu_file" ]; then
        touch -c "$cu_file"
        echo "Touched: $cu_file"
    fi
done

echo "=== [Phase 1] Python Incremental Build ==="
cd "{te_path}" || exit 1
python3 -m pip install --no-build-isolation -v -e . 2>&1
py_status=$?

if [ $py_status -eq 0 ]; then
    echo "=== [Phase 2] C++ Tests Incremental Build ==="
    cd "{te_path}/tests/cpp" || exit 1
    cmake -B build -G Ninja . 2>&1
    cmake --build build 2>&1
else
    echo "Python build failed."
    exit $py_status
fi

end_time=$(date +%s)
echo ""
echo "Rebuild Completed (Duration: $((end_time - start_time))s)"
"#,
            header = self.script_header(),
        ))
    }

    fn test_script(&self, suite: &str) -> String {
        format!(
            "{}\nbash {}/qa/{}/test.sh\n",
            CONDA_ACTIVATION,
            self.config.te_path.display(),
            suite
        )
    }
}

impl CommandBuilder for TeCommandBuilder {
    fn build(&self, kind: TaskKind, extra_args: &[String]) -> Result<CommandPlan> {
        let script = match kind {
            TaskKind::BuildPythonIncremental => self.python_build_script(false),
            TaskKind::BuildPythonClean => self.python_build_script(true),
            TaskKind::BuildCppTests => self.cpp_build_script(),
            TaskKind::Rebuild => self.rebuild_script(extra_args)?,
            TaskKind::BuildAll => self.full_build_script(),
            TaskKind::TestL0Cpp => self.test_script("L0_cppunittest"),
            TaskKind::TestL0Pytorch => self.test_script("L0_pytorch_unittest"),
            TaskKind::TestL1Distributed => self.test_script("L1_pytorch_distributed_unittest"),
        };

        // Builds run inside the repository, test suites from the workspace
        let workdir = if kind.is_build() {
            self.config.te_path.clone()
        } else {
            self.config.work_space.clone()
        };

        Ok(CommandPlan::new(
            vec!["bash".to_string(), "-c".to_string(), script],
            workdir,
        ))
    }
}

/// Remove the C++ test build tree (the `-b -t -d` pre-step)
pub fn clean_cpp_artifacts(config: &TeConfig) -> Result<()> {
    let build_dir = config.te_path.join("tests/cpp/build");
    if build_dir.is_dir() {
        tracing::info!(dir = %build_dir.display(), "removing C++ build artifacts");
        std::fs::remove_dir_all(&build_dir)?;
    }
    Ok(())
}

/// Launch precheck backed by the environment report
pub struct TePrecheck {
    config: TeConfig,
}

impl TePrecheck {
    pub fn new(config: TeConfig) -> Self {
        Self { config }
    }

    /// Build-only dependencies are not required to run a test suite
    fn relevant(kind: TaskKind, check: &ToolCheck) -> bool {
        match check.name.as_str() {
            "CMake" | "Ninja" | "pip" | "DTK" | "init script" => kind.is_build(),
            _ => true,
        }
    }
}

#[async_trait]
impl Precheck for TePrecheck {
    async fn precheck(&self, kind: TaskKind) -> Result<()> {
        let report = EnvironmentReport::gather(&self.config).await;
        if let Some(failed) = report.failures().find(|c| Self::relevant(kind, c)) {
            let detail = match &failed.path {
                Some(path) => format!("not found at {}", path.display()),
                None => "not found on PATH".to_string(),
            };
            return Err(Error::missing_dependency(failed.name.clone(), detail));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn builder() -> TeCommandBuilder {
        let config = TeConfig {
            te_path: PathBuf::from("/src/te"),
            work_space: PathBuf::from("/src"),
            te_init_script: Some(PathBuf::from("/src/te_init.sh")),
            ..TeConfig::default()
        };
        TeCommandBuilder::new(config)
    }

    fn script_for(kind: TaskKind, extra: &[String]) -> String {
        let plan = builder().build(kind, extra).unwrap();
        assert_eq!(plan.argv[0], "bash");
        assert_eq!(plan.argv[1], "-c");
        plan.argv[2].clone()
    }

    #[test]
    fn test_incremental_python_build_does_not_clean() {
        let script = script_for(TaskKind::BuildPythonIncremental, &[]);
        assert!(script.contains("pip install -e . -vv --no-build-isolation"));
        assert!(!script.contains("rm -rf build"));
        assert!(script.contains("source \"$INIT_SCRIPT\""));
        assert!(script.contains("NVTE_FRAMEWORK=pytorch"));
    }

    #[test]
    fn test_clean_python_build_cleans_first() {
        let script = script_for(TaskKind::BuildPythonClean, &[]);
        assert!(script.contains("rm -rf build transformer_engine.egg-info/"));
        assert!(script.contains("Python Clean Build Completed"));
    }

    #[test]
    fn test_cpp_build_uses_ninja() {
        let script = script_for(TaskKind::BuildCppTests, &[]);
        assert!(script.contains("cmake -GNinja -Bbuild ."));
        assert!(script.contains("cmake --build build"));
        assert!(script.contains("/src/te/tests/cpp"));
    }

    #[test]
    fn test_rebuild_quotes_extra_files() {
        let script = script_for(
            TaskKind::Rebuild,
            &["my file.cu".to_string(), "plain.cu".to_string()],
        );
        assert!(script.contains("'my file.cu'"));
        assert!(script.contains("plain.cu"));
        assert!(script.contains("swizzle.cu"));
    }

    #[test]
    fn test_test_suites_map_to_qa_scripts() {
        let script = script_for(TaskKind::TestL0Cpp, &[]);
        assert!(script.contains("qa/L0_cppunittest/test.sh"));
        assert!(script.contains("conda activate te27"));

        let script = script_for(TaskKind::TestL1Distributed, &[]);
        assert!(script.contains("qa/L1_pytorch_distributed_unittest/test.sh"));
    }

    #[test]
    fn test_workdir_split_between_builds_and_tests() {
        let b = builder();
        let build = b.build(TaskKind::BuildAll, &[]).unwrap();
        assert_eq!(build.workdir, PathBuf::from("/src/te"));
        let test = b.build(TaskKind::TestL0Pytorch, &[]).unwrap();
        assert_eq!(test.workdir, PathBuf::from("/src"));
    }

    #[test]
    fn test_precheck_relevance_split() {
        let cmake = ToolCheck {
            name: "CMake".to_string(),
            required: true,
            exists: false,
            path: None,
            version: None,
        };
        assert!(TePrecheck::relevant(TaskKind::BuildCppTests, &cmake));
        assert!(!TePrecheck::relevant(TaskKind::TestL0Pytorch, &cmake));

        let python = ToolCheck {
            name: "Python3".to_string(),
            required: true,
            exists: false,
            path: None,
            version: None,
        };
        assert!(TePrecheck::relevant(TaskKind::TestL0Pytorch, &python));
    }
}
