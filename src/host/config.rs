//! Test host configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default name of the test-execution artifact in the working directory.
pub const DEFAULT_RESULTS_FILE: &str = "test_results.bin";
/// Default name of the coverage artifact in the working directory.
pub const DEFAULT_COVERAGE_FILE: &str = "coverage.bin";
/// Collector the host loads for coverage passes.
pub const COVERAGE_COLLECTOR: &str = "CoverageDataCollector";
/// Collector the host loads for filtered test execution.
pub const TEST_COLLECTOR: &str = "TestDataCollector";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("io error reading {}: {source}", .path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for [`HostConfig`].
    #[error("invalid host config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything needed to invoke the external test host for one test project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Host executable.
    pub program: PathBuf,
    /// Test project file handed to the host.
    pub project_path: PathBuf,
    /// Per-test hang timeout passed to the host, in seconds.
    pub timeout_secs: u64,
    /// Wall-clock limit for one host process, in seconds. The process tree is
    /// killed when it elapses.
    pub process_timeout_secs: Option<u64>,
    /// Directory the host searches for test adapters and data collectors.
    pub adapter_path: PathBuf,
    /// Collector used for coverage passes.
    pub coverage_collector: String,
    /// Collector used for test-execution passes.
    pub test_collector: String,
    /// Test-execution artifact file name, relative to the working directory.
    pub results_file_name: String,
    /// Coverage artifact file name, relative to the working directory.
    pub coverage_file_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        let adapter_path = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            program: PathBuf::from("dotnet"),
            project_path: PathBuf::new(),
            timeout_secs: 60,
            process_timeout_secs: Some(30 * 60),
            adapter_path,
            coverage_collector: COVERAGE_COLLECTOR.to_string(),
            test_collector: TEST_COLLECTOR.to_string(),
            results_file_name: DEFAULT_RESULTS_FILE.to_string(),
            coverage_file_name: DEFAULT_COVERAGE_FILE.to_string(),
        }
    }
}

impl HostConfig {
    /// Config for `project_path` with defaults elsewhere.
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self::default().with_project_path(project_path)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Set host executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set test project path.
    pub fn with_project_path(mut self, project_path: impl Into<PathBuf>) -> Self {
        self.project_path = project_path.into();
        self
    }

    /// Set per-test timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set (or clear) the per-process wall-clock limit.
    pub fn with_process_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.process_timeout_secs = timeout.map(|t| t.as_secs().max(1));
        self
    }

    /// Set adapter search path.
    pub fn with_adapter_path(mut self, adapter_path: impl Into<PathBuf>) -> Self {
        self.adapter_path = adapter_path.into();
        self
    }

    /// Set artifact file names.
    pub fn with_artifact_names(
        mut self,
        results_file_name: impl Into<String>,
        coverage_file_name: impl Into<String>,
    ) -> Self {
        self.results_file_name = results_file_name.into();
        self.coverage_file_name = coverage_file_name.into();
        self
    }

    /// Per-test timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Per-process wall-clock limit.
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Directory the host runs in: the project's parent directory.
    pub fn working_dir(&self) -> PathBuf {
        match self.project_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Project file name as handed to the host.
    pub fn project_file_name(&self) -> PathBuf {
        self.project_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.project_path.clone())
    }

    /// Location of the test-execution artifact.
    pub fn results_path(&self) -> PathBuf {
        self.working_dir().join(&self.results_file_name)
    }

    /// Location of the coverage artifact.
    pub fn coverage_path(&self) -> PathBuf {
        self.working_dir().join(&self.coverage_file_name)
    }
}
