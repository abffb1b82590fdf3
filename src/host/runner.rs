//! Test host orchestration: the coverage pass and the crash-retry execution pass.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::args::HostArgs;
use super::codec::{BincodeCodec, CodecError, ResultCodec};
use super::config::HostConfig;
use super::process::{ProcessError, ProcessHandle, ProcessOutput};
use super::progress::ProgressSink;
use super::results::{MutationCoverageMap, TestOutcome, TestResultsBatch};
use super::state::PendingTestSet;

/// Which pass an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Instrumented full-project coverage run.
    Coverage,
    /// Filtered test execution.
    Execution,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coverage => write!(f, "coverage"),
            Self::Execution => write!(f, "execution"),
        }
    }
}

/// Orchestration errors. Crashed tests are results, never errors.
#[derive(Debug, Error)]
pub enum RunError {
    /// The host process could not be launched or awaited.
    #[error("{phase} pass: {source}")]
    Process {
        /// Failing pass.
        phase: Phase,
        /// Process failure.
        #[source]
        source: ProcessError,
    },
    /// Non-zero exit where only zero is acceptable. `-1` when the host was
    /// terminated by a signal.
    #[error("{phase} pass: test host exited with code {code}")]
    ExitCode {
        /// Failing pass.
        phase: Phase,
        /// Exit code.
        code: i32,
    },
    /// The host was killed for exceeding the process time limit.
    #[error("{phase} pass: test host exceeded its time limit")]
    TimedOut {
        /// Failing pass.
        phase: Phase,
    },
    /// The artifact was missing or unreadable.
    #[error("{phase} pass: cannot read artifact {}: {source}", .path.display())]
    Artifact {
        /// Failing pass.
        phase: Phase,
        /// Expected artifact location.
        path: PathBuf,
        /// Read failure.
        #[source]
        source: io::Error,
    },
    /// The artifact did not decode.
    #[error("{phase} pass: {source}")]
    Codec {
        /// Failing pass.
        phase: Phase,
        /// Decode failure.
        #[source]
        source: CodecError,
    },
    /// A decoded batch resolved none of the pending tests.
    #[error("execution pass: host returned no result for any of the {pending} pending test(s)")]
    NoProgress {
        /// Pending tests when the batch was issued.
        pending: usize,
    },
    /// Cancellation was requested; the host tree was killed and artifacts removed.
    #[error("{phase} pass cancelled")]
    Cancelled {
        /// Interrupted pass.
        phase: Phase,
    },
}

impl RunError {
    fn from_process(phase: Phase, err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled => Self::Cancelled { phase },
            source => Self::Process { phase, source },
        }
    }

    /// True when the run was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Pass that produced the error.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Process { phase, .. }
            | Self::ExitCode { phase, .. }
            | Self::TimedOut { phase }
            | Self::Artifact { phase, .. }
            | Self::Codec { phase, .. }
            | Self::Cancelled { phase } => *phase,
            Self::NoProgress { .. } => Phase::Execution,
        }
    }
}

/// Artifact location owned by one in-flight run; deleted on drop.
struct ArtifactFile {
    path: PathBuf,
}

impl ArtifactFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove artifact"
            ),
        }
    }
}

impl Drop for ArtifactFile {
    fn drop(&mut self) {
        self.remove();
    }
}

async fn read_artifact(
    path: &Path,
    cancel: &CancellationToken,
    phase: Phase,
) -> Result<Vec<u8>, RunError> {
    tokio::select! {
        bytes = tokio::fs::read(path) => bytes.map_err(|source| RunError::Artifact {
            phase,
            path: path.to_path_buf(),
            source,
        }),
        () = cancel.cancelled() => Err(RunError::Cancelled { phase }),
    }
}

fn stderr_tail(output: &ProcessOutput) -> &str {
    const TAIL: usize = 2000;
    let stderr = output.stderr.trim_end();
    let mut start = stderr.len().saturating_sub(TAIL);
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}

/// Drives the external test host for one test project.
///
/// Runs take `&mut self`: one host process at a time per project, since every
/// run shares the project's artifact paths.
#[derive(Debug, Clone)]
pub struct TestHostRunner<C = BincodeCodec> {
    config: HostConfig,
    codec: C,
}

impl TestHostRunner<BincodeCodec> {
    /// Runner using the bincode artifact format.
    pub fn new(config: HostConfig) -> Self {
        Self::with_codec(config, BincodeCodec)
    }
}

impl<C> TestHostRunner<C>
where
    C: ResultCodec,
{
    /// Runner with a custom artifact codec.
    pub fn with_codec(config: HostConfig, codec: C) -> Self {
        Self { config, codec }
    }

    /// Host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    fn coverage_process(&self) -> ProcessHandle {
        let args = HostArgs::new(&self.config.project_file_name())
            .silent()
            .without_logo()
            .with_timeout(self.config.timeout())
            .with_test_adapter(&self.config.adapter_path)
            .with_collector(&self.config.coverage_collector)
            .build();
        ProcessHandle::new(&self.config.program, args, self.config.working_dir())
            .with_timeout(self.config.process_timeout())
    }

    fn test_process(&self, pending: &PendingTestSet) -> ProcessHandle {
        let args = HostArgs::new(&self.config.project_file_name())
            .silent()
            .without_logo()
            .with_timeout(self.config.timeout())
            .with_test_adapter(&self.config.adapter_path)
            .with_collector(&self.config.test_collector)
            .with_tests(pending.iter())
            .build();
        ProcessHandle::new(&self.config.program, args, self.config.working_dir())
            .with_timeout(self.config.process_timeout())
    }

    /// Run the whole project once under the coverage collector.
    ///
    /// Any non-zero exit is fatal and no artifact is read. The coverage
    /// artifact is removed before returning, whatever the outcome.
    pub async fn run_coverage(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<MutationCoverageMap, RunError> {
        let phase = Phase::Coverage;
        let artifact = ArtifactFile::new(self.config.coverage_path());
        artifact.remove();

        tracing::info!(project = %self.config.project_path.display(), "starting coverage pass");
        let output = self
            .coverage_process()
            .run(cancel)
            .await
            .map_err(|err| RunError::from_process(phase, err))?;

        if output.timed_out {
            return Err(RunError::TimedOut { phase });
        }
        if !output.success() {
            tracing::debug!(stderr = %stderr_tail(&output), "coverage host failed");
            return Err(RunError::ExitCode {
                phase,
                code: output.exit_code.unwrap_or(-1),
            });
        }

        let bytes = read_artifact(&artifact.path, cancel, phase).await?;
        let coverage = self
            .codec
            .decode_coverage(&bytes)
            .map_err(|source| RunError::Codec { phase, source })?;
        tracing::info!(tests = coverage.len(), "coverage pass complete");
        Ok(coverage)
    }

    /// Run `tests`, re-issuing whatever is still pending after each host
    /// process until every test has a result.
    ///
    /// A host that dies mid-batch still flushes the results it completed; the
    /// remaining names go into a smaller batch. A test the host reports as
    /// [`TestOutcome::Crashed`] is terminal for this run and is announced on
    /// `progress`. Results accumulate in batch-completion order.
    pub async fn run_tests<P, I, S>(
        &mut self,
        cancel: &CancellationToken,
        progress: &P,
        tests: I,
    ) -> Result<TestResultsBatch, RunError>
    where
        P: ProgressSink + ?Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let phase = Phase::Execution;
        let mut pending = PendingTestSet::new(tests);
        let mut results = TestResultsBatch::new();
        let artifact = ArtifactFile::new(self.config.results_path());
        let mut batches = 0usize;

        while !pending.is_empty() {
            batches += 1;
            artifact.remove();
            tracing::debug!(batch = batches, pending = pending.len(), "starting test batch");

            let output = self
                .test_process(&pending)
                .run(cancel)
                .await
                .map_err(|err| RunError::from_process(phase, err))?;
            if output.timed_out {
                tracing::warn!(
                    batch = batches,
                    "test host killed after exceeding its time limit, reading partial results"
                );
            }

            let bytes = match read_artifact(&artifact.path, cancel, phase).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    if !err.is_cancelled() {
                        tracing::debug!(
                            exit_code = ?output.exit_code,
                            stderr = %stderr_tail(&output),
                            "test host left no readable artifact"
                        );
                    }
                    return Err(err);
                }
            };
            artifact.remove();
            let batch = self
                .codec
                .decode_results(&bytes)
                .map_err(|source| RunError::Codec { phase, source })?;

            let issued = pending.len();
            for result in batch {
                if !pending.resolve(&result.name) {
                    tracing::warn!(test = %result.name, "ignoring result for a test that is not pending");
                    continue;
                }
                if result.outcome == TestOutcome::Crashed {
                    tracing::warn!(test = %result.name, "test crashed the host");
                    progress.report(format!(
                        "Test {} crashed, it is excluded from the rest of this run. Rerunning the remaining tests...",
                        result.name
                    ));
                }
                results.push(result);
            }

            if pending.len() == issued {
                return Err(RunError::NoProgress { pending: issued });
            }
        }

        tracing::info!(
            batches,
            tests = results.len(),
            failed = results.count(TestOutcome::Failed),
            crashed = results.count(TestOutcome::Crashed),
            "test execution complete"
        );
        Ok(results)
    }
}
