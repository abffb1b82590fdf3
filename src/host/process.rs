//! One external process invocation: streamed output capture, exit
//! observation, and process-tree termination.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long capture tasks may keep reading after the process is gone.
const CAPTURE_DRAIN: Duration = Duration::from_secs(5);

/// Process-level failures.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying launch error.
        #[source]
        source: io::Error,
    },
    /// Waiting on the child failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Cancellation was requested; the process tree has been killed and reaped.
    #[error("process run cancelled")]
    Cancelled,
}

/// What a finished (or killed) process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the wall-clock limit elapsed and the tree was killed.
    pub timed_out: bool,
    /// Captured stdout, one `\n`-terminated line per line received.
    pub stdout: String,
    /// Captured stderr, one `\n`-terminated line per line received.
    pub stderr: String,
}

impl ProcessOutput {
    /// True for a clean zero exit.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A fully-formed command, run at most one invocation at a time.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessHandle {
    /// Describe the command to run.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            timeout: None,
        }
    }

    /// Kill the process tree when `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Start the process and wait for it to exit, time out, or be cancelled.
    ///
    /// On every path the child is reaped and both capture tasks are joined
    /// before this returns, so the output buffers and any files the process
    /// wrote are complete.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ProcessOutput, ProcessError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_group(&mut command);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        let mut tree = ProcessTree::new(child.id());
        tracing::debug!(
            pid = ?child.id(),
            program = %self.program.display(),
            args = self.args.len(),
            "process started"
        );

        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        let captures = [
            child.stdout.take().map(|pipe| stdout.capture(pipe)),
            child.stderr.take().map(|pipe| stderr.capture(pipe)),
        ];

        let exit = tokio::select! {
            status = child.wait() => Exit::Exited(status?),
            () = cancel.cancelled() => Exit::Cancelled,
            () = watchdog(self.timeout) => Exit::TimedOut,
        };

        let (status, cancelled, timed_out) = match exit {
            Exit::Exited(status) => (status, false, false),
            Exit::Cancelled => {
                tracing::debug!(pid = ?tree.pgid, "cancellation requested, killing process tree");
                tree.kill(&mut child);
                (child.wait().await?, true, false)
            }
            Exit::TimedOut => {
                tracing::warn!(
                    pid = ?tree.pgid,
                    timeout = ?self.timeout,
                    "process exceeded its time limit, killing process tree"
                );
                tree.kill(&mut child);
                (child.wait().await?, false, true)
            }
        };
        tree.disarm();
        drain(captures).await;

        if cancelled {
            return Err(ProcessError::Cancelled);
        }

        let output = ProcessOutput {
            exit_code: if timed_out { None } else { status.code() },
            timed_out,
            stdout: stdout.take(),
            stderr: stderr.take(),
        };
        tracing::debug!(exit_code = ?output.exit_code, timed_out, "process finished");
        Ok(output)
    }
}

enum Exit {
    Exited(std::process::ExitStatus),
    Cancelled,
    TimedOut,
}

async fn watchdog(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn drain(captures: [Option<JoinHandle<()>>; 2]) {
    for mut capture in captures.into_iter().flatten() {
        if tokio::time::timeout(CAPTURE_DRAIN, &mut capture).await.is_err() {
            tracing::warn!("output pipe still open after exit, discarding the rest");
            capture.abort();
        }
    }
}

/// Line buffer appended to by a capture task while the process runs.
#[derive(Debug, Clone, Default)]
struct OutputBuffer(Arc<Mutex<String>>);

impl OutputBuffer {
    fn capture<R>(&self, pipe: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(pipe);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => buffer.append_line(&line),
                    Err(err) => {
                        tracing::debug!(error = %err, "output capture stopped");
                        break;
                    }
                }
            }
        })
    }

    fn append_line(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let mut buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push_str(text.trim_end_matches(['\r', '\n']));
        buffer.push('\n');
    }

    fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Process group led by the spawned child. Killed on drop unless disarmed,
/// so an abandoned run leaves no workers behind.
struct ProcessTree {
    pgid: Option<u32>,
    armed: bool,
}

impl ProcessTree {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid, armed: true }
    }

    fn kill(&self, child: &mut Child) {
        if let Some(pgid) = self.pgid {
            match kill_group(pgid) {
                Ok(()) => return,
                Err(err) => tracing::warn!(pgid, error = %err, "failed to kill process group"),
            }
        }
        if let Err(err) = child.start_kill() {
            tracing::warn!(error = %err, "failed to kill process");
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessTree {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pgid) = self.pgid {
            let _ = kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn isolate_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_group(pgid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pgid).map_err(|_| io::Error::from(Errno::EINVAL))?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups are not supported on this platform",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::time::Instant;

    use tempfile::tempdir;

    use super::*;

    fn sh(script: &str, dir: &Path) -> ProcessHandle {
        ProcessHandle::new("sh", vec!["-c".into(), script.into()], dir)
    }

    /// Running and not a zombie.
    fn is_alive(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let tmp = tempdir().expect("tempdir should be created");
        let handle = sh("echo out1; echo err1 >&2; printf 'out2'; exit 3", tmp.path());

        let output = handle
            .run(&CancellationToken::new())
            .await
            .expect("process should run");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert!(!output.timed_out);
        assert_eq!(output.stdout, "out1\nout2\n");
        assert_eq!(output.stderr, "err1\n");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let tmp = tempdir().expect("tempdir should be created");
        let output = sh("echo marker > here.txt", tmp.path())
            .run(&CancellationToken::new())
            .await
            .expect("process should run");
        assert!(output.success());
        assert!(tmp.path().join("here.txt").exists());
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let tmp = tempdir().expect("tempdir should be created");
        let handle = ProcessHandle::new(tmp.path().join("no-such-host"), Vec::new(), tmp.path());

        let err = handle
            .run(&CancellationToken::new())
            .await
            .expect_err("missing executable should fail");
        assert!(matches!(err, ProcessError::Spawn { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_output() {
        let tmp = tempdir().expect("tempdir should be created");
        let handle = sh("echo started; sleep 30; echo never", tmp.path())
            .with_timeout(Some(Duration::from_millis(300)));

        let started = Instant::now();
        let output = handle
            .run(&CancellationToken::new())
            .await
            .expect("timed out process still yields output");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert_eq!(output.stdout, "started\n");
    }

    #[tokio::test]
    async fn cancellation_kills_whole_tree() {
        let tmp = tempdir().expect("tempdir should be created");
        let pid_file = tmp.path().join("worker.pid");
        let handle = sh("sleep 30 & echo $! > worker.pid; wait", tmp.path());
        let cancel = CancellationToken::new();

        let trigger = async {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !pid_file.exists() && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let started = Instant::now();
        let (result, ()) = tokio::join!(handle.run(&cancel), trigger);

        assert!(matches!(result, Err(ProcessError::Cancelled)), "got {result:?}");
        assert!(started.elapsed() < Duration::from_secs(10));

        let worker: i32 = std::fs::read_to_string(&pid_file)
            .expect("worker pid should be recorded")
            .trim()
            .parse()
            .expect("worker pid should parse");
        let deadline = Instant::now() + Duration::from_secs(2);
        while is_alive(worker) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!is_alive(worker), "grandchild {worker} survived cancellation");
    }
}
