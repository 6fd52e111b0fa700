//! Workflow runner
//!
//! Runs one shell command in a working directory exactly once and freezes its
//! exit code and captured streams. Any number of checkers may then read the
//! frozen result, from any thread, without re-running anything.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::WorkflowError;
use crate::spec::{normalize_key, WorkflowSpec};

type Drain = JoinHandle<std::io::Result<Vec<u8>>>;

/// A started child process whose streams are being drained
struct Running {
    child: Child,
    stdout: Drain,
    stderr: Drain,
    start_time: Instant,
}

/// Bytes captured from one stream, plus their lossy UTF-8 decoding
#[derive(Debug)]
struct Captured {
    bytes: Vec<u8>,
    text: String,
}

impl Captured {
    fn new(bytes: Vec<u8>) -> Self {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Self { bytes, text }
    }
}

/// Immutable snapshot of a completed run
#[derive(Debug)]
pub struct Frozen {
    pub exit_code: i32,
    pub start_time: Instant,
    pub duration: Duration,
    stdout: Captured,
    stderr: Captured,
}

impl Frozen {
    pub fn stdout_bytes(&self) -> &[u8] {
        &self.stdout.bytes
    }

    pub fn stderr_bytes(&self) -> &[u8] {
        &self.stderr.bytes
    }

    pub fn stdout_text(&self) -> &str {
        &self.stdout.text
    }

    pub fn stderr_text(&self) -> &str {
        &self.stderr.text
    }
}

/// One execution of a workflow command
pub struct WorkflowRun {
    key: String,
    command: String,
    cwd: PathBuf,
    started: AtomicBool,
    running: Mutex<Option<Running>>,
    frozen: OnceLock<Frozen>,
}

impl WorkflowRun {
    /// Prepare a run; nothing is spawned until `start`.
    ///
    /// `key` names the persisted log files and should be filesystem safe.
    pub fn new(key: impl Into<String>, command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            command: command.into(),
            cwd: cwd.into(),
            started: AtomicBool::new(false),
            running: Mutex::new(None),
            frozen: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_directory(&self) -> &Path {
        &self.cwd
    }

    /// Spawn the command and start draining stdout and stderr.
    ///
    /// A run can only be started once.
    pub fn start(&self) -> Result<(), WorkflowError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkflowError::execution("workflows can only be started once")
                .with_workflow(self.key.clone()));
        }

        tracing::info!(
            workflow = %self.key,
            command = %self.command,
            dir = %self.cwd.display(),
            "run workflow"
        );

        let mut cmd = shell_command(&self.command);
        cmd.current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            WorkflowError::execution(format!("failed to execute '{}': {}", self.command, e))
                .with_workflow(self.key.clone())
        })?;

        // Both pipes must be drained at once, or a child filling one pipe
        // while we block on the other never exits.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let mut running = self.lock_running()?;
        *running = Some(Running {
            child,
            stdout,
            stderr,
            start_time,
        });
        Ok(())
    }

    /// Block until the process has exited and return the frozen result.
    ///
    /// Idempotent: later calls return the same snapshot immediately.
    pub fn wait(&self) -> Result<&Frozen, WorkflowError> {
        if let Some(frozen) = self.frozen.get() {
            return Ok(frozen);
        }

        let mut running = self.lock_running()?;
        // Another caller may have finished the run while we waited for the lock.
        if let Some(frozen) = self.frozen.get() {
            return Ok(frozen);
        }
        let process = running.take().ok_or_else(|| {
            WorkflowError::execution("workflow is not running").with_workflow(self.key.clone())
        })?;

        let frozen = process
            .finish()
            .map_err(|e| e.with_workflow(self.key.clone()))?;
        tracing::debug!(
            workflow = %self.key,
            exit_code = frozen.exit_code,
            duration_ms = frozen.duration.as_millis() as u64,
            "workflow finished"
        );
        Ok(self.frozen.get_or_init(|| frozen))
    }

    /// Whether the run has completed and its result is frozen
    pub fn is_finished(&self) -> bool {
        self.frozen.get().is_some()
    }

    pub fn exit_code(&self) -> Result<i32, WorkflowError> {
        Ok(self.wait()?.exit_code)
    }

    /// Lines of the captured stdout. Each call re-splits the frozen buffer.
    pub fn stdout_lines(&self) -> Result<std::str::Lines<'_>, WorkflowError> {
        Ok(self.wait()?.stdout_text().lines())
    }

    /// Lines of the captured stderr. Each call re-splits the frozen buffer.
    pub fn stderr_lines(&self) -> Result<std::str::Lines<'_>, WorkflowError> {
        Ok(self.wait()?.stderr_text().lines())
    }

    /// Write captured stdout to `<key>.out.log` in the working directory.
    pub fn stdout_to_file(&self) -> Result<PathBuf, WorkflowError> {
        let frozen = self.wait()?;
        self.write_log("out", frozen.stdout_bytes())
    }

    /// Write captured stderr to `<key>.err.log` in the working directory.
    pub fn stderr_to_file(&self) -> Result<PathBuf, WorkflowError> {
        let frozen = self.wait()?;
        self.write_log("err", frozen.stderr_bytes())
    }

    fn write_log(&self, stream: &str, data: &[u8]) -> Result<PathBuf, WorkflowError> {
        let path = self.cwd.join(format!("{}.{}.log", self.key, stream));
        std::fs::write(&path, data).map_err(|e| WorkflowError::from(e).with_path(&path))?;
        Ok(path)
    }

    fn lock_running(&self) -> Result<std::sync::MutexGuard<'_, Option<Running>>, WorkflowError> {
        self.running
            .lock()
            .map_err(|_| WorkflowError::execution("workflow state lock poisoned"))
    }
}

impl Running {
    fn finish(mut self) -> Result<Frozen, WorkflowError> {
        let status = self.child.wait()?;
        let duration = self.start_time.elapsed();
        let stdout = join_drain(self.stdout, "stdout")?;
        let stderr = join_drain(self.stderr, "stderr")?;

        Ok(Frozen {
            exit_code: exit_code_of(status),
            start_time: self.start_time,
            duration,
            stdout: Captured::new(stdout),
            stderr: Captured::new(stderr),
        })
    }
}

/// Execute a workflow's command in `dir` and wait for it to complete.
pub fn execute(spec: &WorkflowSpec, dir: &Path) -> Result<WorkflowRun, WorkflowError> {
    let run = WorkflowRun::new(normalize_key(&spec.name), spec.command.clone(), dir);
    run.start()?;
    run.wait()?;
    Ok(run)
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Drain {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            stream.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_drain(handle: Drain, stream: &str) -> Result<Vec<u8>, WorkflowError> {
    handle
        .join()
        .map_err(|_| WorkflowError::execution(format!("{} reader panicked", stream)))?
        .map_err(|e| WorkflowError::execution(format!("failed to read {}: {}", stream, e)))
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Exit code of a finished process. A process killed by a signal reports the
/// negated signal number.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
