//! Workflow test session
//!
//! Runs one workflow exactly once and fans its frozen result out to the exit
//! code, stdout, stderr and file checkers. Every expectation becomes its own
//! `Outcome`; nothing here returns an error, so one workflow's failure can
//! never disturb another's report.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::files;
use crate::isolation::{Isolation, WorkDir};
use crate::matcher;
use crate::outcome::Outcome;
use crate::spec::WorkflowSpec;
use crate::workflow::WorkflowRun;

/// Everything reported about one workflow
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub name: String,
    pub command: String,
    /// Outcomes in order: exit code, stdout, stderr, then files in declaration order
    pub outcomes: Vec<Outcome>,
    pub duration: Duration,
    /// Working directory, if it was retained
    pub workdir: Option<PathBuf>,
    /// Persisted stdout/stderr logs, if the working directory was retained
    pub logs: Vec<PathBuf>,
}

impl WorkflowReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// A report holding a single failed outcome, for workflows that never produced
    /// a result to check.
    pub fn fatal(name: impl Into<String>, command: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            outcomes: vec![outcome],
            duration: Duration::ZERO,
            workdir: None,
            logs: Vec::new(),
        }
    }
}

/// Compare the run's exit code with the desired one. Blocks until the run
/// has completed.
pub fn check_exit_code(run: &WorkflowRun, desired: i32) -> Outcome {
    let description = format!("exit code should be {}", desired);
    match run.exit_code() {
        Ok(code) => Outcome::check(description, code == desired, || {
            format!(
                "The workflow exited with exit code '{}' instead of '{}'.",
                code, desired
            )
        }),
        Err(e) => Outcome::fail(description, e.to_string()),
    }
}

/// Retains or removes the working directory once the session is done with it.
///
/// Created right after allocation, so every exit path (including panics in a
/// checker) goes through its `Drop`.
struct Teardown {
    workdir: Option<WorkDir>,
    keep: bool,
}

impl Teardown {
    fn finish(mut self, run: Option<&WorkflowRun>) -> (Option<PathBuf>, Vec<PathBuf>) {
        let Some(workdir) = self.workdir.take() else {
            return (None, Vec::new());
        };
        if !self.keep {
            workdir.cleanup();
            return (None, Vec::new());
        }

        let mut logs = Vec::new();
        if let Some(run) = run.filter(|r| r.is_finished()) {
            for written in [run.stdout_to_file(), run.stderr_to_file()] {
                match written {
                    Ok(path) => logs.push(path),
                    Err(e) => tracing::warn!(workflow = %run.key(), error = %e, "failed to save log"),
                }
            }
        }
        let path = workdir.keep();
        tracing::info!(dir = %path.display(), "working directory kept");
        (Some(path), logs)
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if let Some(workdir) = self.workdir.take() {
            if self.keep {
                workdir.keep();
            }
        }
    }
}

/// Run `spec` once in a directory from `isolation` and collect all outcomes.
///
/// With `keep_workdir` the directory and the captured streams
/// (`<key>.out.log`, `<key>.err.log`) are left on disk; otherwise the
/// directory is removed after every check has finished.
pub fn run_and_collect(
    spec: &WorkflowSpec,
    isolation: &dyn Isolation,
    keep_workdir: bool,
) -> WorkflowReport {
    let start = Instant::now();

    if let Err(e) = spec.validate() {
        return WorkflowReport::fatal(
            &spec.name,
            &spec.command,
            Outcome::fail("workflow specification should be valid", e.to_string()),
        );
    }

    let key = spec.key();
    let workdir = match isolation.allocate(&key) {
        Ok(workdir) => workdir,
        Err(e) => {
            return WorkflowReport::fatal(
                &spec.name,
                &spec.command,
                Outcome::fail("working directory should be created", e.to_string()),
            );
        }
    };
    let dir = workdir.path().to_path_buf();
    let teardown = Teardown {
        workdir: Some(workdir),
        keep: keep_workdir,
    };

    let run = WorkflowRun::new(key, spec.command.clone(), &dir);
    if let Err(e) = run.start().and_then(|_| run.wait().map(|_| ())) {
        let (workdir, logs) = teardown.finish(None);
        return WorkflowReport {
            workdir,
            logs,
            duration: start.elapsed(),
            ..WorkflowReport::fatal(
                &spec.name,
                &spec.command,
                Outcome::fail("workflow should run", e.to_string()),
            )
        };
    }

    let mut outcomes = Vec::with_capacity(3 + spec.files.len());
    outcomes.push(check_exit_code(&run, spec.exit_code));
    outcomes.push(match run.stdout_lines() {
        Ok(lines) => matcher::matches(&spec.stdout, "stdout", lines),
        Err(e) => Outcome::fail("stdout should be captured", e.to_string()),
    });
    outcomes.push(match run.stderr_lines() {
        Ok(lines) => matcher::matches(&spec.stderr, "stderr", lines),
        Err(e) => Outcome::fail("stderr should be captured", e.to_string()),
    });
    for file in &spec.files {
        outcomes.extend(files::check(file, &dir));
    }

    let (workdir, logs) = teardown.finish(Some(&run));
    WorkflowReport {
        name: spec.name.clone(),
        command: spec.command.clone(),
        outcomes,
        duration: start.elapsed(),
        workdir,
        logs,
    }
}
