//! Workflow file runner
//!
//! Discovers YAML workflow files in a directory, runs every workflow they
//! declare in its own working directory, and reports results.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::isolation::{Isolation, ProjectCopy, TempIsolation};
use crate::outcome::Outcome;
use crate::session::{run_and_collect, WorkflowReport};
use crate::spec::{load_workflows, WorkflowSpec};

/// Configuration for the workflow runner
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory containing workflow files, or a single workflow file
    pub dir: PathBuf,
    /// Only run workflows whose name contains this string
    pub filter: Option<String>,
    /// Project tree copied into every working directory (empty dirs when None)
    pub project_root: Option<PathBuf>,
    /// Root directory for working directories
    pub workdir_root: Option<PathBuf>,
    /// Keep working directories and save stdout/stderr logs in them
    pub keep_workdir: bool,
    /// Verbose mode: also print passing outcomes
    pub verbose: bool,
    /// Number of workflows run at the same time
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("tests"),
            filter: None,
            project_root: None,
            workdir_root: None,
            keep_workdir: false,
            verbose: false,
            jobs: 1,
        }
    }
}

/// Result of running all workflows
#[derive(Debug)]
pub struct RunResult {
    /// Per-workflow reports, in file then declaration order
    pub reports: Vec<WorkflowReport>,
    /// Total duration
    pub duration: Duration,
}

impl RunResult {
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(WorkflowReport::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|r| !r.passed()).count()
    }

    /// (passed, failed) counted per outcome rather than per workflow
    pub fn outcome_counts(&self) -> (usize, usize) {
        self.reports
            .iter()
            .flat_map(|r| &r.outcomes)
            .fold((0, 0), |(p, f), o| if o.passed { (p + 1, f) } else { (p, f + 1) })
    }

    /// Format a summary line
    pub fn summary(&self) -> String {
        let (passed, failed) = self.outcome_counts();
        format!(
            "{} passed, {} failed ({} checks passed, {} failed) ({}ms)",
            self.passed_count(),
            self.failed_count(),
            passed,
            failed,
            self.duration.as_millis(),
        )
    }
}

/// A unit of work: a workflow to run, or a file that failed to load
enum Job {
    Run(WorkflowSpec),
    Broken(WorkflowReport),
}

/// The workflow runner
pub struct TestRunner {
    config: RunConfig,
    isolation: Box<dyn Isolation>,
}

impl TestRunner {
    /// Create a runner; working directories copy `project_root` when set.
    pub fn new(config: RunConfig) -> Self {
        let isolation: Box<dyn Isolation> = match config.project_root {
            Some(ref root) => Box::new(ProjectCopy::new(root, config.workdir_root.clone())),
            None => Box::new(TempIsolation::new(config.workdir_root.clone())),
        };
        Self { config, isolation }
    }

    /// Create a runner with a custom isolation directory provider
    pub fn with_isolation(config: RunConfig, isolation: Box<dyn Isolation>) -> Self {
        Self { config, isolation }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Discover workflow files in the configured directory
    pub fn discover(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut files = Vec::new();
        let dir = &self.config.dir;

        if !dir.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("workflow directory not found: {}", dir.display()),
            ));
        }

        if dir.is_file() {
            // Single file mode
            files.push(dir.clone());
            return Ok(files);
        }

        scan_dir(dir, &mut files)?;

        files.sort();
        Ok(files)
    }

    /// Load all discovered files, applying the name filter.
    fn load_jobs(&self) -> Result<Vec<Job>, std::io::Error> {
        let files = self.discover()?;
        tracing::debug!(count = files.len(), "discovered workflow files");

        let mut jobs = Vec::new();
        for file in &files {
            match load_workflows(file) {
                Ok(specs) => jobs.extend(
                    specs
                        .into_iter()
                        .filter(|s| self.matches_filter(&s.name))
                        .map(Job::Run),
                ),
                Err(e) => jobs.push(Job::Broken(WorkflowReport::fatal(
                    file.display().to_string(),
                    String::new(),
                    Outcome::fail("workflow file should load", e.to_string()),
                ))),
            }
        }
        Ok(jobs)
    }

    fn matches_filter(&self, name: &str) -> bool {
        self.config
            .filter
            .as_deref()
            .map_or(true, |filter| name.contains(filter))
    }

    /// Count the workflows that would be run
    pub fn count_workflows(&self) -> Result<usize, std::io::Error> {
        let jobs = self.load_jobs()?;
        Ok(jobs.iter().filter(|j| matches!(j, Job::Run(_))).count())
    }

    /// Names of the workflows that would be run
    pub fn list_workflows(&self) -> Result<Vec<String>, std::io::Error> {
        let jobs = self.load_jobs()?;
        Ok(jobs
            .into_iter()
            .filter_map(|j| match j {
                Job::Run(spec) => Some(spec.name),
                Job::Broken(_) => None,
            })
            .collect())
    }

    /// Run all discovered workflows
    pub fn run_all(&self) -> Result<RunResult, std::io::Error> {
        let start = Instant::now();
        let jobs = self.load_jobs()?;
        let workers = self.config.jobs.clamp(1, jobs.len().max(1));

        let counter = AtomicUsize::new(0);
        let (next, queue) = (&counter, &jobs);
        let mut finished: Vec<(usize, WorkflowReport)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::SeqCst);
                            let Some(job) = queue.get(i) else { break };
                            done.push((i, self.run_job(job)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });
        finished.sort_by_key(|(i, _)| *i);

        Ok(RunResult {
            reports: finished.into_iter().map(|(_, report)| report).collect(),
            duration: start.elapsed(),
        })
    }

    fn run_job(&self, job: &Job) -> WorkflowReport {
        match job {
            Job::Run(spec) => run_and_collect(spec, self.isolation.as_ref(), self.config.keep_workdir),
            Job::Broken(report) => report.clone(),
        }
    }
}

fn scan_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            scan_dir(&path, files)?;
        } else if is_workflow_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Workflow files are named `test*.yml` or `test*.yaml`
pub fn is_workflow_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            name.starts_with("test") && (name.ends_with(".yml") || name.ends_with(".yaml"))
        }
        None => false,
    }
}

/// Render one workflow report for terminal output.
///
/// Failed outcomes are always listed; passing ones only when `verbose`.
pub fn render_report(report: &WorkflowReport, verbose: bool) -> String {
    let mut out = String::new();
    let status = if report.passed() { "PASS" } else { "FAIL" };
    let _ = writeln!(out, "{}  {} ({}ms)", status, report.name, report.duration.as_millis());
    for outcome in &report.outcomes {
        if outcome.passed && !verbose {
            continue;
        }
        let mark = if outcome.passed { "ok  " } else { "FAIL" };
        let _ = writeln!(out, "      {} {}", mark, outcome.description);
        if let Some(ref detail) = outcome.detail {
            for line in detail.lines() {
                let _ = writeln!(out, "           {}", line);
            }
        }
    }
    if let Some(ref wd) = report.workdir {
        let _ = writeln!(out, "      workdir: {}", wd.display());
    }
    for log in &report.logs {
        let _ = writeln!(out, "      log: {}", log.display());
    }
    out
}

/// Builder API for convenient runner construction
pub struct TestRunnerBuilder {
    config: RunConfig,
    isolation: Option<Box<dyn Isolation>>,
}

impl TestRunnerBuilder {
    /// Start building a runner for the given directory or file
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            config: RunConfig {
                dir: dir.into(),
                ..Default::default()
            },
            isolation: None,
        }
    }

    /// Set the workflow name filter
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Copy this project tree into every working directory
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.project_root = Some(root.into());
        self
    }

    /// Set the working directory root
    pub fn workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workdir_root = Some(root.into());
        self
    }

    /// Keep working directories and logs after the run
    pub fn keep_workdir(mut self, keep: bool) -> Self {
        self.config.keep_workdir = keep;
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Number of workflows run concurrently
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs;
        self
    }

    /// Use a custom isolation directory provider
    pub fn isolation(mut self, isolation: Box<dyn Isolation>) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Build and return the runner
    pub fn build(self) -> TestRunner {
        match self.isolation {
            Some(isolation) => TestRunner::with_isolation(self.config, isolation),
            None => TestRunner::new(self.config),
        }
    }

    /// Build and run all workflows
    pub fn run(self) -> Result<RunResult, std::io::Error> {
        self.build().run_all()
    }
}

/// Convenience function: create a runner builder for a directory
pub fn run(dir: impl Into<PathBuf>) -> TestRunnerBuilder {
    TestRunnerBuilder::new(dir)
}

/// Run workflow files and integrate with `#[test]` by panicking on failure.
///
/// Usage in cargo tests:
/// ```rust,ignore
/// #[test]
/// fn workflows() {
///     emx_workflow::run_and_assert("tests/workflows");
/// }
/// ```
pub fn run_and_assert(dir: impl Into<PathBuf>) {
    run_and_assert_with(dir, |_| {});
}

/// Like `run_and_assert` but allows config customization.
pub fn run_and_assert_with(dir: impl Into<PathBuf>, customize: impl FnOnce(&mut RunConfig)) {
    let mut config = RunConfig {
        dir: dir.into(),
        verbose: std::env::var("WORKFLOW_VERBOSE").is_ok(),
        keep_workdir: std::env::var("WORKFLOW_KEEP_WD").is_ok(),
        ..Default::default()
    };
    customize(&mut config);

    let verbose = config.verbose;
    let runner = TestRunner::new(config);
    let result = runner.run_all().expect("failed to run workflows");

    for report in &result.reports {
        eprint!("{}", render_report(report, verbose));
    }

    eprintln!("\n{}", result.summary());

    if !result.all_passed() {
        panic!("{} workflow(s) failed", result.failed_count());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_is_workflow_file() {
        assert!(is_workflow_file(Path::new("tests/test_moo.yml")));
        assert!(is_workflow_file(Path::new("test.yaml")));
        assert!(!is_workflow_file(Path::new("moo_test.yml")));
        assert!(!is_workflow_file(Path::new("test_moo.json")));
    }

    #[test]
    fn test_discover_sorted_and_recursive() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "test_b.yml", "[]");
        write(tmp.path(), "nested/test_a.yaml", "[]");
        write(tmp.path(), "other.yml", "[]");

        let runner = run(tmp.path()).build();
        let files = runner.discover().unwrap();
        assert_eq!(
            files,
            vec![tmp.path().join("nested/test_a.yaml"), tmp.path().join("test_b.yml")]
        );
    }

    #[test]
    fn test_missing_dir() {
        let runner = run("/nonexistent/workflows").build();
        assert_eq!(runner.discover().unwrap_err().kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_run_all_keeps_declaration_order_in_parallel() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "test_flows.yml",
            r#"
- name: slow
  command: sleep 0.3; echo slow
  stdout:
    exact: [slow]
- name: fast
  command: echo fast
- name: wrong exit
  command: exit 4
"#,
        );

        let result = run(tmp.path()).jobs(3).run().unwrap();
        let names: Vec<&str> = result.reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast", "wrong exit"]);
        assert_eq!(result.passed_count(), 2);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.outcome_counts(), (8, 1));
        assert!(!result.all_passed());
    }

    #[test]
    fn test_broken_file_reported_others_run() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "test_a.yml", "- name: ok\n  command: echo ok\n");
        write(tmp.path(), "test_b.yml", "- name: bad\n  unknown_key: 1\n");

        let result = run(tmp.path()).run().unwrap();
        assert_eq!(result.reports.len(), 2);
        assert!(result.reports[0].passed());
        assert!(!result.reports[1].passed());
        assert_eq!(result.reports[1].outcomes[0].description, "workflow file should load");
    }

    #[test]
    fn test_filter_and_count() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "test_a.yml",
            "- name: moo one\n  command: echo 1\n- name: miaow\n  command: echo 2\n",
        );

        let runner = run(tmp.path()).filter("moo").build();
        assert_eq!(runner.count_workflows().unwrap(), 1);
        assert_eq!(runner.list_workflows().unwrap(), vec!["moo one".to_string()]);
    }

    #[test]
    fn test_project_root_is_copied() {
        let project = tempfile::tempdir().unwrap();
        write(project.path(), "data/input.txt", "payload\n");
        let flows = tempfile::tempdir().unwrap();
        write(
            flows.path(),
            "test_copy.yml",
            r#"
- name: reads project
  command: cat data/input.txt
  stdout:
    exact: [payload]
"#,
        );

        let result = run(flows.path()).project_root(project.path()).run().unwrap();
        assert!(result.all_passed(), "{:?}", result.reports);
    }

    #[test]
    fn test_render_report() {
        let report = WorkflowReport {
            name: "flow".into(),
            command: "exit 1".into(),
            outcomes: vec![
                Outcome::fail("exit code should be 0", "The workflow exited with exit code '1' instead of '0'."),
                Outcome::pass("stdout is not checked"),
            ],
            duration: Duration::from_millis(5),
            workdir: None,
            logs: Vec::new(),
        };
        let quiet = render_report(&report, false);
        assert!(quiet.starts_with("FAIL  flow (5ms)\n"));
        assert!(quiet.contains("FAIL exit code should be 0"));
        assert!(quiet.contains("instead of '0'."));
        assert!(!quiet.contains("stdout is not checked"));

        assert!(render_report(&report, true).contains("ok   stdout is not checked"));

        let passing = WorkflowReport {
            outcomes: vec![Outcome::pass("exit code should be 0")],
            ..report
        };
        assert_eq!(render_report(&passing, false), "PASS  flow (5ms)\n");
    }
}
