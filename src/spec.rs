//! Workflow specifications
//!
//! In-memory model of a workflow: the command to run and everything that is
//! expected of it. Specifications are immutable once validated. They can be
//! built in code or loaded from YAML workflow files:
//!
//! ```yaml
//! - name: create moo
//!   command: bash -c 'echo moo > moo.txt'
//!   stdout:
//!     exact: []
//!   files:
//!     - path: moo.txt
//!       contains: [moo]
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::WorkflowError;

/// Exit code expected when a workflow does not declare one
pub const DEFAULT_EXIT_CODE: i32 = 0;

/// A declarative rule for judging a stream's or file's text content.
///
/// `Unset` means "do not check", which is not the same as `Exact(vec![])`
/// ("the output must be empty").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentExpectation {
    #[default]
    Unset,
    /// Line-by-line equality, order and length sensitive
    Exact(Vec<String>),
    /// Every entry is found in some line, in the given relative order
    Contains(Vec<String>),
    /// No line contains any of the entries
    MustNotContain(Vec<String>),
    /// Pattern matched against the newline-joined content
    Regex(String),
}

impl ContentExpectation {
    pub fn is_unset(&self) -> bool {
        matches!(self, ContentExpectation::Unset)
    }

    /// Short name of the mode, used in outcome descriptions
    pub fn kind(&self) -> &'static str {
        match self {
            ContentExpectation::Unset => "unset",
            ContentExpectation::Exact(_) => "exact",
            ContentExpectation::Contains(_) => "contains",
            ContentExpectation::MustNotContain(_) => "must_not_contain",
            ContentExpectation::Regex(_) => "regex",
        }
    }

    pub fn exact<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContentExpectation::Exact(lines.into_iter().map(Into::into).collect())
    }

    pub fn contains<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContentExpectation::Contains(lines.into_iter().map(Into::into).collect())
    }

    pub fn must_not_contain<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContentExpectation::MustNotContain(lines.into_iter().map(Into::into).collect())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        ContentExpectation::Regex(pattern.into())
    }

    fn validate(&self, subject: &str) -> Result<(), WorkflowError> {
        if let ContentExpectation::Regex(pattern) = self {
            crate::matcher::compile_regex(pattern).map_err(|e| {
                WorkflowError::specification(format!("{}: invalid regex: {}", subject, e))
            })?;
        }
        Ok(())
    }
}

/// Expectations about one file produced (or not) by a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExpectation {
    /// Path relative to the workflow's working directory
    pub path: PathBuf,
    pub should_exist: bool,
    pub content: ContentExpectation,
    /// Lowercase hex md5 digest of the whole file
    pub md5sum: Option<String>,
}

impl FileExpectation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            should_exist: true,
            content: ContentExpectation::Unset,
            md5sum: None,
        }
    }

    pub fn should_exist(mut self, should_exist: bool) -> Self {
        self.should_exist = should_exist;
        self
    }

    pub fn content(mut self, content: ContentExpectation) -> Self {
        self.content = content;
        self
    }

    pub fn md5sum(mut self, digest: impl Into<String>) -> Self {
        self.md5sum = Some(digest.into());
        self
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        let shown = self.path.display().to_string();
        if self.path.as_os_str().is_empty() {
            return Err(WorkflowError::specification("file path must not be empty"));
        }
        if self.path.is_absolute()
            || self.path.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(WorkflowError::specification(format!(
                "'{}': file path must be relative to the working directory",
                shown
            )));
        }
        if !self.should_exist && (!self.content.is_unset() || self.md5sum.is_some()) {
            return Err(WorkflowError::specification(format!(
                "'{}': content checks are not allowed on a file that should not exist",
                shown
            )));
        }
        if let Some(ref digest) = self.md5sum {
            if digest.len() != 32 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(WorkflowError::specification(format!(
                    "'{}': md5sum '{}' is not a 32 digit hex string",
                    shown, digest
                )));
            }
        }
        self.content.validate(&shown)
    }
}

/// One declared command plus its success expectations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSpec {
    pub name: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: ContentExpectation,
    pub stderr: ContentExpectation,
    pub files: Vec<FileExpectation>,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            exit_code: DEFAULT_EXIT_CODE,
            stdout: ContentExpectation::Unset,
            stderr: ContentExpectation::Unset,
            files: Vec::new(),
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn stdout(mut self, expectation: ContentExpectation) -> Self {
        self.stdout = expectation;
        self
    }

    pub fn stderr(mut self, expectation: ContentExpectation) -> Self {
        self.stderr = expectation;
        self
    }

    pub fn file(mut self, file: FileExpectation) -> Self {
        self.files.push(file);
        self
    }

    /// Filesystem-safe isolation key derived from the name
    pub fn key(&self) -> String {
        normalize_key(&self.name)
    }

    /// Reject malformed or contradictory expectations before anything runs.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let in_workflow = |e: WorkflowError| e.with_workflow(self.name.clone());

        if self.name.trim().is_empty() {
            return Err(WorkflowError::specification("workflow name must not be empty"));
        }
        if self.command.trim().is_empty() {
            return Err(in_workflow(WorkflowError::specification("command must not be empty")));
        }
        self.stdout.validate("stdout").map_err(in_workflow)?;
        self.stderr.validate("stderr").map_err(in_workflow)?;

        let mut seen = HashSet::new();
        for file in &self.files {
            file.validate().map_err(in_workflow)?;
            if !seen.insert(&file.path) {
                return Err(in_workflow(WorkflowError::specification(format!(
                    "'{}' is declared more than once",
                    file.path.display()
                ))));
            }
        }
        Ok(())
    }
}

/// Turn a workflow name into a key usable as a directory or file name.
///
/// Each run of whitespace and each path separator becomes `_`, so names that
/// differ only in spacing share a key.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "_")
}

// ──────────────────────────────────────────────────────────
// YAML workflow files
// ──────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawWorkflow {
    name: String,
    command: String,
    #[serde(default = "default_exit_code")]
    exit_code: i32,
    #[serde(default)]
    stdout: RawContent,
    #[serde(default)]
    stderr: RawContent,
    #[serde(default)]
    files: Vec<RawFile>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct RawContent {
    exact: Option<Vec<String>>,
    contains: Option<Vec<String>>,
    must_not_contain: Option<Vec<String>>,
    regex: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawFile {
    path: String,
    #[serde(default = "default_should_exist")]
    should_exist: bool,
    md5sum: Option<String>,
    exact: Option<Vec<String>>,
    contains: Option<Vec<String>>,
    must_not_contain: Option<Vec<String>>,
    regex: Option<String>,
}

fn default_exit_code() -> i32 {
    DEFAULT_EXIT_CODE
}

fn default_should_exist() -> bool {
    true
}

impl RawContent {
    fn into_expectation(self, subject: &str) -> Result<ContentExpectation, WorkflowError> {
        let mut modes = Vec::new();
        if let Some(lines) = self.exact {
            modes.push(ContentExpectation::Exact(lines));
        }
        if let Some(lines) = self.contains {
            modes.push(ContentExpectation::Contains(lines));
        }
        if let Some(lines) = self.must_not_contain {
            modes.push(ContentExpectation::MustNotContain(lines));
        }
        if let Some(pattern) = self.regex {
            modes.push(ContentExpectation::Regex(pattern));
        }
        match modes.len() {
            0 => Ok(ContentExpectation::Unset),
            1 => Ok(modes.remove(0)),
            _ => {
                let kinds: Vec<&str> = modes.iter().map(|m| m.kind()).collect();
                Err(WorkflowError::specification(format!(
                    "{}: only one of exact, contains, must_not_contain, regex may be set (got {})",
                    subject,
                    kinds.join(", ")
                )))
            }
        }
    }
}

impl RawFile {
    fn into_expectation(self) -> Result<FileExpectation, WorkflowError> {
        let content = RawContent {
            exact: self.exact,
            contains: self.contains,
            must_not_contain: self.must_not_contain,
            regex: self.regex,
        }
        .into_expectation(&self.path)?;
        Ok(FileExpectation {
            path: PathBuf::from(self.path),
            should_exist: self.should_exist,
            content,
            md5sum: self.md5sum.map(|d| d.to_ascii_lowercase()),
        })
    }
}

impl RawWorkflow {
    fn into_spec(self) -> Result<WorkflowSpec, WorkflowError> {
        let name = self.name;
        let in_workflow = |e: WorkflowError| e.with_workflow(name.clone());
        let stdout = self.stdout.into_expectation("stdout").map_err(in_workflow)?;
        let stderr = self.stderr.into_expectation("stderr").map_err(in_workflow)?;
        let files = self
            .files
            .into_iter()
            .map(RawFile::into_expectation)
            .collect::<Result<Vec<_>, _>>()
            .map_err(in_workflow)?;
        Ok(WorkflowSpec {
            name,
            command: self.command,
            exit_code: self.exit_code,
            stdout,
            stderr,
            files,
        })
    }
}

/// Parse and validate the workflows declared in a YAML document.
pub fn parse_workflows(yaml: &str) -> Result<Vec<WorkflowSpec>, WorkflowError> {
    let raw: Vec<RawWorkflow> = serde_yaml::from_str(yaml)
        .map_err(|e| WorkflowError::specification(format!("invalid workflow file: {}", e)))?;

    let mut keys = HashSet::new();
    let mut specs = Vec::with_capacity(raw.len());
    for workflow in raw {
        let spec = workflow.into_spec()?;
        spec.validate()?;
        if !keys.insert(spec.key()) {
            return Err(WorkflowError::specification("workflow names must be unique")
                .with_workflow(spec.name));
        }
        specs.push(spec);
    }
    Ok(specs)
}

/// Read, parse and validate a YAML workflow file.
pub fn load_workflows(path: &Path) -> Result<Vec<WorkflowSpec>, WorkflowError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| WorkflowError::from(e).with_path(path))?;
    parse_workflows(&data).map_err(|e| e.with_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("simple"), "simple");
        assert_eq!(normalize_key("  echo  moo "), "echo_moo");
        assert_eq!(normalize_key("a/b\tc"), "a_b_c");
        assert_eq!(normalize_key("echo \t\n moo"), normalize_key("echo moo"));
    }

    #[test]
    fn test_parse_minimal() {
        let specs = parse_workflows("- name: hello\n  command: echo hello\n").unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "hello");
        assert_eq!(specs[0].exit_code, 0);
        assert!(specs[0].stdout.is_unset());
        assert!(specs[0].stderr.is_unset());
        assert!(specs[0].files.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let yaml = r#"
- name: moo file
  command: bash -c 'echo moo > moo.txt'
  exit_code: 3
  stdout:
    exact: []
  stderr:
    regex: "^warn"
  files:
    - path: moo.txt
      md5sum: E583AF1F8B00B53CDA87AE9EAD880224
      contains: [moo]
    - path: gone.txt
      should_exist: false
"#;
        let specs = parse_workflows(yaml).unwrap();
        let spec = &specs[0];
        assert_eq!(spec.exit_code, 3);
        assert_eq!(spec.stdout, ContentExpectation::Exact(vec![]));
        assert_eq!(spec.stderr, ContentExpectation::regex("^warn"));
        assert_eq!(spec.files.len(), 2);
        assert_eq!(spec.files[0].content, ContentExpectation::contains(["moo"]));
        assert_eq!(
            spec.files[0].md5sum.as_deref(),
            Some("e583af1f8b00b53cda87ae9ead880224")
        );
        assert!(!spec.files[1].should_exist);
    }

    #[test]
    fn test_multiple_modes_rejected() {
        let yaml = "- name: x\n  command: echo x\n  stdout:\n    exact: [a]\n    contains: [a]\n";
        let err = parse_workflows(yaml).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Specification);
        assert!(err.message.contains("exact, contains"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_workflows("- name: x\n  command: echo x\n  exitcode: 1\n").unwrap_err();
        assert!(err.is_specification());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = "- name: a b\n  command: echo x\n- name: a b\n  command: echo y\n";
        let err = parse_workflows(yaml).unwrap_err();
        assert!(err.message.contains("unique"));

        // names differing only in spacing share a key
        let yaml = "- name: a b\n  command: echo x\n- name: a   b\n  command: echo x\n";
        let err = parse_workflows(yaml).unwrap_err();
        assert_eq!(err.workflow.as_deref(), Some("a   b"));

        let yaml = "- name: a b\n  command: echo x\n- name: a_c\n  command: echo x\n";
        assert!(parse_workflows(yaml).is_ok());
    }

    #[test]
    fn test_content_on_absent_file_rejected() {
        let spec = WorkflowSpec::new("x", "true").file(
            FileExpectation::new("out.txt")
                .should_exist(false)
                .content(ContentExpectation::contains(["a"])),
        );
        let err = spec.validate().unwrap_err();
        assert!(err.is_specification());
        assert_eq!(err.workflow.as_deref(), Some("x"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let spec = WorkflowSpec::new("x", "true").stdout(ContentExpectation::regex("(unclosed"));
        assert!(spec.validate().unwrap_err().message.contains("invalid regex"));
    }

    #[test]
    fn test_bad_paths_rejected() {
        for path in ["/etc/passwd", "../outside.txt", ""] {
            let spec = WorkflowSpec::new("x", "true").file(FileExpectation::new(path));
            assert!(spec.validate().is_err(), "path {:?} should be rejected", path);
        }
    }

    #[test]
    fn test_bad_md5_rejected() {
        let spec = WorkflowSpec::new("x", "true").file(FileExpectation::new("a").md5sum("abc"));
        assert!(spec.validate().unwrap_err().message.contains("md5sum"));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(WorkflowSpec::new("x", "  ").validate().is_err());
        assert!(WorkflowSpec::new(" ", "true").validate().is_err());
    }
}
