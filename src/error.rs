//! Workflow errors

use std::fmt;
use std::path::PathBuf;

/// The kind of workflow error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or contradictory workflow specification
    Specification,
    /// The command could not be run (spawn failure, double start, ...)
    Execution,
    /// The isolation directory could not be prepared
    Resource,
    /// IO error
    Io,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Specification => "specification error",
            ErrorKind::Execution => "execution error",
            ErrorKind::Resource => "resource error",
            ErrorKind::Io => "io error",
        }
    }
}

/// A workflow error with optional workflow/path context
#[derive(Debug)]
pub struct WorkflowError {
    pub kind: ErrorKind,
    pub message: String,
    pub workflow: Option<String>,
    pub path: Option<PathBuf>,
}

impl WorkflowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            workflow: None,
            path: None,
        }
    }

    pub fn with_workflow(mut self, name: impl Into<String>) -> Self {
        self.workflow = Some(name.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn specification(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Specification, msg)
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, msg)
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, msg)
    }

    pub fn is_specification(&self) -> bool {
        self.kind == ErrorKind::Specification
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref path) = self.path {
            write!(f, "{}: ", path.display())?;
        }
        if let Some(ref name) = self.workflow {
            write!(f, "'{}': ", name)?;
        }
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::error::Error for WorkflowError {}

impl From<std::io::Error> for WorkflowError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}
