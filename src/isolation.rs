//! Isolation directories
//!
//! Each workflow runs in a private working directory allocated by an
//! `Isolation` implementation. The returned `WorkDir` guard removes the
//! directory when dropped unless it is explicitly kept.

use std::path::{Path, PathBuf};

use crate::error::WorkflowError;

/// Allocates a fresh, populated working directory for a workflow key
pub trait Isolation: Send + Sync {
    fn allocate(&self, key: &str) -> Result<WorkDir, WorkflowError>;
}

/// An allocated working directory.
///
/// Dropping the guard deletes the directory; cleanup failures are logged and
/// otherwise ignored.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    tempdir: Option<tempfile::TempDir>,
}

impl WorkDir {
    /// Wrap a temporary directory that is removed on drop
    pub fn temporary(tempdir: tempfile::TempDir) -> Self {
        Self {
            path: tempdir.path().to_path_buf(),
            tempdir: Some(tempdir),
        }
    }

    /// Wrap a directory the guard does not own; it is never removed
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tempdir: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Retain the directory and return its path
    pub fn keep(mut self) -> PathBuf {
        if let Some(tempdir) = self.tempdir.take() {
            let _ = tempdir.keep();
        }
        self.path.clone()
    }

    /// Remove the directory now
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(tempdir) = self.tempdir.take() {
            if let Err(e) = tempdir.close() {
                tracing::warn!(dir = %self.path.display(), error = %e, "failed to remove working directory");
            }
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Empty temporary directories named `<key>-XXXXXX`
#[derive(Debug, Clone, Default)]
pub struct TempIsolation {
    /// Parent directory; the system temp dir when None
    pub root: Option<PathBuf>,
}

impl TempIsolation {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl Isolation for TempIsolation {
    fn allocate(&self, key: &str) -> Result<WorkDir, WorkflowError> {
        create_tempdir(self.root.as_deref(), key).map(WorkDir::temporary)
    }
}

/// Temporary directories pre-populated with a copy of a project tree
#[derive(Debug, Clone)]
pub struct ProjectCopy {
    pub source: PathBuf,
    pub root: Option<PathBuf>,
}

impl ProjectCopy {
    pub fn new(source: impl Into<PathBuf>, root: Option<PathBuf>) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }
}

impl Isolation for ProjectCopy {
    fn allocate(&self, key: &str) -> Result<WorkDir, WorkflowError> {
        let tempdir = create_tempdir(self.root.as_deref(), key)?;
        let copy_err = |e: std::io::Error| {
            WorkflowError::resource(format!(
                "failed to copy project '{}': {}",
                self.source.display(),
                e
            ))
            .with_workflow(key)
        };

        let source = self.source.canonicalize().map_err(copy_err)?;
        let dest = tempdir.path().canonicalize().map_err(copy_err)?;
        // Never copy the directory holding the working directories into itself.
        let exclude = dest.parent().map(Path::to_path_buf).unwrap_or_else(|| dest.clone());
        copy_tree(&source, &dest, &exclude).map_err(copy_err)?;

        Ok(WorkDir::temporary(tempdir))
    }
}

fn create_tempdir(root: Option<&Path>, key: &str) -> Result<tempfile::TempDir, WorkflowError> {
    let prefix = format!("{}-", key);
    let result = match root {
        Some(root) => std::fs::create_dir_all(root)
            .and_then(|_| tempfile::Builder::new().prefix(&prefix).tempdir_in(root)),
        None => tempfile::Builder::new().prefix(&prefix).tempdir(),
    };
    result.map_err(|e| {
        WorkflowError::resource(format!("failed to create working directory: {}", e))
            .with_workflow(key)
    })
}

/// Recursively copy `src` into `dst`, skipping the `exclude` directory.
fn copy_tree(src: &Path, dst: &Path, exclude: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        if from == exclude {
            continue;
        }
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&from, &to, exclude)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    let target = std::fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}
