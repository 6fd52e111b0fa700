//! File expectation checks
//!
//! Existence (or absence) of declared output files, and optionally their
//! content and md5 digest, relative to the workflow's working directory.

use std::path::Path;

use md5::{Digest, Md5};

use crate::matcher;
use crate::outcome::Outcome;
use crate::spec::FileExpectation;

/// Check one file expectation against `base_dir`.
///
/// Always yields the existence outcome first. Content and md5 outcomes follow
/// only when the file should exist and does; a file expected to be absent
/// never has its content evaluated.
pub fn check(expectation: &FileExpectation, base_dir: &Path) -> Vec<Outcome> {
    let path = base_dir.join(&expectation.path);
    let shown = expectation.path.display().to_string();
    let exists = path.exists();

    let mut outcomes = Vec::new();
    if expectation.should_exist {
        outcomes.push(Outcome::check(format!("{} should exist", shown), exists, || {
            format!("'{}' does not exist while it should", path.display())
        }));
    } else {
        outcomes.push(Outcome::check(format!("{} should not exist", shown), !exists, || {
            format!("'{}' does exist while it should not", path.display())
        }));
        return outcomes;
    }

    if !exists {
        return outcomes;
    }

    if !expectation.content.is_unset() {
        let subject = format!("content of '{}'", shown);
        let outcome = match std::fs::read(&path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                matcher::matches(&expectation.content, &subject, text.lines())
            }
            Err(e) => Outcome::fail(
                format!("{} should match {}", subject, expectation.content.kind()),
                format!("failed to read '{}': {}", path.display(), e),
            ),
        };
        outcomes.push(outcome);
    }

    if let Some(ref expected) = expectation.md5sum {
        let description = format!("{} should have md5sum {}", shown, expected);
        let outcome = match file_md5sum(&path) {
            Ok(observed) => Outcome::check(description, observed.eq_ignore_ascii_case(expected), || {
                format!(
                    "Observed md5sum '{}' not equal to expected md5sum '{}' for file '{}'",
                    observed,
                    expected,
                    path.display()
                )
            }),
            Err(e) => Outcome::fail(description, format!("failed to read '{}': {}", path.display(), e)),
        };
        outcomes.push(outcome);
    }

    outcomes
}

/// Lowercase hex md5 digest of a file's contents
pub fn file_md5sum(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}
