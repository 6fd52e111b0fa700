//! Check outcomes
//!
//! Every checker reports its verdict as an `Outcome` instead of an error, so
//! one failed expectation never hides another.

use std::fmt;

/// A single pass/fail judgment with an explanation on failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// What was checked, e.g. "exit code should be 0"
    pub description: String,
    pub passed: bool,
    /// Why the check failed (None when passed)
    pub detail: Option<String>,
}

impl Outcome {
    pub fn pass(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn fail(description: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }

    /// Build an outcome from a predicate result and a lazily built failure detail
    pub fn check(description: impl Into<String>, passed: bool, detail: impl FnOnce() -> String) -> Self {
        if passed {
            Self::pass(description)
        } else {
            Self::fail(description, detail())
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "ok" } else { "FAILED" };
        write!(f, "{} ... {}", self.description, status)?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}
