//! emx-workflow: declarative workflow testing for command-line tools
//!
//! # Overview
//!
//! A workflow is one shell command plus what is expected of it: an exit
//! code, stdout/stderr content and files it should (or should not) produce.
//! Each workflow runs exactly once in a private working directory; every
//! expectation is then checked against that single frozen result and
//! reported as its own pass/fail `Outcome`.
//!
//! # Workflow files
//!
//! Files named `test*.yml` / `test*.yaml` hold a list of workflows:
//!
//! ```yaml
//! - name: moo file
//!   command: bash -c 'echo moo > moo.txt'
//!   exit_code: 0
//!   stdout:
//!     exact: []
//!   files:
//!     - path: moo.txt
//!       md5sum: e583af1f8b00b53cda87ae9ead880224
//!     - path: cow.txt
//!       should_exist: false
//! ```
//!
//! # Content expectations
//!
//! | Key | Passes when |
//! |-----|-------------|
//! | `exact` | the lines equal the list, in order |
//! | `contains` | every entry occurs in some line, in the listed order |
//! | `must_not_contain` | no line contains any entry |
//! | `regex` | the pattern matches the newline-joined content |
//!
//! Leaving a block out means "not checked", not "empty".

mod error;
mod files;
mod isolation;
pub mod logging;
mod matcher;
mod outcome;
mod runner;
mod session;
mod spec;
mod workflow;

pub use error::{ErrorKind, WorkflowError};
pub use files::{check as check_file, file_md5sum};
pub use isolation::{Isolation, ProjectCopy, TempIsolation, WorkDir};
pub use matcher::matches;
pub use outcome::Outcome;
pub use runner::{is_workflow_file, render_report, RunConfig, RunResult, TestRunner, TestRunnerBuilder};
pub use session::{check_exit_code, run_and_collect, WorkflowReport};
pub use spec::{
    load_workflows, normalize_key, parse_workflows, ContentExpectation, FileExpectation,
    WorkflowSpec, DEFAULT_EXIT_CODE,
};
pub use workflow::{execute, Frozen, WorkflowRun};

// Convenience functions for cargo test integration
pub use runner::{run, run_and_assert, run_and_assert_with};
