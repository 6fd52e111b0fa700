//! Integration test: run the YAML workflows under `tests/workflows/` via cargo test
//!
//! Usage:
//!   cargo test --test integration                      # run all
//!   WORKFLOW_VERBOSE=1 cargo test --test integration   # show passing checks
//!
//! Environment variables:
//!   WORKFLOW_VERBOSE=1  print every outcome, not just failures
//!   WORKFLOW_KEEP_WD=1  preserve working directories and stream logs

use std::path::PathBuf;

use emx_workflow::{run_and_collect, TempIsolation};

fn workflows_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/workflows")
}

#[cfg(unix)]
#[test]
fn workflows_all() {
    let dir = workflows_dir();

    if !dir.exists() {
        eprintln!("No workflows directory at: {}", dir.display());
        return;
    }

    emx_workflow::run_and_assert(dir);
}

#[cfg(unix)]
#[test]
fn workflows_parallel_match_sequential() {
    let sequential = emx_workflow::run(workflows_dir()).run().unwrap();
    let parallel = emx_workflow::run(workflows_dir()).jobs(4).run().unwrap();

    let names = |r: &emx_workflow::RunResult| -> Vec<String> {
        r.reports.iter().map(|report| report.name.clone()).collect()
    };
    assert_eq!(names(&sequential), names(&parallel));
    assert_eq!(sequential.outcome_counts(), parallel.outcome_counts());
    assert!(parallel.all_passed());
}

#[test]
fn workflows_listed_without_running() {
    let runner = emx_workflow::run(workflows_dir()).filter("moo").build();
    let names = runner.list_workflows().unwrap();
    assert_eq!(names, vec!["create moo file", "echo moo"]);
}

/// Each case: a single workflow and a message expected among its failures.
#[cfg(unix)]
const FAILURE_CASES: &[(&str, &str)] = &[
    (
        "- name: exit_code\n  command: exit 2\n",
        "The workflow exited with exit code '2' instead of '0'.",
    ),
    (
        "- name: missing_file\n  command: echo moo\n  files:\n    - path: moo\n",
        "/moo' does not exist while it should",
    ),
    (
        "- name: unwanted_file\n  command: touch moo\n  files:\n    - path: moo\n      should_exist: false\n",
        "/moo' does exist while it should not",
    ),
    (
        "- name: md5sum\n  command: echo moo > moo.txt\n  files:\n    - path: moo.txt\n      md5sum: e583af1f8b00b53cda87ae9ead880225\n",
        "Observed md5sum 'e583af1f8b00b53cda87ae9ead880224' not equal to expected md5sum 'e583af1f8b00b53cda87ae9ead880225' for file '",
    ),
    (
        "- name: file_contains\n  command: echo moo > moo.txt\n  files:\n    - path: moo.txt\n      contains: [miaow]\n",
        "'miaow' was not found in content of 'moo.txt' while it should be there",
    ),
    (
        "- name: file_must_not_contain\n  command: echo moo > moo.txt\n  files:\n    - path: moo.txt\n      must_not_contain: [moo]\n",
        "'moo' was found in content of 'moo.txt' while it should not be there",
    ),
    (
        "- name: stdout_contains\n  command: echo moo\n  stdout:\n    contains: [miaow]\n",
        "'miaow' was not found in stdout while it should be there",
    ),
    (
        "- name: stdout_must_not_contain\n  command: echo moo\n  stdout:\n    must_not_contain: [moo]\n",
        "'moo' was found in stdout while it should not be there",
    ),
    (
        "- name: stderr_contains\n  command: \"echo 'Usage: grep' >&2\"\n  stderr:\n    contains: [\"No arguments?\"]\n",
        "'No arguments?' was not found in stderr while it should be there",
    ),
    (
        "- name: stderr_must_not_contain\n  command: \"echo 'Usage: grep' >&2\"\n  stderr:\n    must_not_contain: [\"Usage:\"]\n",
        "'Usage:' was found in stderr while it should not be there",
    ),
    (
        "- name: contains_order\n  command: printf 'b\\na\\n'\n  stdout:\n    contains: [a, b]\n",
        "'b' was not found in stdout after 'a' while it should be there",
    ),
];

#[cfg(unix)]
#[test]
fn failure_messages() {
    for (yaml, message) in FAILURE_CASES {
        let specs = emx_workflow::parse_workflows(yaml).unwrap();
        assert_eq!(specs.len(), 1, "{}", yaml);

        let report = run_and_collect(&specs[0], &TempIsolation::default(), false);
        assert!(!report.passed(), "{} should fail", specs[0].name);

        let details: Vec<&str> = report.failures().filter_map(|o| o.detail.as_deref()).collect();
        assert!(
            details.iter().any(|d| d.contains(message)),
            "{}: expected {:?} in {:?}",
            specs[0].name,
            message,
            details
        );
    }
}
