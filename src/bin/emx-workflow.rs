//! emx-workflow CLI
//!
//! Run declarative workflow tests from YAML files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use emx_workflow::{render_report, RunConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "emx-workflow")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Run workflow tests declared in YAML files")]
struct Cli {
    /// Directory or workflow file to test
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Only run workflows whose name contains this string
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Verbose output: show passing checks and debug logs
    #[arg(short, long)]
    verbose: bool,

    /// Keep working directories and save stdout/stderr in them
    #[arg(short = 'k', long = "keep-workflow-wd")]
    keep: bool,

    /// Root directory for working directories
    #[arg(long = "workdir")]
    workdir: Option<PathBuf>,

    /// Project tree copied into every working directory
    #[arg(long = "project-root")]
    project_root: Option<PathBuf>,

    /// Number of workflows to run at the same time
    #[arg(short = 'j', long, default_value_t = 1)]
    jobs: usize,

    /// Show number of workflows without running
    #[arg(long = "count")]
    count: bool,

    /// List workflow names without running
    #[arg(long = "list")]
    list: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    emx_workflow::logging::init(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = RunConfig {
        dir: cli.path.clone(),
        filter: cli.filter,
        project_root: cli.project_root,
        workdir_root: cli.workdir,
        keep_workdir: cli.keep,
        verbose: cli.verbose,
        jobs: cli.jobs,
    };
    let verbose = config.verbose;
    let runner = TestRunner::new(config);

    if cli.count {
        let count = runner
            .count_workflows()
            .with_context(|| format!("failed to load workflows from {}", cli.path.display()))?;
        println!("Found {} workflow(s)", count);
        return Ok(true);
    }

    if cli.list {
        let names = runner
            .list_workflows()
            .with_context(|| format!("failed to load workflows from {}", cli.path.display()))?;
        for name in names {
            println!("{}", name);
        }
        return Ok(true);
    }

    let result = runner
        .run_all()
        .with_context(|| format!("failed to run workflows from {}", cli.path.display()))?;

    for report in &result.reports {
        print!("{}", render_report(report, verbose));
    }

    println!();
    println!("{}", result.summary());

    Ok(result.all_passed())
}
