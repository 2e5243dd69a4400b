//! # Deploy Check
//!
//! Command-line checks for the deployment scaffolding around the gate.
//!
//! ```bash
//! # Production and test manifests must share one topology
//! deploy-check manifests docker/docker-compose.yml docker/docker-compose.test.yml
//!
//! # What would CI run on this branch if the build failed?
//! deploy-check pipeline .circleci/config.yml --branch master --fail build
//! ```

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use startup_gate::deploy::manifest::{compare, ComposeManifest};
use startup_gate::deploy::{DeployCheckResult, JobOutcome, JobStatus, PipelineConfig};

#[derive(Parser)]
#[command(name = "deploy-check")]
#[command(about = "Validate orchestration manifests and CI gating")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that two manifests differ only in environment values and volumes
    Manifests {
        /// Production manifest
        baseline: PathBuf,
        /// Test manifest
        candidate: PathBuf,
    },

    /// Simulate a CI workflow run for a branch
    Pipeline {
        /// CI configuration file
        config: PathBuf,

        #[arg(short, long)]
        branch: String,

        /// Workflow to simulate (default: all)
        #[arg(short, long)]
        workflow: Option<String>,

        /// Treat this job as failing (repeatable)
        #[arg(long = "fail", value_name = "JOB")]
        failing: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Commands::Manifests {
            baseline,
            candidate,
        } => check_manifests(baseline, candidate),
        Commands::Pipeline {
            config,
            branch,
            workflow,
            failing,
        } => simulate_pipeline(config, branch, workflow.as_deref(), failing),
    };

    match result {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            process::exit(2);
        }
    }
}

fn check_manifests(baseline: &Path, candidate: &Path) -> DeployCheckResult<bool> {
    let comparison = compare(
        &ComposeManifest::from_path(baseline)?,
        &ComposeManifest::from_path(candidate)?,
    );

    for difference in comparison.allowed() {
        println!("  allowed     {difference}");
    }
    for difference in comparison.structural() {
        println!("  STRUCTURAL  {difference}");
    }

    if comparison.is_equivalent() {
        println!(
            "✅ {} and {} share the same topology",
            baseline.display(),
            candidate.display()
        );
        Ok(true)
    } else {
        println!("❌ manifests describe different topologies");
        Ok(false)
    }
}

fn simulate_pipeline(
    path: &Path,
    branch: &str,
    workflow: Option<&str>,
    failing: &[String],
) -> DeployCheckResult<bool> {
    let pipeline = PipelineConfig::from_path(path)?;
    let outcomes: HashMap<String, JobOutcome> = failing
        .iter()
        .map(|job| (job.clone(), JobOutcome::Failure))
        .collect();

    let workflows = match workflow {
        Some(name) => vec![pipeline.workflow(name)?],
        None => pipeline.workflows.iter().collect(),
    };

    let mut all_green = true;
    for workflow in workflows {
        println!("workflow {} on branch '{branch}':", workflow.name);
        for run in workflow.simulate(branch, &outcomes) {
            all_green &= !matches!(run.status, JobStatus::Failed);
            println!("  {run}");
        }
    }
    Ok(all_green)
}
