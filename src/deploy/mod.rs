//! # Deploy Checks
//!
//! Static checks over the deployment scaffolding that surrounds the gate:
//!
//! - [`manifest`]: production and test orchestration manifests must describe
//!   the same service topology
//! - [`pipeline`]: the CI workflow must only deploy after a green build on
//!   the release branch

pub mod manifest;
pub mod pipeline;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use manifest::{ComposeManifest, ManifestComparison, ManifestDifference};
pub use pipeline::{JobOutcome, JobRun, JobStatus, PipelineConfig};

#[derive(Debug, Error)]
pub enum DeployCheckError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in '{context}': {error}")]
    InvalidYaml { context: String, error: String },

    #[error("Workflow '{workflow}' references unknown job '{job}'")]
    UnknownJob { workflow: String, job: String },

    #[error("Workflow '{workflow}' has a dependency cycle through '{job}'")]
    DependencyCycle { workflow: String, job: String },

    #[error("Invalid branch filter '{pattern}': {error}")]
    InvalidBranchFilter { pattern: String, error: String },

    #[error("Workflow '{0}' not found")]
    UnknownWorkflow(String),
}

pub type DeployCheckResult<T> = Result<T, DeployCheckError>;

pub(crate) fn read_file(path: &Path) -> DeployCheckResult<String> {
    std::fs::read_to_string(path).map_err(|source| DeployCheckError::Read {
        path: path.to_path_buf(),
        source,
    })
}
