//! CI workflow model and gating simulation.
//!
//! Reads a CircleCI-style configuration (`jobs` plus `workflows`) and answers
//! "which jobs run for this branch, given these job outcomes?". A job runs
//! only when its branch filter admits the branch and every job it
//! `requires` ran and succeeded.

use super::{read_file, DeployCheckError, DeployCheckResult};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Job names defined at top level
    pub jobs: Vec<String>,
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    /// Jobs in a valid execution order
    pub jobs: Vec<WorkflowJob>,
}

#[derive(Debug, Clone)]
pub struct WorkflowJob {
    pub name: String,
    pub requires: Vec<String>,
    pub branches: BranchFilter,
}

/// CircleCI branch filter: `only` and `ignore` lists of names or `/regex/`
#[derive(Debug, Clone, Default)]
pub struct BranchFilter {
    only: Vec<BranchPattern>,
    ignore: Vec<BranchPattern>,
}

#[derive(Debug, Clone)]
enum BranchPattern {
    Exact(String),
    Regex(Regex),
}

impl BranchPattern {
    fn parse(pattern: &str) -> DeployCheckResult<Self> {
        match pattern
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            Some(expr) => Regex::new(&format!("^(?:{expr})$"))
                .map(BranchPattern::Regex)
                .map_err(|e| DeployCheckError::InvalidBranchFilter {
                    pattern: pattern.to_string(),
                    error: e.to_string(),
                }),
            None => Ok(BranchPattern::Exact(pattern.to_string())),
        }
    }

    fn matches(&self, branch: &str) -> bool {
        match self {
            BranchPattern::Exact(name) => name == branch,
            BranchPattern::Regex(regex) => regex.is_match(branch),
        }
    }
}

impl BranchFilter {
    pub fn only(patterns: &[&str]) -> DeployCheckResult<Self> {
        Ok(Self {
            only: patterns
                .iter()
                .map(|p| BranchPattern::parse(p))
                .collect::<DeployCheckResult<_>>()?,
            ignore: Vec::new(),
        })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.only.is_empty() && self.ignore.is_empty()
    }

    pub fn admits(&self, branch: &str) -> bool {
        if self.ignore.iter().any(|p| p.matches(branch)) {
            return false;
        }
        self.only.is_empty() || self.only.iter().any(|p| p.matches(branch))
    }
}

/// Simulated result of a job that actually runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobOutcome {
    #[default]
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed,
    /// The branch filter excluded this job
    FilteredOut,
    /// A required job did not succeed
    Blocked { by: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job: String,
    pub status: JobStatus,
}

impl fmt::Display for JobRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            JobStatus::Succeeded => write!(f, "{}: succeeded", self.job),
            JobStatus::Failed => write!(f, "{}: failed", self.job),
            JobStatus::FilteredOut => write!(f, "{}: skipped (branch filter)", self.job),
            JobStatus::Blocked { by } => write!(f, "{}: skipped ({by} did not succeed)", self.job),
        }
    }
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default)]
    jobs: BTreeMap<String, Value>,
    #[serde(default)]
    workflows: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawWorkflow {
    #[serde(default)]
    jobs: Vec<RawWorkflowJob>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWorkflowJob {
    Name(String),
    Configured(BTreeMap<String, Option<RawJobSettings>>),
}

#[derive(Deserialize, Default)]
struct RawJobSettings {
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    filters: RawFilters,
}

#[derive(Deserialize, Default)]
struct RawFilters {
    #[serde(default)]
    branches: RawBranchFilter,
}

#[derive(Deserialize, Default)]
struct RawBranchFilter {
    #[serde(default)]
    only: OneOrMany,
    #[serde(default)]
    ignore: OneOrMany,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    fn into_patterns(self) -> DeployCheckResult<Vec<BranchPattern>> {
        let items = match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        };
        items.iter().map(|p| BranchPattern::parse(p)).collect()
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str, context: &str) -> DeployCheckResult<Self> {
        let invalid = |e: serde_yaml::Error| DeployCheckError::InvalidYaml {
            context: context.to_string(),
            error: e.to_string(),
        };

        let raw: RawPipeline = serde_yaml::from_str(yaml).map_err(invalid)?;
        let jobs: Vec<String> = raw.jobs.keys().cloned().collect();

        let mut workflows = Vec::new();
        for (name, value) in raw.workflows {
            // `workflows.version` sits next to the workflow definitions
            if !value.is_mapping() {
                continue;
            }
            let workflow: RawWorkflow = serde_yaml::from_value(value).map_err(invalid)?;
            workflows.push(build_workflow(name, workflow, &jobs)?);
        }

        Ok(Self { jobs, workflows })
    }

    pub fn from_path(path: &Path) -> DeployCheckResult<Self> {
        Self::from_yaml(&read_file(path)?, &path.display().to_string())
    }

    pub fn workflow(&self, name: &str) -> DeployCheckResult<&Workflow> {
        self.workflows
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| DeployCheckError::UnknownWorkflow(name.to_string()))
    }
}

fn build_workflow(name: String, raw: RawWorkflow, defined: &[String]) -> DeployCheckResult<Workflow> {
    let mut jobs = Vec::with_capacity(raw.jobs.len());
    for entry in raw.jobs {
        let configured: Vec<(String, RawJobSettings)> = match entry {
            RawWorkflowJob::Name(job) => vec![(job, RawJobSettings::default())],
            RawWorkflowJob::Configured(map) => map
                .into_iter()
                .map(|(job, settings)| (job, settings.unwrap_or_default()))
                .collect(),
        };
        for (job, settings) in configured {
            if !defined.contains(&job) {
                return Err(DeployCheckError::UnknownJob {
                    workflow: name,
                    job,
                });
            }
            jobs.push(WorkflowJob {
                name: job,
                requires: settings.requires,
                branches: BranchFilter {
                    only: settings.filters.branches.only.into_patterns()?,
                    ignore: settings.filters.branches.ignore.into_patterns()?,
                },
            });
        }
    }

    let jobs = topological_order(&name, jobs)?;
    Ok(Workflow { name, jobs })
}

/// Kahn's algorithm, keeping declaration order among independent jobs.
fn topological_order(workflow: &str, jobs: Vec<WorkflowJob>) -> DeployCheckResult<Vec<WorkflowJob>> {
    let index: HashMap<&str, usize> = jobs
        .iter()
        .enumerate()
        .map(|(i, job)| (job.name.as_str(), i))
        .collect();

    let mut pending = vec![0usize; jobs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); jobs.len()];
    for (i, job) in jobs.iter().enumerate() {
        for required in &job.requires {
            let Some(&r) = index.get(required.as_str()) else {
                return Err(DeployCheckError::UnknownJob {
                    workflow: workflow.to_string(),
                    job: required.clone(),
                });
            };
            pending[i] += 1;
            dependents[r].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..jobs.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(jobs.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.push_back(d);
            }
        }
    }

    if order.len() != jobs.len() {
        let stuck = (0..jobs.len())
            .find(|i| !order.contains(i))
            .map(|i| jobs[i].name.clone())
            .unwrap_or_default();
        return Err(DeployCheckError::DependencyCycle {
            workflow: workflow.to_string(),
            job: stuck,
        });
    }

    let mut slots: Vec<Option<WorkflowJob>> = jobs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

impl Workflow {
    /// Simulate a run on `branch`; jobs missing from `outcomes` succeed.
    pub fn simulate(&self, branch: &str, outcomes: &HashMap<String, JobOutcome>) -> Vec<JobRun> {
        let mut statuses: HashMap<&str, JobStatus> = HashMap::new();
        let mut runs = Vec::with_capacity(self.jobs.len());

        for job in &self.jobs {
            let blocked_by = job
                .requires
                .iter()
                .find(|r| statuses.get(r.as_str()) != Some(&JobStatus::Succeeded));

            let status = if !job.branches.admits(branch) {
                JobStatus::FilteredOut
            } else if let Some(by) = blocked_by {
                JobStatus::Blocked { by: by.clone() }
            } else {
                match outcomes.get(&job.name).copied().unwrap_or_default() {
                    JobOutcome::Success => JobStatus::Succeeded,
                    JobOutcome::Failure => JobStatus::Failed,
                }
            };

            statuses.insert(job.name.as_str(), status.clone());
            runs.push(JobRun {
                job: job.name.clone(),
                status,
            });
        }

        runs
    }
}
