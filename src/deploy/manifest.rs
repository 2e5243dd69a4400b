//! Orchestration manifest comparison.
//!
//! A production and a test Compose manifest are *equivalent* when they
//! describe the same services wired the same way. Two kinds of drift are
//! expected and allowed:
//!
//! - environment variable **values** (credentials, URLs, flags)
//! - volumes, at service level and top level (tests run without persistence)
//!
//! Anything else (a missing service, a different image, a new port, an
//! extra environment variable, changed `depends_on`) is structural.

use super::{read_file, DeployCheckError, DeployCheckResult};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeManifest {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
    #[serde(default)]
    pub volumes: BTreeMap<String, Value>,
    #[serde(default)]
    pub networks: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub environment: EnvironmentSpec,
    #[serde(default)]
    pub depends_on: DependsOnSpec,
    #[serde(default)]
    pub volumes: Vec<Value>,
    /// image, build, command, ports, networks, ...
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

/// `environment:` as either a mapping or a list of `KEY=VALUE` strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentSpec {
    Map(BTreeMap<String, Option<Value>>),
    List(Vec<String>),
}

impl Default for EnvironmentSpec {
    fn default() -> Self {
        EnvironmentSpec::Map(BTreeMap::new())
    }
}

impl EnvironmentSpec {
    /// Normalized `KEY -> value` view; `None` means passed through from the host
    pub fn to_map(&self) -> BTreeMap<String, Option<String>> {
        match self {
            EnvironmentSpec::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(scalar_to_string)))
                .collect(),
            EnvironmentSpec::List(items) => items
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (item.clone(), None),
                })
                .collect(),
        }
    }
}

/// `depends_on:` as either a list or the long mapping form
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependsOnSpec {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Default for DependsOnSpec {
    fn default() -> Self {
        DependsOnSpec::List(Vec::new())
    }
}

impl DependsOnSpec {
    pub fn services(&self) -> BTreeSet<String> {
        match self {
            DependsOnSpec::List(items) => items.iter().cloned().collect(),
            DependsOnSpec::Map(map) => map.keys().cloned().collect(),
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl ComposeManifest {
    pub fn from_yaml(yaml: &str, context: &str) -> DeployCheckResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| DeployCheckError::InvalidYaml {
            context: context.to_string(),
            error: e.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> DeployCheckResult<Self> {
        Self::from_yaml(&read_file(path)?, &path.display().to_string())
    }
}

/// Which of the two compared manifests something was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Baseline,
    Candidate,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Baseline => write!(f, "baseline"),
            Side::Candidate => write!(f, "candidate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManifestDifference {
    /// Allowed: same variable, different value
    EnvironmentValue { service: String, key: String },
    /// Allowed: volume wiring differs (`service` is `None` for top-level volumes)
    Volumes { service: Option<String> },
    ServiceOnlyIn { service: String, side: Side },
    EnvironmentKeyOnlyIn { service: String, key: String, side: Side },
    DependsOn {
        service: String,
        baseline: BTreeSet<String>,
        candidate: BTreeSet<String>,
    },
    /// Any other service key, e.g. `image`, `build`, `ports`, `command`
    Setting { service: String, key: String },
    Networks,
}

impl ManifestDifference {
    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            ManifestDifference::EnvironmentValue { .. } | ManifestDifference::Volumes { .. }
        )
    }
}

impl fmt::Display for ManifestDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestDifference::EnvironmentValue { service, key } => {
                write!(f, "{service}: environment value of {key} differs")
            }
            ManifestDifference::Volumes { service: Some(service) } => {
                write!(f, "{service}: volumes differ")
            }
            ManifestDifference::Volumes { service: None } => write!(f, "top-level volumes differ"),
            ManifestDifference::ServiceOnlyIn { service, side } => {
                write!(f, "service {service} only exists in the {side}")
            }
            ManifestDifference::EnvironmentKeyOnlyIn { service, key, side } => {
                write!(f, "{service}: environment variable {key} only set in the {side}")
            }
            ManifestDifference::DependsOn {
                service,
                baseline,
                candidate,
            } => write!(
                f,
                "{service}: depends_on differs ({baseline:?} vs {candidate:?})"
            ),
            ManifestDifference::Setting { service, key } => write!(f, "{service}: {key} differs"),
            ManifestDifference::Networks => write!(f, "top-level networks differ"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestComparison {
    pub differences: Vec<ManifestDifference>,
}

impl ManifestComparison {
    pub fn allowed(&self) -> impl Iterator<Item = &ManifestDifference> {
        self.differences.iter().filter(|d| d.is_allowed())
    }

    pub fn structural(&self) -> impl Iterator<Item = &ManifestDifference> {
        self.differences.iter().filter(|d| !d.is_allowed())
    }

    /// Same topology: every difference is an allowed one
    pub fn is_equivalent(&self) -> bool {
        self.structural().next().is_none()
    }
}

/// Compare two manifests service by service.
pub fn compare(baseline: &ComposeManifest, candidate: &ComposeManifest) -> ManifestComparison {
    let mut differences = Vec::new();

    if baseline.volumes != candidate.volumes {
        differences.push(ManifestDifference::Volumes { service: None });
    }
    if baseline.networks != candidate.networks {
        differences.push(ManifestDifference::Networks);
    }

    let names: BTreeSet<&String> = baseline
        .services
        .keys()
        .chain(candidate.services.keys())
        .collect();

    for name in names {
        match (baseline.services.get(name), candidate.services.get(name)) {
            (Some(left), Some(right)) => compare_service(name, left, right, &mut differences),
            (Some(_), None) => differences.push(ManifestDifference::ServiceOnlyIn {
                service: name.clone(),
                side: Side::Baseline,
            }),
            (None, Some(_)) => differences.push(ManifestDifference::ServiceOnlyIn {
                service: name.clone(),
                side: Side::Candidate,
            }),
            (None, None) => {}
        }
    }

    ManifestComparison { differences }
}

fn compare_service(
    service: &str,
    baseline: &ServiceSpec,
    candidate: &ServiceSpec,
    differences: &mut Vec<ManifestDifference>,
) {
    let left_env = baseline.environment.to_map();
    let right_env = candidate.environment.to_map();
    let keys: BTreeSet<&String> = left_env.keys().chain(right_env.keys()).collect();
    for key in keys {
        let difference = match (left_env.get(key), right_env.get(key)) {
            (Some(l), Some(r)) if l != r => ManifestDifference::EnvironmentValue {
                service: service.to_string(),
                key: key.clone(),
            },
            (Some(_), None) => ManifestDifference::EnvironmentKeyOnlyIn {
                service: service.to_string(),
                key: key.clone(),
                side: Side::Baseline,
            },
            (None, Some(_)) => ManifestDifference::EnvironmentKeyOnlyIn {
                service: service.to_string(),
                key: key.clone(),
                side: Side::Candidate,
            },
            _ => continue,
        };
        differences.push(difference);
    }

    if baseline.volumes != candidate.volumes {
        differences.push(ManifestDifference::Volumes {
            service: Some(service.to_string()),
        });
    }

    let left_deps = baseline.depends_on.services();
    let right_deps = candidate.depends_on.services();
    if left_deps != right_deps {
        differences.push(ManifestDifference::DependsOn {
            service: service.to_string(),
            baseline: left_deps,
            candidate: right_deps,
        });
    }

    let keys: BTreeSet<&String> = baseline
        .settings
        .keys()
        .chain(candidate.settings.keys())
        .collect();
    for key in keys {
        if baseline.settings.get(key) != candidate.settings.get(key) {
            differences.push(ManifestDifference::Setting {
                service: service.to_string(),
                key: key.clone(),
            });
        }
    }
}
