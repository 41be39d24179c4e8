//! Workflow definition types.
//!
//! These types represent the user-authored workflow YAML: tiers of matrix
//! jobs, their failure policies and dependencies, the deploy allow-lists and
//! the summary gate.

use crate::run::Coordinate;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    /// Workflow-wide deploy allow-lists, overridable per tier.
    #[serde(default)]
    pub deploy: DeployPolicy,
    pub tiers: Vec<TierDefinition>,
    #[serde(default)]
    pub summary: SummaryGateConfig,
    /// Default per-tier timeout.
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
    /// Default per-job timeout.
    #[serde(default)]
    pub job_timeout_minutes: Option<u32>,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub event: EventType,
    /// Branch patterns; `*` matches any run of characters. Empty matches all.
    #[serde(default)]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Push,
    PullRequest,
    Manual,
    Schedule,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Push => "push",
            EventType::PullRequest => "pull_request",
            EventType::Manual => "manual",
            EventType::Schedule => "schedule",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventType::Push),
            "pull_request" | "pull-request" | "pr" => Ok(EventType::PullRequest),
            "manual" => Ok(EventType::Manual),
            "schedule" | "cron" => Ok(EventType::Schedule),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// How a tier's job failures propagate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failing job fails the tier, blocks dependents and fails the run.
    #[default]
    Required,
    /// Job failures are recorded but the tier always reports success.
    BestEffort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Required => f.write_str("required"),
            FailurePolicy::BestEffort => f.write_str("best_effort"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TierDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Matrix axes, combined by cartesian product in declaration order.
    #[serde(default)]
    pub axes: Vec<Axis>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Opaque step list handed to the execution engine for every job.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Tier-level allow-lists; falls back to the workflow's `deploy`.
    #[serde(default)]
    pub deploy: Option<DeployPolicy>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl TierDefinition {
    /// Number of jobs the tier expands to.
    pub fn job_count(&self) -> usize {
        self.axes.iter().map(|axis| axis.values.len()).product()
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Axis {
    pub name: String,
    pub values: Vec<AxisValue>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = AxisValue>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().collect(),
        }
    }
}

/// A single value on a matrix axis.
///
/// Runtime versions such as `3.10` must be quoted in YAML so they stay strings.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(untagged)]
pub enum AxisValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValue::Bool(b) => write!(f, "{}", b),
            AxisValue::Integer(n) => write!(f, "{}", n),
            AxisValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AxisValue {
    fn from(value: &str) -> Self {
        AxisValue::String(value.to_string())
    }
}

impl From<String> for AxisValue {
    fn from(value: String) -> Self {
        AxisValue::String(value)
    }
}

impl From<bool> for AxisValue {
    fn from(value: bool) -> Self {
        AxisValue::Bool(value)
    }
}

impl From<i64> for AxisValue {
    fn from(value: i64) -> Self {
        AxisValue::Integer(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub name: String,
    pub run: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<String>,
}

fn default_shell() -> String {
    "sh".to_string()
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
            shell: default_shell(),
            env: HashMap::new(),
            working_directory: None,
        }
    }
}

/// Allow-lists deciding which matrix cells may publish.
///
/// A job is deploy-eligible only when its runtime version, its platform and
/// the triggering branch each appear in the matching list. An empty list
/// never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeployPolicy {
    #[serde(default)]
    pub runtime_versions: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default = "default_runtime_axis")]
    pub runtime_axis: String,
    #[serde(default = "default_platform_axis")]
    pub platform_axis: String,
}

fn default_runtime_axis() -> String {
    "runtime_version".to_string()
}

fn default_platform_axis() -> String {
    "platform".to_string()
}

impl Default for DeployPolicy {
    fn default() -> Self {
        Self {
            runtime_versions: vec![],
            platforms: vec![],
            branches: vec![],
            runtime_axis: default_runtime_axis(),
            platform_axis: default_platform_axis(),
        }
    }
}

impl DeployPolicy {
    pub fn is_eligible(&self, coordinate: &Coordinate, branch: &str) -> bool {
        let runtime = coordinate.get(&self.runtime_axis).map(AxisValue::to_string);
        let platform = coordinate.get(&self.platform_axis).map(AxisValue::to_string);

        matches!(runtime, Some(v) if self.runtime_versions.contains(&v))
            && matches!(platform, Some(p) if self.platforms.contains(&p))
            && self.branches.iter().any(|b| b == branch)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SummaryGateConfig {
    #[serde(default = "default_gate_name")]
    pub name: String,
    /// Evaluate even when an upstream tier failed or was skipped.
    #[serde(default = "default_true")]
    pub run_unconditionally: bool,
    /// Tiers the gate waits on; defaults to every `required` tier.
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,
}

fn default_gate_name() -> String {
    "summary".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SummaryGateConfig {
    fn default() -> Self {
        Self {
            name: default_gate_name(),
            run_unconditionally: true,
            depends_on: None,
        }
    }
}

impl WorkflowDefinition {
    /// Parse and validate a workflow from YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let definition: WorkflowDefinition = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a workflow file from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn tier(&self, name: &str) -> Option<&TierDefinition> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Allow-lists in force for a tier.
    pub fn deploy_policy_for<'a>(&'a self, tier: &'a TierDefinition) -> &'a DeployPolicy {
        tier.deploy.as_ref().unwrap_or(&self.deploy)
    }

    pub fn tier_timeout(&self, tier: &TierDefinition) -> Option<Duration> {
        tier.timeout_minutes
            .or(self.timeout_minutes)
            .map(|m| Duration::from_secs(u64::from(m) * 60))
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_minutes
            .map(|m| Duration::from_secs(u64::from(m) * 60))
    }

    /// Tiers whose outcomes feed the summary gate.
    pub fn gating_tiers(&self) -> Vec<String> {
        match &self.summary.depends_on {
            Some(explicit) => explicit.clone(),
            None => self
                .tiers
                .iter()
                .filter(|t| t.failure_policy == FailurePolicy::Required)
                .map(|t| t.name.clone())
                .collect(),
        }
    }

    /// Structural validation. Cycle detection lives with the tier graph.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidWorkflow("workflow name is empty".to_string()));
        }

        let mut names = HashSet::new();
        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(Error::InvalidWorkflow("tier name is empty".to_string()));
            }
            if !names.insert(tier.name.as_str()) {
                return Err(Error::DuplicateTier(tier.name.clone()));
            }

            let mut axes = HashSet::new();
            for axis in &tier.axes {
                if !axes.insert(axis.name.as_str()) {
                    return Err(Error::DuplicateAxis {
                        tier: tier.name.clone(),
                        axis: axis.name.clone(),
                    });
                }
                let mut values = HashSet::new();
                for value in &axis.values {
                    if !values.insert(value) {
                        return Err(Error::DuplicateAxisValue {
                            tier: tier.name.clone(),
                            axis: axis.name.clone(),
                            value: value.to_string(),
                        });
                    }
                }
            }
        }

        for tier in &self.tiers {
            for dep in &tier.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(Error::UnknownDependency {
                        tier: tier.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(deps) = &self.summary.depends_on {
            for dep in deps {
                if !names.contains(dep.as_str()) {
                    return Err(Error::UnknownGateDependency(dep.clone()));
                }
            }
        }

        Ok(())
    }
}
