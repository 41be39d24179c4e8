//! Run and execution types.

use crate::ids::{JobId, RunId};
use crate::workflow::{AxisValue, EventType, FailurePolicy, StepDefinition};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// What caused the run: the branch and the event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TriggerContext {
    pub branch: String,
    pub event: EventType,
}

impl TriggerContext {
    pub fn new(branch: impl Into<String>, event: EventType) -> Self {
        Self {
            branch: branch.into(),
            event,
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(branch, EventType::Push)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CoordinateEntry {
    pub axis: String,
    pub value: AxisValue,
}

/// One cell of a matrix: axis values in axis declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Coordinate(Vec<CoordinateEntry>);

impl Coordinate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, axis: impl Into<String>, value: impl Into<AxisValue>) {
        self.0.push(CoordinateEntry {
            axis: axis.into(),
            value: value.into(),
        });
    }

    pub fn with(mut self, axis: impl Into<String>, value: impl Into<AxisValue>) -> Self {
        self.push(axis, value);
        self
    }

    pub fn get(&self, axis: &str) -> Option<&AxisValue> {
        self.0.iter().find(|e| e.axis == axis).map(|e| &e.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AxisValue)> {
        self.0.iter().map(|e| (e.axis.as_str(), &e.value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(axis, value)| format!("{}={}", axis, value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// A concrete unit of work produced by matrix expansion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    pub id: JobId,
    pub tier: String,
    /// Position within the tier, in expansion order.
    pub index: usize,
    pub coordinate: Coordinate,
    pub failure_policy: FailurePolicy,
    pub deploy_eligible: bool,
    pub display_name: String,
    /// Branch of the triggering event.
    pub branch: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure,
    Cancelled,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => f.write_str("success"),
            JobStatus::Failure => f.write_str("failure"),
            JobStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// What an execution engine reports for a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub status: JobStatus,
    pub message: Option<String>,
    /// The engine gave up on the job after its own time limit.
    #[serde(default)]
    pub timed_out: bool,
}

impl JobReport {
    pub fn success() -> Self {
        Self {
            status: JobStatus::Success,
            message: None,
            timed_out: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failure,
            message: Some(message.into()),
            timed_out: false,
        }
    }

    /// A failure caused by a time limit enforced inside the engine.
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(message)
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            message: Some(message.into()),
            timed_out: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub job: JobSpec,
    pub status: JobStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub timed_out: bool,
}

impl JobResult {
    pub fn from_report(job: JobSpec, report: JobReport, duration_ms: u64) -> Self {
        Self {
            job,
            status: report.status,
            message: report.message,
            duration_ms,
            timed_out: report.timed_out,
        }
    }

    pub fn timed_out(job: JobSpec, limit: Duration, duration_ms: u64) -> Self {
        Self {
            job,
            status: JobStatus::Failure,
            message: Some(format!("timed out after {:?}", limit)),
            duration_ms,
            timed_out: true,
        }
    }

    /// A job whose engine call errored or panicked.
    pub fn errored(job: JobSpec, reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            job,
            status: JobStatus::Failure,
            message: Some(reason.into()),
            duration_ms,
            timed_out: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TierState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TierState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TierState::Succeeded | TierState::Failed | TierState::Skipped
        )
    }
}

impl fmt::Display for TierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierState::Pending => f.write_str("pending"),
            TierState::Running => f.write_str("running"),
            TierState::Succeeded => f.write_str("succeeded"),
            TierState::Failed => f.write_str("failed"),
            TierState::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Success,
    Failure,
}

impl AggregateStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AggregateStatus::Success)
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateStatus::Success => f.write_str("success"),
            AggregateStatus::Failure => f.write_str("failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    UpstreamFailed { upstream: Vec<String> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpstreamFailed { upstream } => {
                write!(f, "upstream failed: {}", upstream.join(", "))
            }
        }
    }
}

/// Terminal record of one tier.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TierOutcome {
    pub tier: String,
    pub failure_policy: FailurePolicy,
    pub state: TierState,
    pub aggregate_status: AggregateStatus,
    pub job_results: Vec<JobResult>,
    pub skip_reason: Option<SkipReason>,
    pub duration_ms: u64,
    /// Set when the tier could not be carried through to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TierOutcome {
    /// Aggregate job results under the tier's failure policy.
    ///
    /// Required tiers fail when any job did not succeed; best-effort tiers
    /// always aggregate to success. A tier with no jobs succeeds.
    pub fn completed(
        tier: impl Into<String>,
        failure_policy: FailurePolicy,
        job_results: Vec<JobResult>,
        duration_ms: u64,
    ) -> Self {
        let aggregate_status = Self::aggregate(failure_policy, &job_results);
        let state = match aggregate_status {
            AggregateStatus::Success => TierState::Succeeded,
            AggregateStatus::Failure => TierState::Failed,
        };
        Self {
            tier: tier.into(),
            failure_policy,
            state,
            aggregate_status,
            job_results,
            skip_reason: None,
            duration_ms,
            error: None,
        }
    }

    /// A tier whose task died before producing results.
    ///
    /// Fails under either policy: nothing is known about its jobs.
    pub fn crashed(
        tier: impl Into<String>,
        failure_policy: FailurePolicy,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tier: tier.into(),
            failure_policy,
            state: TierState::Failed,
            aggregate_status: AggregateStatus::Failure,
            job_results: vec![],
            skip_reason: None,
            duration_ms: 0,
            error: Some(error.into()),
        }
    }

    pub fn skipped(
        tier: impl Into<String>,
        failure_policy: FailurePolicy,
        upstream: Vec<String>,
    ) -> Self {
        Self {
            tier: tier.into(),
            failure_policy,
            state: TierState::Skipped,
            aggregate_status: AggregateStatus::Failure,
            job_results: vec![],
            skip_reason: Some(SkipReason::UpstreamFailed { upstream }),
            duration_ms: 0,
            error: None,
        }
    }

    pub fn aggregate(policy: FailurePolicy, results: &[JobResult]) -> AggregateStatus {
        match policy {
            FailurePolicy::BestEffort => AggregateStatus::Success,
            FailurePolicy::Required => {
                if results.iter().all(|r| r.status.is_success()) {
                    AggregateStatus::Success
                } else {
                    AggregateStatus::Failure
                }
            }
        }
    }

    pub fn passed(&self) -> usize {
        self.job_results
            .iter()
            .filter(|r| r.status.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.job_results.len() - self.passed()
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.job_results.iter().filter(|r| !r.status.is_success())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    Failed,
    /// Not evaluated because an upstream tier failed and the gate is conditional.
    Skipped,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateStatus::Passed => f.write_str("passed"),
            GateStatus::Failed => f.write_str("failed"),
            GateStatus::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GateVerdict {
    pub gate: String,
    pub status: GateStatus,
    pub depends_on: Vec<String>,
    /// One entry per dependency that did not succeed.
    pub violations: Vec<String>,
    pub message: String,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    /// Only a passed gate yields success; a skipped gate is a failure.
    pub fn final_status(&self) -> AggregateStatus {
        if self.passed() {
            AggregateStatus::Success
        } else {
            AggregateStatus::Failure
        }
    }
}

/// Terminal record of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub workflow: String,
    pub trigger: TriggerContext,
    pub tier_outcomes: BTreeMap<String, TierOutcome>,
    pub gate: GateVerdict,
    pub final_status: AggregateStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.final_status.is_success()
    }

    /// Process exit code for the run: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn tier(&self, name: &str) -> Option<&TierOutcome> {
        self.tier_outcomes.get(name)
    }

    pub fn job_results(&self) -> impl Iterator<Item = &JobResult> {
        self.tier_outcomes.values().flat_map(|t| t.job_results.iter())
    }
}
