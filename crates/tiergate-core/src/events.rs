//! Lifecycle events emitted while a run progresses.

use crate::ids::{JobId, RunId};
use crate::run::{AggregateStatus, Coordinate, GateStatus, JobStatus, TierState};
use crate::workflow::{EventType, FailurePolicy};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All events in a Tiergate run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Run lifecycle
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),

    // Tier lifecycle
    TierStarted(TierStartedPayload),
    TierSkipped(TierSkippedPayload),
    TierCompleted(TierCompletedPayload),

    // Jobs
    JobDispatched(JobDispatchedPayload),
    JobCompleted(JobCompletedPayload),

    // Gate
    GateEvaluated(GateEvaluatedPayload),
}

impl Event {
    /// Returns the routing subject for this event.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.started.{}", p.run_id),
            Event::RunCompleted(p) => format!("run.completed.{}", p.run_id),
            Event::TierStarted(p) => format!("tier.started.{}.{}", p.run_id, p.tier),
            Event::TierSkipped(p) => format!("tier.skipped.{}.{}", p.run_id, p.tier),
            Event::TierCompleted(p) => format!("tier.completed.{}.{}", p.run_id, p.tier),
            Event::JobDispatched(p) => format!("job.dispatched.{}.{}", p.run_id, p.job_id),
            Event::JobCompleted(p) => format!("job.completed.{}.{}", p.run_id, p.job_id),
            Event::GateEvaluated(p) => format!("gate.evaluated.{}", p.run_id),
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted(p) => p.run_id,
            Event::RunCompleted(p) => p.run_id,
            Event::TierStarted(p) => p.run_id,
            Event::TierSkipped(p) => p.run_id,
            Event::TierCompleted(p) => p.run_id,
            Event::JobDispatched(p) => p.run_id,
            Event::JobCompleted(p) => p.run_id,
            Event::GateEvaluated(p) => p.run_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub workflow: String,
    pub branch: String,
    pub event: EventType,
    pub tiers: Vec<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub final_status: AggregateStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TierStartedPayload {
    pub run_id: RunId,
    pub tier: String,
    pub failure_policy: FailurePolicy,
    pub job_count: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TierSkippedPayload {
    pub run_id: RunId,
    pub tier: String,
    pub upstream: Vec<String>,
    pub skipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TierCompletedPayload {
    pub run_id: RunId,
    pub tier: String,
    pub state: TierState,
    pub aggregate_status: AggregateStatus,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDispatchedPayload {
    pub run_id: RunId,
    pub tier: String,
    pub job_id: JobId,
    pub display_name: String,
    pub coordinate: Coordinate,
    pub deploy_eligible: bool,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub tier: String,
    pub job_id: JobId,
    pub display_name: String,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GateEvaluatedPayload {
    pub run_id: RunId,
    pub gate: String,
    pub status: GateStatus,
    pub violations: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_and_tag() {
        let run_id = RunId::new();
        let event = Event::TierSkipped(TierSkippedPayload {
            run_id,
            tier: "secondary".into(),
            upstream: vec!["primary".into()],
            skipped_at: Utc::now(),
        });

        assert_eq!(event.subject(), format!("tier.skipped.{}.secondary", run_id));
        assert_eq!(event.run_id(), run_id);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tier_skipped");
        assert_eq!(json["upstream"][0], "primary");
    }
}
