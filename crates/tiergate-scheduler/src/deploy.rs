//! Deployment gating on top of the summary gate.

use serde::Serialize;
use tiergate_core::ids::JobId;
use tiergate_core::run::{Coordinate, RunOutcome};

/// A job authorized to publish.
#[derive(Debug, Clone, Serialize)]
pub struct DeployTarget {
    pub tier: String,
    pub job_id: JobId,
    pub display_name: String,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployDecision {
    pub allowed: bool,
    pub targets: Vec<DeployTarget>,
    pub reason: String,
}

/// Decides which jobs of a finished run may publish.
///
/// Nothing deploys unless the run passed its summary gate. Only jobs that are
/// deploy-eligible and succeeded are authorized.
pub struct DeployGate;

impl DeployGate {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, outcome: &RunOutcome) -> DeployDecision {
        if !outcome.is_success() {
            return DeployDecision {
                allowed: false,
                targets: vec![],
                reason: format!("summary gate '{}' did not pass", outcome.gate.gate),
            };
        }

        let targets: Vec<DeployTarget> = outcome
            .job_results()
            .filter(|r| r.job.deploy_eligible && r.status.is_success())
            .map(|r| DeployTarget {
                tier: r.job.tier.clone(),
                job_id: r.job.id,
                display_name: r.job.display_name.clone(),
                coordinate: r.job.coordinate.clone(),
            })
            .collect();

        if targets.is_empty() {
            return DeployDecision {
                allowed: false,
                targets,
                reason: format!(
                    "no deploy-eligible job succeeded on branch '{}'",
                    outcome.trigger.branch
                ),
            };
        }

        DeployDecision {
            allowed: true,
            reason: format!("{} job(s) authorized to deploy", targets.len()),
            targets,
        }
    }
}

impl Default for DeployGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tiergate_core::ids::RunId;
    use tiergate_core::run::{
        AggregateStatus, GateStatus, GateVerdict, JobReport, JobResult, JobSpec, TierOutcome,
        TriggerContext,
    };
    use tiergate_core::workflow::FailurePolicy;

    fn job(index: usize, deploy_eligible: bool) -> JobSpec {
        JobSpec {
            id: JobId::new(),
            tier: "primary".into(),
            index,
            coordinate: Coordinate::new().with("runtime_version", format!("v{}", index)),
            failure_policy: FailurePolicy::Required,
            deploy_eligible,
            display_name: format!("primary #{}", index),
            branch: "main".into(),
            steps: vec![],
        }
    }

    fn run_outcome(results: Vec<JobResult>, gate_status: GateStatus) -> RunOutcome {
        let tier = TierOutcome::completed("primary", FailurePolicy::Required, results, 1);
        let gate = GateVerdict {
            gate: "summary".into(),
            status: gate_status,
            depends_on: vec!["primary".into()],
            violations: vec![],
            message: String::new(),
        };
        let now = Utc::now();
        RunOutcome {
            run_id: RunId::new(),
            workflow: "wf".into(),
            trigger: TriggerContext::push("main"),
            tier_outcomes: BTreeMap::from([("primary".to_string(), tier)]),
            final_status: gate.final_status(),
            gate,
            started_at: now,
            completed_at: now,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_only_eligible_successful_jobs_deploy() {
        let outcome = run_outcome(
            vec![
                JobResult::from_report(job(0, false), JobReport::success(), 1),
                JobResult::from_report(job(1, true), JobReport::success(), 1),
            ],
            GateStatus::Passed,
        );
        let decision = DeployGate::new().evaluate(&outcome);
        assert!(decision.allowed);
        assert_eq!(decision.targets.len(), 1);
        assert_eq!(decision.targets[0].display_name, "primary #1");
    }

    #[test]
    fn test_failed_run_never_deploys() {
        let outcome = run_outcome(
            vec![JobResult::from_report(job(0, true), JobReport::success(), 1)],
            GateStatus::Failed,
        );
        assert_eq!(outcome.final_status, AggregateStatus::Failure);
        let decision = DeployGate::new().evaluate(&outcome);
        assert!(!decision.allowed);
        assert!(decision.targets.is_empty());
    }

    #[test]
    fn test_no_eligible_job() {
        let outcome = run_outcome(
            vec![JobResult::from_report(job(0, false), JobReport::success(), 1)],
            GateStatus::Passed,
        );
        let decision = DeployGate::new().evaluate(&outcome);
        assert!(!decision.allowed);
        assert!(decision.reason.contains("main"));
    }
}
