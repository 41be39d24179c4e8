//! Summary gate: composes tier outcomes into the run's single pass/fail signal.

use std::collections::BTreeMap;
use tiergate_core::run::{GateStatus, GateVerdict, TierOutcome, TierState};
use tiergate_core::workflow::WorkflowDefinition;

#[derive(Debug, Clone)]
pub struct SummaryGate {
    name: String,
    depends_on: Vec<String>,
    run_unconditionally: bool,
}

impl SummaryGate {
    pub fn new(name: impl Into<String>, depends_on: Vec<String>) -> Self {
        Self {
            name: name.into(),
            depends_on,
            run_unconditionally: true,
        }
    }

    pub fn run_unconditionally(mut self, enabled: bool) -> Self {
        self.run_unconditionally = enabled;
        self
    }

    /// Gate over the workflow's gating tiers: the explicit `summary.depends_on`
    /// list, or every required tier.
    pub fn from_workflow(workflow: &WorkflowDefinition) -> Self {
        Self::new(workflow.summary.name.clone(), workflow.gating_tiers())
            .run_unconditionally(workflow.summary.run_unconditionally)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn is_unconditional(&self) -> bool {
        self.run_unconditionally
    }

    /// Passes iff every depended-on tier has aggregate success.
    ///
    /// A conditional gate whose dependencies did not all succeed reports
    /// `Skipped` instead of `Failed`; both count as failure.
    pub fn evaluate(&self, outcomes: &BTreeMap<String, TierOutcome>) -> GateVerdict {
        let violations: Vec<String> = self
            .depends_on
            .iter()
            .filter_map(|tier| match outcomes.get(tier) {
                None => Some(format!("tier '{}' has no outcome", tier)),
                Some(outcome) if outcome.aggregate_status.is_success() => None,
                Some(outcome) if outcome.state == TierState::Skipped => {
                    let reason = outcome
                        .skip_reason
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "not run".to_string());
                    Some(format!("tier '{}' was skipped ({})", tier, reason))
                }
                Some(outcome) => Some(format!(
                    "tier '{}' failed ({} of {} jobs failed)",
                    tier,
                    outcome.failed(),
                    outcome.job_results.len()
                )),
            })
            .collect();

        let (status, message) = if violations.is_empty() {
            (
                GateStatus::Passed,
                format!("all {} gating tiers succeeded", self.depends_on.len()),
            )
        } else if self.run_unconditionally {
            (
                GateStatus::Failed,
                format!(
                    "{} of {} gating tiers did not succeed",
                    violations.len(),
                    self.depends_on.len()
                ),
            )
        } else {
            (
                GateStatus::Skipped,
                "not evaluated: an upstream tier did not succeed".to_string(),
            )
        };

        GateVerdict {
            gate: self.name.clone(),
            status,
            depends_on: self.depends_on.clone(),
            violations,
            message,
        }
    }
}
