//! Matrix expansion for tier job generation.

use tiergate_core::ids::JobId;
use tiergate_core::run::{Coordinate, JobSpec, TriggerContext};
use tiergate_core::workflow::{Axis, DeployPolicy, TierDefinition};
use tracing::{debug, warn};

/// Result of expanding one tier.
#[derive(Debug, Clone)]
pub struct MatrixExpansion {
    pub tier: String,
    pub jobs: Vec<JobSpec>,
    /// Configuration warnings, such as axes with no values.
    pub warnings: Vec<String>,
}

/// Expander for tier matrices.
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a tier into one job per cell of the cartesian product of its axes.
    ///
    /// `deploy` is the allow-list set in force for the tier.
    pub fn expand(
        &self,
        tier: &TierDefinition,
        deploy: &DeployPolicy,
        trigger: &TriggerContext,
    ) -> MatrixExpansion {
        let mut warnings = Vec::new();
        for axis in tier.axes.iter().filter(|a| a.values.is_empty()) {
            let message = format!(
                "axis '{}' in tier '{}' has no values; the tier expands to zero jobs",
                axis.name, tier.name
            );
            warn!(tier = %tier.name, axis = %axis.name, "Matrix axis has no values");
            warnings.push(message);
        }

        let jobs: Vec<JobSpec> = self
            .generate_combinations(&tier.axes)
            .into_iter()
            .enumerate()
            .map(|(index, coordinate)| {
                let deploy_eligible = deploy.is_eligible(&coordinate, &trigger.branch);
                JobSpec {
                    id: JobId::new(),
                    tier: tier.name.clone(),
                    index,
                    display_name: self.format_display_name(tier.display_name(), &coordinate),
                    coordinate,
                    failure_policy: tier.failure_policy,
                    deploy_eligible,
                    branch: trigger.branch.clone(),
                    steps: tier.steps.clone(),
                }
            })
            .collect();

        debug!(tier = %tier.name, jobs = jobs.len(), "Expanded tier matrix");

        MatrixExpansion {
            tier: tier.name.clone(),
            jobs,
            warnings,
        }
    }

    fn generate_combinations(&self, axes: &[Axis]) -> Vec<Coordinate> {
        let mut result = vec![Coordinate::new()];

        for axis in axes {
            let mut new_result = Vec::with_capacity(result.len() * axis.values.len());

            for combo in result {
                for value in &axis.values {
                    new_result.push(combo.clone().with(axis.name.clone(), value.clone()));
                }
            }

            result = new_result;
        }

        result
    }

    fn format_display_name(&self, tier_name: &str, coordinate: &Coordinate) -> String {
        if coordinate.is_empty() {
            return tier_name.to_string();
        }
        format!("{} ({})", tier_name, coordinate)
    }
}

impl Default for MatrixExpander {
    fn default() -> Self {
        Self::new()
    }
}
