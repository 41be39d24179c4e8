//! Test fixtures for creating sample workflows.

use tiergate_core::workflow::{
    Axis, AxisValue, DeployPolicy, FailurePolicy, StepDefinition, SummaryGateConfig,
    TierDefinition, WorkflowDefinition,
};

/// Factory for creating test workflows.
pub struct WorkflowFixture;

impl WorkflowFixture {
    /// Workflow around a list of tiers with default gate and no deploy lists.
    pub fn from_tiers(tiers: Vec<TierDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            name: "test-workflow".to_string(),
            version: "1".to_string(),
            description: None,
            triggers: vec![],
            deploy: DeployPolicy::default(),
            tiers,
            summary: SummaryGateConfig::default(),
            timeout_minutes: None,
            job_timeout_minutes: None,
        }
    }

    /// `primary` (required, 2 jobs), `secondary` (required, 4 jobs, after
    /// primary) and `experimental` (best-effort, 1 job, after primary).
    ///
    /// Deploys from `platform=linuxA, runtime_version=v2` on `main`.
    pub fn three_tier() -> WorkflowDefinition {
        let mut workflow = Self::from_tiers(vec![
            TierFixture::new("primary")
                .axis(platform_axis(&["linuxA"]))
                .axis(runtime_axis(&["v2"]))
                .axis(Axis::new(
                    "use_isolated_env",
                    [AxisValue::Bool(true), AxisValue::Bool(false)],
                ))
                .build(),
            TierFixture::new("secondary")
                .after("primary")
                .axis(platform_axis(&["linuxA"]))
                .axis(runtime_axis(&["v1", "v3", "v4", "v5"]))
                .build(),
            TierFixture::new("experimental")
                .best_effort()
                .after("primary")
                .axis(platform_axis(&["linuxA"]))
                .axis(runtime_axis(&["v6"]))
                .build(),
        ]);
        workflow.deploy = DeployPolicy {
            runtime_versions: vec!["v2".to_string()],
            platforms: vec!["linuxA".to_string()],
            branches: vec!["main".to_string()],
            ..Default::default()
        };
        workflow
    }

    /// `a -> b -> c -> d`, all required, one job each.
    pub fn chain() -> WorkflowDefinition {
        Self::from_tiers(vec![
            TierFixture::new("a").build(),
            TierFixture::new("b").after("a").build(),
            TierFixture::new("c").after("b").build(),
            TierFixture::new("d").after("c").build(),
        ])
    }

    /// Two independent root tiers joined by a third.
    pub fn diamond() -> WorkflowDefinition {
        Self::from_tiers(vec![
            TierFixture::new("left").axis(runtime_axis(&["v1", "v2"])).build(),
            TierFixture::new("right").axis(runtime_axis(&["v1", "v2"])).build(),
            TierFixture::new("join").after("left").after("right").build(),
        ])
    }
}

/// Builder for tier definitions.
pub struct TierFixture {
    tier: TierDefinition,
}

impl TierFixture {
    pub fn new(name: &str) -> Self {
        Self {
            tier: TierDefinition {
                name: name.to_string(),
                display_name: None,
                axes: vec![],
                failure_policy: FailurePolicy::Required,
                depends_on: vec![],
                steps: vec![StepDefinition::new("build", format!("echo {}", name))],
                deploy: None,
                timeout_minutes: None,
            },
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.tier.failure_policy = FailurePolicy::BestEffort;
        self
    }

    pub fn after(mut self, tier: &str) -> Self {
        self.tier.depends_on.push(tier.to_string());
        self
    }

    pub fn axis(mut self, axis: Axis) -> Self {
        self.tier.axes.push(axis);
        self
    }

    pub fn deploy(mut self, policy: DeployPolicy) -> Self {
        self.tier.deploy = Some(policy);
        self
    }

    pub fn build(self) -> TierDefinition {
        self.tier
    }
}

pub fn platform_axis(values: &[&str]) -> Axis {
    string_axis("platform", values)
}

pub fn runtime_axis(values: &[&str]) -> Axis {
    string_axis("runtime_version", values)
}

pub fn string_axis(name: &str, values: &[&str]) -> Axis {
    Axis::new(name, values.iter().map(|v| AxisValue::from(*v)))
}
