//! Summary and deployment gating over real orchestrated runs.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use tiergate_core::run::{AggregateStatus, GateStatus, TriggerContext};
use tiergate_scheduler::{DeployGate, Orchestrator, SummaryGate};
use tiergate_tests::{Behavior, ScriptedEngine, WorkflowFixture};

#[tokio::test]
async fn test_green_run_on_main_deploys_eligible_targets() {
    let outcome = Orchestrator::new(Arc::new(ScriptedEngine::new()))
        .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
        .await
        .unwrap();

    let decision = DeployGate::new().evaluate(&outcome);
    assert!(decision.allowed);
    assert_eq!(decision.targets.len(), 2, "both isolated-env variants match");
    assert!(decision.targets.iter().all(|t| t.tier == "primary"));
    assert!(
        decision
            .targets
            .iter()
            .all(|t| t.coordinate.get("runtime_version").map(|v| v.to_string())
                == Some("v2".to_string()))
    );
}

#[tokio::test]
async fn test_green_run_on_feature_branch_does_not_deploy() {
    let outcome = Orchestrator::new(Arc::new(ScriptedEngine::new()))
        .run(&WorkflowFixture::three_tier(), &TriggerContext::push("feature-x"))
        .await
        .unwrap();

    assert_eq!(outcome.final_status, AggregateStatus::Success);
    let decision = DeployGate::new().evaluate(&outcome);
    assert!(!decision.allowed);
    assert!(decision.targets.is_empty());
}

#[tokio::test]
async fn test_failed_run_never_deploys() {
    let engine = ScriptedEngine::new().job("secondary", 3, Behavior::Fail);
    let outcome = Orchestrator::new(Arc::new(engine))
        .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
        .await
        .unwrap();

    let decision = DeployGate::new().evaluate(&outcome);
    assert!(!decision.allowed);
    assert!(decision.targets.is_empty());
    assert!(decision.reason.contains("summary"));
}

#[tokio::test]
async fn test_gate_reports_skipped_tier_it_requires() {
    let engine = ScriptedEngine::new().job("primary", 0, Behavior::Fail);
    let mut workflow = WorkflowFixture::three_tier();
    workflow.summary.depends_on = Some(vec!["secondary".to_string()]);

    // primary failing skips secondary, which the gate still requires.
    let outcome = Orchestrator::new(Arc::new(engine))
        .run(&workflow, &TriggerContext::push("main"))
        .await
        .unwrap();
    assert_eq!(outcome.gate.status, GateStatus::Failed);
    assert!(outcome.gate.violations[0].contains("skipped"));
    assert!(!DeployGate::new().evaluate(&outcome).allowed);
}

#[tokio::test]
async fn test_gate_is_reevaluable_from_tier_outcomes() {
    let workflow = WorkflowFixture::three_tier();
    let outcome = Orchestrator::new(Arc::new(ScriptedEngine::new().fail_tier("experimental")))
        .run(&workflow, &TriggerContext::push("main"))
        .await
        .unwrap();

    let verdict = SummaryGate::from_workflow(&workflow).evaluate(&outcome.tier_outcomes);
    assert_eq!(verdict.status, outcome.gate.status);
    assert!(verdict.violations.is_empty());

    let strict = SummaryGate::new("strict", vec!["experimental".to_string()]);
    assert_eq!(strict.evaluate(&outcome.tier_outcomes).status, GateStatus::Passed);
}

#[tokio::test]
async fn test_run_outcome_serializes_for_reports() {
    let outcome = Orchestrator::new(Arc::new(ScriptedEngine::new().fail_tier("primary")))
        .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
        .await
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["final_status"], "failure");
    assert_eq!(json["gate"]["status"], "failed");
    assert_eq!(json["tier_outcomes"]["secondary"]["state"], "skipped");
    assert_eq!(
        json["tier_outcomes"]["secondary"]["skip_reason"]["reason"],
        "upstream_failed"
    );
}
