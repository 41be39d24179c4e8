//! Workflows run end to end through the host shell.

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tiergate_core::run::{AggregateStatus, TierState, TriggerContext};
use tiergate_core::workflow::WorkflowDefinition;
use tiergate_runner::{RunnerConfig, ShellEngine};
use tiergate_scheduler::{DeployGate, Orchestrator};
use tiergate_tests::{RecordingEventSink, init_test_logging};

const WORKFLOW: &str = r#"
name: shell-matrix
deploy:
  runtime_versions: ["v2"]
  platforms: ["linuxA"]
  branches: ["main"]
tiers:
  - name: primary
    axes:
      - name: platform
        values: [linuxA]
      - name: runtime_version
        values: [v2]
    steps:
      - name: record
        run: echo "${{ matrix.runtime_version }} $TIERGATE_DEPLOY_ELIGIBLE" > primary.txt
  - name: secondary
    depends_on: [primary]
    axes:
      - name: runtime_version
        values: [v1, v3]
    steps:
      - name: record
        run: touch "secondary-${{ matrix.runtime_version }}.txt"
  - name: experimental
    failure_policy: best_effort
    depends_on: [primary]
    steps:
      - name: broken
        run: exit 7
"#;

fn engine(dir: &tempfile::TempDir) -> Arc<ShellEngine> {
    Arc::new(ShellEngine::new(RunnerConfig {
        workspace: dir.path().to_path_buf(),
        ..Default::default()
    }))
}

#[tokio::test]
async fn test_shell_workflow_passes_despite_best_effort_failure() -> Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let workflow = WorkflowDefinition::from_yaml(WORKFLOW)?;
    let sink = Arc::new(RecordingEventSink::new());

    let outcome = Orchestrator::new(engine(&dir))
        .with_event_sink(sink.clone())
        .run(&workflow, &TriggerContext::push("main"))
        .await?;

    assert_eq!(outcome.final_status, AggregateStatus::Success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("primary.txt"))?,
        "v2 true\n"
    );
    assert!(dir.path().join("secondary-v1.txt").exists());
    assert!(dir.path().join("secondary-v3.txt").exists());

    let experimental = outcome.tier("experimental").unwrap();
    assert_eq!(experimental.failed(), 1);
    assert_eq!(
        experimental.job_results[0].message.as_deref(),
        Some("step 'broken' exited with code 7")
    );

    let decision = DeployGate::new().evaluate(&outcome);
    assert!(decision.allowed);
    assert_eq!(decision.targets.len(), 1);
    assert_eq!(sink.count("job.completed."), 4);
    Ok(())
}

#[tokio::test]
async fn test_shell_failure_in_primary_skips_everything_downstream() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let yaml = WORKFLOW.replace(
        r#"run: echo "${{ matrix.runtime_version }} $TIERGATE_DEPLOY_ELIGIBLE" > primary.txt"#,
        "run: exit 1",
    );
    let workflow = WorkflowDefinition::from_yaml(&yaml)?;

    let outcome = Orchestrator::new(engine(&dir))
        .run(&workflow, &TriggerContext::push("main"))
        .await?;

    assert_eq!(outcome.final_status, AggregateStatus::Failure);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.tier("secondary").unwrap().state, TierState::Skipped);
    assert_eq!(outcome.tier("experimental").unwrap().state, TierState::Skipped);
    assert!(!dir.path().join("secondary-v1.txt").exists());
    assert!(!DeployGate::new().evaluate(&outcome).allowed);
    Ok(())
}
