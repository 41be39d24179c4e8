//! End-to-end orchestration against a scripted execution engine.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tiergate_core::Error;
use tiergate_core::run::{
    AggregateStatus, GateStatus, JobStatus, SkipReason, TierState, TriggerContext,
};
use tiergate_core::workflow::WorkflowDefinition;
use tiergate_scheduler::{DagBuilder, Orchestrator, OrchestratorConfig};
use tiergate_tests::{
    Behavior, FailingEventSink, PanickingEventSink, RecordingEventSink, ScriptedEngine,
    TierFixture, WorkflowFixture, init_test_logging, runtime_axis,
};

async fn run(
    engine: Arc<ScriptedEngine>,
    workflow: &WorkflowDefinition,
) -> tiergate_core::run::RunOutcome {
    Orchestrator::new(engine)
        .run(workflow, &TriggerContext::push("main"))
        .await
        .expect("run should not fail with a configuration error")
}

#[tokio::test]
async fn test_best_effort_failures_do_not_fail_the_run() {
    init_test_logging();
    let engine = Arc::new(ScriptedEngine::new().fail_tier("experimental"));

    let outcome = run(engine.clone(), &WorkflowFixture::three_tier()).await;

    assert_eq!(outcome.final_status, AggregateStatus::Success);
    assert_eq!(outcome.exit_code(), 0);

    let experimental = outcome.tier("experimental").unwrap();
    assert_eq!(experimental.state, TierState::Succeeded);
    assert_eq!(experimental.aggregate_status, AggregateStatus::Success);
    assert_eq!(experimental.failed(), 1, "raw failures stay visible");

    assert_eq!(outcome.tier("primary").unwrap().job_results.len(), 2);
    assert_eq!(outcome.tier("secondary").unwrap().job_results.len(), 4);
    assert_eq!(engine.dispatched().len(), 7);
}

#[tokio::test]
async fn test_one_failing_primary_job_skips_dependents() {
    init_test_logging();
    let engine = Arc::new(ScriptedEngine::new().job("primary", 1, Behavior::Fail));

    let outcome = run(engine.clone(), &WorkflowFixture::three_tier()).await;

    assert_eq!(outcome.final_status, AggregateStatus::Failure);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.tier("primary").unwrap().state, TierState::Failed);

    for tier in ["secondary", "experimental"] {
        let skipped = outcome.tier(tier).unwrap();
        assert_eq!(skipped.state, TierState::Skipped);
        assert_eq!(
            skipped.skip_reason,
            Some(SkipReason::UpstreamFailed {
                upstream: vec!["primary".to_string()]
            })
        );
        assert!(engine.dispatched_for(tier).is_empty(), "{} must never run", tier);
    }
}

#[tokio::test]
async fn test_single_failure_fails_required_tier_at_any_position() {
    for size in 1..=5 {
        for failing in 0..size {
            let values: Vec<String> = (0..size).map(|i| format!("v{}", i)).collect();
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let workflow = WorkflowFixture::from_tiers(vec![
                TierFixture::new("primary").axis(runtime_axis(&refs)).build(),
            ]);
            let engine = Arc::new(ScriptedEngine::new().job("primary", failing, Behavior::Fail));

            let outcome = run(engine, &workflow).await;
            let primary = outcome.tier("primary").unwrap();
            assert_eq!(primary.aggregate_status, AggregateStatus::Failure);
            assert_eq!(primary.failed(), 1);
            assert_eq!(primary.passed(), size - 1);
        }
    }
}

#[tokio::test]
async fn test_best_effort_tier_with_all_jobs_failing_succeeds() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("nightly")
            .best_effort()
            .axis(runtime_axis(&["v1", "v2", "v3"]))
            .build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new().fail_tier("nightly"));

    let outcome = run(engine, &workflow).await;
    let nightly = outcome.tier("nightly").unwrap();
    assert_eq!(nightly.aggregate_status, AggregateStatus::Success);
    assert_eq!(nightly.failed(), 3);
    assert_eq!(outcome.final_status, AggregateStatus::Success);
}

#[tokio::test]
async fn test_flipping_best_effort_results_keeps_final_status() {
    for primary_fails in [false, true] {
        let mut finals = Vec::new();
        for experimental in [Behavior::Succeed, Behavior::Fail] {
            let mut engine = ScriptedEngine::new().tier("experimental", experimental);
            if primary_fails {
                engine = engine.fail_tier("secondary");
            }
            let outcome = run(Arc::new(engine), &WorkflowFixture::three_tier()).await;
            finals.push(outcome.final_status);
        }
        assert_eq!(finals[0], finals[1]);
    }
}

#[tokio::test]
async fn test_required_failure_skips_transitive_dependents() {
    let engine = Arc::new(ScriptedEngine::new().fail_tier("b"));
    let sink = Arc::new(RecordingEventSink::new());

    let workflow = WorkflowFixture::chain();

    let outcome = Orchestrator::new(engine.clone())
        .with_event_sink(sink.clone())
        .run(&workflow, &TriggerContext::push("main"))
        .await
        .unwrap();

    let dag = DagBuilder::new().build(&workflow).unwrap();
    let downstream = dag.transitive_dependents("b");
    assert_eq!(downstream, vec!["c", "d"]);
    for tier in &downstream {
        assert_eq!(outcome.tier(tier).unwrap().state, TierState::Skipped);
        assert!(engine.dispatched_for(tier).is_empty());
    }

    assert_eq!(outcome.tier("a").unwrap().state, TierState::Succeeded);
    assert_eq!(outcome.tier("b").unwrap().state, TierState::Failed);
    assert_eq!(outcome.tier("c").unwrap().state, TierState::Skipped);
    assert_eq!(outcome.tier("d").unwrap().state, TierState::Skipped);
    assert_eq!(
        outcome.tier("d").unwrap().skip_reason,
        Some(SkipReason::UpstreamFailed {
            upstream: vec!["c".to_string()]
        })
    );

    assert!(engine.dispatched_for("c").is_empty());
    assert!(engine.dispatched_for("d").is_empty());
    assert_eq!(sink.count("tier.skipped."), 2);
    assert_eq!(sink.count("tier.started."), 2);
}

#[tokio::test]
async fn test_best_effort_tier_does_not_block_dependents() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("flaky").best_effort().build(),
        TierFixture::new("after").after("flaky").build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new().fail_tier("flaky"));

    let outcome = run(engine.clone(), &workflow).await;
    assert_eq!(outcome.tier("after").unwrap().state, TierState::Succeeded);
    assert_eq!(engine.dispatched_for("after").len(), 1);
}

#[tokio::test]
async fn test_empty_tier_succeeds_trivially() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("empty").axis(runtime_axis(&[])).build(),
        TierFixture::new("after").after("empty").build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new());

    let outcome = run(engine.clone(), &workflow).await;
    let empty = outcome.tier("empty").unwrap();
    assert_eq!(empty.state, TierState::Succeeded);
    assert!(empty.job_results.is_empty());
    assert_eq!(outcome.tier("after").unwrap().state, TierState::Succeeded);
    assert_eq!(outcome.final_status, AggregateStatus::Success);
}

#[tokio::test]
async fn test_cancelled_error_and_panic_count_as_failures() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("primary")
            .axis(runtime_axis(&["v1", "v2", "v3", "v4"]))
            .build(),
    ]);
    let engine = Arc::new(
        ScriptedEngine::new()
            .job("primary", 1, Behavior::Cancel)
            .job("primary", 2, Behavior::Error)
            .job("primary", 3, Behavior::Panic),
    );

    let outcome = run(engine, &workflow).await;
    let statuses: Vec<JobStatus> = outcome
        .tier("primary")
        .unwrap()
        .job_results
        .iter()
        .map(|r| r.status)
        .collect();

    assert_eq!(
        statuses,
        vec![
            JobStatus::Success,
            JobStatus::Cancelled,
            JobStatus::Failure,
            JobStatus::Failure
        ]
    );
    assert_eq!(outcome.final_status, AggregateStatus::Failure);
}

#[tokio::test]
async fn test_job_timeout_is_a_failure() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("primary")
            .axis(runtime_axis(&["v1", "v2"]))
            .build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new().job("primary", 0, Behavior::Hang));

    let outcome = Orchestrator::new(engine)
        .with_config(OrchestratorConfig {
            job_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        })
        .run(&workflow, &TriggerContext::push("main"))
        .await
        .unwrap();

    let results = &outcome.tier("primary").unwrap().job_results;
    assert!(results[0].timed_out);
    assert_eq!(results[0].status, JobStatus::Failure);
    assert!(!results[1].timed_out);
    assert_eq!(results[1].status, JobStatus::Success);
    assert_eq!(outcome.final_status, AggregateStatus::Failure);
}

#[tokio::test]
async fn test_tier_timeout_aborts_outstanding_jobs() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("primary")
            .axis(runtime_axis(&["v1", "v2", "v3"]))
            .build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new().job("primary", 2, Behavior::Hang));

    let outcome = Orchestrator::new(engine)
        .with_config(OrchestratorConfig {
            tier_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        })
        .run(&workflow, &TriggerContext::push("main"))
        .await
        .unwrap();

    let primary = outcome.tier("primary").unwrap();
    assert_eq!(primary.job_results.len(), 3);
    assert_eq!(primary.passed(), 2);
    assert!(primary.job_results[2].timed_out);
    assert_eq!(primary.state, TierState::Failed);
}

#[tokio::test]
async fn test_jobs_in_a_tier_run_concurrently() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("primary")
            .axis(runtime_axis(&["v1", "v2", "v3", "v4"]))
            .build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new().delay("primary", Duration::from_millis(50)));

    run(engine.clone(), &workflow).await;
    assert_eq!(engine.max_in_flight(), 4);
}

#[tokio::test]
async fn test_independent_tiers_run_concurrently() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .delay("left", Duration::from_millis(50))
            .delay("right", Duration::from_millis(50)),
    );

    let outcome = run(engine.clone(), &WorkflowFixture::diamond()).await;
    assert_eq!(engine.max_in_flight(), 4);
    assert_eq!(outcome.tier("join").unwrap().state, TierState::Succeeded);
}

#[tokio::test]
async fn test_max_parallel_jobs_is_respected() {
    let workflow = WorkflowFixture::from_tiers(vec![
        TierFixture::new("primary")
            .axis(runtime_axis(&["v1", "v2", "v3", "v4", "v5", "v6"]))
            .build(),
    ]);
    let engine = Arc::new(ScriptedEngine::new().delay("primary", Duration::from_millis(20)));

    let outcome = Orchestrator::new(engine.clone())
        .with_config(OrchestratorConfig {
            max_parallel_jobs: Some(2),
            ..Default::default()
        })
        .run(&workflow, &TriggerContext::push("main"))
        .await
        .unwrap();

    assert!(engine.max_in_flight() <= 2);
    assert_eq!(outcome.tier("primary").unwrap().passed(), 6);
}

#[tokio::test]
async fn test_configuration_errors_dispatch_nothing() {
    let cyclic = WorkflowFixture::from_tiers(vec![
        TierFixture::new("a").after("c").build(),
        TierFixture::new("b").after("a").build(),
        TierFixture::new("c").after("b").build(),
    ]);
    let unknown = WorkflowFixture::from_tiers(vec![TierFixture::new("a").after("ghost").build()]);

    for (workflow, is_cycle) in [(cyclic, true), (unknown, false)] {
        let engine = Arc::new(ScriptedEngine::new());
        let sink = Arc::new(RecordingEventSink::new());
        let err = Orchestrator::new(engine.clone())
            .with_event_sink(sink.clone())
            .run(&workflow, &TriggerContext::push("main"))
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(matches!(err, Error::CyclicDependency { .. }), is_cycle);
        assert!(engine.dispatched().is_empty());
        assert!(sink.events().is_empty());
    }
}

#[tokio::test]
async fn test_conditional_gate_reports_skipped() {
    let mut workflow = WorkflowFixture::three_tier();
    workflow.summary.run_unconditionally = false;
    let engine = Arc::new(ScriptedEngine::new().fail_tier("primary"));

    let outcome = run(engine, &workflow).await;
    assert_eq!(outcome.gate.status, GateStatus::Skipped);
    assert_eq!(outcome.final_status, AggregateStatus::Failure);
}

#[tokio::test]
async fn test_unconditional_gate_reports_every_violation() {
    let engine = Arc::new(ScriptedEngine::new().fail_tier("primary"));

    let outcome = run(engine, &WorkflowFixture::three_tier()).await;
    assert_eq!(outcome.gate.status, GateStatus::Failed);
    assert_eq!(outcome.gate.depends_on, vec!["primary", "secondary"]);
    assert_eq!(outcome.gate.violations.len(), 2);
}

#[tokio::test]
async fn test_explicit_gate_dependencies() {
    let mut workflow = WorkflowFixture::three_tier();
    workflow.summary.depends_on = Some(vec!["primary".to_string()]);
    let engine = Arc::new(ScriptedEngine::new().fail_tier("secondary"));

    let outcome = run(engine, &workflow).await;
    assert_eq!(outcome.tier("secondary").unwrap().state, TierState::Failed);
    assert_eq!(outcome.final_status, AggregateStatus::Success);
}

#[tokio::test]
async fn test_event_stream_shape() {
    let engine = Arc::new(ScriptedEngine::new());
    let sink = Arc::new(RecordingEventSink::new());

    let outcome = Orchestrator::new(engine)
        .with_event_sink(sink.clone())
        .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
        .await
        .unwrap();

    let subjects = sink.subjects();
    assert_eq!(subjects.first().unwrap(), &format!("run.started.{}", outcome.run_id));
    assert_eq!(subjects.last().unwrap(), &format!("run.completed.{}", outcome.run_id));
    assert_eq!(sink.count("tier.started."), 3);
    assert_eq!(sink.count("tier.completed."), 3);
    assert_eq!(sink.count("job.dispatched."), 7);
    assert_eq!(sink.count("job.completed."), 7);
    assert_eq!(sink.count("gate.evaluated."), 1);
    assert!(sink.events().iter().all(|e| e.run_id() == outcome.run_id));
}

#[tokio::test]
async fn test_event_sink_failures_do_not_fail_the_run() {
    let outcome = Orchestrator::new(Arc::new(ScriptedEngine::new()))
        .with_event_sink(Arc::new(FailingEventSink))
        .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
        .await
        .unwrap();
    assert_eq!(outcome.final_status, AggregateStatus::Success);
}

#[tokio::test]
async fn test_runs_are_independent() {
    let workflow = WorkflowFixture::three_tier();
    let green = Orchestrator::new(Arc::new(ScriptedEngine::new()));
    let red = Orchestrator::new(Arc::new(ScriptedEngine::new().fail_tier("primary")));
    let trigger = TriggerContext::push("main");

    let (a, b) = futures::join!(green.run(&workflow, &trigger), red.run(&workflow, &trigger));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.final_status, AggregateStatus::Success);
    assert_eq!(b.final_status, AggregateStatus::Failure);
}

#[tokio::test]
async fn test_panicking_event_sink_does_not_fail_the_run() {
    init_test_logging();
    for prefix in ["job.completed.", "tier.completed.", "run."] {
        let engine = Arc::new(ScriptedEngine::new());
        let outcome = Orchestrator::new(engine.clone())
            .with_event_sink(Arc::new(PanickingEventSink::on(prefix)))
            .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
            .await
            .unwrap();

        assert_eq!(outcome.final_status, AggregateStatus::Success, "{}", prefix);
        assert_eq!(engine.dispatched().len(), 7);
        assert!(outcome.tier_outcomes.values().all(|t| t.error.is_none()));
    }
}
