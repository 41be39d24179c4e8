//! Tier orchestration: dependency-ordered dispatch, aggregation and gating.
//!
//! Ready tiers run concurrently as tasks in a `JoinSet`. Each tier task
//! expands its matrix, dispatches every job to the execution engine at once
//! and joins on all of them before computing its outcome. A tier whose
//! dependencies did not all succeed is recorded as skipped without
//! dispatching anything.

use crate::dag::DagBuilder;
use crate::gate::SummaryGate;
use crate::matrix::MatrixExpander;
use chrono::Utc;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiergate_core::events::*;
use tiergate_core::ids::RunId;
use tiergate_core::ports::{EventSink, ExecutionEngine};
use tiergate_core::Result;
use tiergate_core::run::{JobResult, JobSpec, RunOutcome, TierOutcome, TierState, TriggerContext};
use tiergate_core::workflow::{DeployPolicy, FailurePolicy, TierDefinition, WorkflowDefinition};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, Id as TaskId, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Runtime limits applied by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Per-job limit; overrides the workflow's `job_timeout_minutes`.
    pub job_timeout: Option<Duration>,
    /// Fallback per-tier limit when the workflow sets none.
    pub tier_timeout: Option<Duration>,
    /// Upper bound on jobs executing at once across the run.
    pub max_parallel_jobs: Option<usize>,
}

#[derive(Clone)]
struct Emitter {
    sink: Option<Arc<dyn EventSink>>,
}

impl Emitter {
    async fn emit(&self, event: Event) {
        let Some(sink) = &self.sink else {
            return;
        };
        let subject = event.subject();
        match AssertUnwindSafe(sink.publish(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(subject = %subject, error = %e, "Failed to publish event"),
            Err(panic) => error!(
                subject = %subject,
                panic = %panic_message(panic.as_ref()),
                "Event sink panicked"
            ),
        }
    }
}

pub struct Orchestrator {
    engine: Arc<dyn ExecutionEngine>,
    events: Emitter,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            events: Emitter { sink: None },
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events.sink = Some(sink);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Execute every tier of `workflow` and compute the run outcome.
    ///
    /// Only configuration errors are returned as `Err`, and always before any
    /// job is dispatched. Job failures, timeouts and skips are outcome data.
    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        trigger: &TriggerContext,
    ) -> Result<RunOutcome> {
        workflow.validate()?;
        let dag = DagBuilder::new().build(workflow)?;
        let gate = SummaryGate::from_workflow(workflow);

        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            run_id = %run_id,
            workflow = %workflow.name,
            branch = %trigger.branch,
            event = %trigger.event,
            tiers = dag.len(),
            "Starting run"
        );
        self.events
            .emit(Event::RunStarted(RunStartedPayload {
                run_id,
                workflow: workflow.name.clone(),
                branch: trigger.branch.clone(),
                event: trigger.event,
                tiers: dag
                    .topological_order()
                    .iter()
                    .map(|n| n.name.clone())
                    .collect(),
                started_at,
            }))
            .await;

        let semaphore = self
            .config
            .max_parallel_jobs
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let job_timeout = self.config.job_timeout.or_else(|| workflow.job_timeout());

        let mut outcomes: BTreeMap<String, TierOutcome> = BTreeMap::new();
        let mut states: HashMap<String, TierState> = dag
            .tiers()
            .iter()
            .map(|node| (node.name.clone(), TierState::Pending))
            .collect();
        let mut tasks: HashMap<TaskId, (String, FailurePolicy)> = HashMap::new();
        let mut join_set: JoinSet<TierOutcome> = JoinSet::new();

        loop {
            // Skips resolve without running anything, so keep sweeping until
            // no tier changes state.
            loop {
                let mut progressed = false;
                let finished: HashSet<String> = states
                    .iter()
                    .filter(|(_, state)| state.is_terminal())
                    .map(|(name, _)| name.clone())
                    .collect();

                for node in dag.tiers() {
                    if states[&node.name] != TierState::Pending
                        || !dag.is_ready(&node.name, &finished)
                    {
                        continue;
                    }

                    let blocked: Vec<String> = dag
                        .predecessors(&node.name)
                        .iter()
                        .filter(|p| !outcomes[&p.name].aggregate_status.is_success())
                        .map(|p| p.name.clone())
                        .collect();

                    if blocked.is_empty() {
                        let task = TierTask {
                            run_id,
                            tier: node.definition.clone(),
                            deploy: workflow.deploy_policy_for(&node.definition).clone(),
                            trigger: trigger.clone(),
                            engine: Arc::clone(&self.engine),
                            events: self.events.clone(),
                            semaphore: semaphore.clone(),
                            job_timeout,
                            tier_timeout: workflow
                                .tier_timeout(&node.definition)
                                .or(self.config.tier_timeout),
                        };
                        let handle = join_set.spawn(task.run());
                        tasks.insert(
                            handle.id(),
                            (node.name.clone(), node.definition.failure_policy),
                        );
                        states.insert(node.name.clone(), TierState::Running);
                    } else {
                        info!(
                            run_id = %run_id,
                            tier = %node.name,
                            upstream = ?blocked,
                            "Skipping tier, upstream did not succeed"
                        );
                        self.events
                            .emit(Event::TierSkipped(TierSkippedPayload {
                                run_id,
                                tier: node.name.clone(),
                                upstream: blocked.clone(),
                                skipped_at: Utc::now(),
                            }))
                            .await;
                        states.insert(node.name.clone(), TierState::Skipped);
                        outcomes.insert(
                            node.name.clone(),
                            TierOutcome::skipped(
                                node.name.clone(),
                                node.definition.failure_policy,
                                blocked,
                            ),
                        );
                        progressed = true;
                    }
                }

                if !progressed {
                    break;
                }
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            let outcome = match joined {
                Ok((id, outcome)) => {
                    tasks.remove(&id);
                    outcome
                }
                Err(e) => match tasks.remove(&e.id()) {
                    Some((tier, policy)) => crashed_tier(run_id, tier, policy, e),
                    None => {
                        error!(run_id = %run_id, error = %e, "Unknown tier task failed");
                        continue;
                    }
                },
            };

            info!(
                run_id = %run_id,
                tier = %outcome.tier,
                state = %outcome.state,
                passed = outcome.passed(),
                failed = outcome.failed(),
                duration_ms = outcome.duration_ms,
                "Tier completed"
            );
            if !outcome.aggregate_status.is_success() {
                let blocked = dag.transitive_dependents(&outcome.tier);
                if !blocked.is_empty() {
                    warn!(
                        run_id = %run_id,
                        tier = %outcome.tier,
                        blocked = ?blocked,
                        "Tier failed, dependents will be skipped"
                    );
                }
            }
            self.events
                .emit(Event::TierCompleted(TierCompletedPayload {
                    run_id,
                    tier: outcome.tier.clone(),
                    state: outcome.state,
                    aggregate_status: outcome.aggregate_status,
                    passed: outcome.passed(),
                    failed: outcome.failed(),
                    duration_ms: outcome.duration_ms,
                    completed_at: Utc::now(),
                }))
                .await;
            states.insert(outcome.tier.clone(), outcome.state);
            outcomes.insert(outcome.tier.clone(), outcome);
        }

        let verdict = gate.evaluate(&outcomes);
        if verdict.passed() {
            info!(run_id = %run_id, gate = %verdict.gate, "Summary gate passed");
        } else {
            warn!(
                run_id = %run_id,
                gate = %verdict.gate,
                status = %verdict.status,
                violations = ?verdict.violations,
                "Summary gate did not pass"
            );
        }
        self.events
            .emit(Event::GateEvaluated(GateEvaluatedPayload {
                run_id,
                gate: verdict.gate.clone(),
                status: verdict.status,
                violations: verdict.violations.clone(),
                evaluated_at: Utc::now(),
            }))
            .await;

        let final_status = verdict.final_status();
        let completed_at = Utc::now();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            run_id = %run_id,
            status = %final_status,
            duration_ms,
            "Run completed"
        );
        self.events
            .emit(Event::RunCompleted(RunCompletedPayload {
                run_id,
                final_status,
                duration_ms,
                completed_at,
            }))
            .await;

        Ok(RunOutcome {
            run_id,
            workflow: workflow.name.clone(),
            trigger: trigger.clone(),
            tier_outcomes: outcomes,
            gate: verdict,
            final_status,
            started_at,
            completed_at,
            duration_ms,
        })
    }
}

/// Everything one tier needs to run detached from the orchestrator.
struct TierTask {
    run_id: RunId,
    tier: TierDefinition,
    deploy: DeployPolicy,
    trigger: TriggerContext,
    engine: Arc<dyn ExecutionEngine>,
    events: Emitter,
    semaphore: Option<Arc<Semaphore>>,
    job_timeout: Option<Duration>,
    tier_timeout: Option<Duration>,
}

impl TierTask {
    async fn run(self) -> TierOutcome {
        let start = Instant::now();
        let expansion = MatrixExpander::new().expand(&self.tier, &self.deploy, &self.trigger);

        info!(
            run_id = %self.run_id,
            tier = %self.tier.name,
            policy = %self.tier.failure_policy,
            jobs = expansion.jobs.len(),
            "Dispatching tier"
        );
        self.events
            .emit(Event::TierStarted(TierStartedPayload {
                run_id: self.run_id,
                tier: self.tier.name.clone(),
                failure_policy: self.tier.failure_policy,
                job_count: expansion.jobs.len(),
                started_at: Utc::now(),
            }))
            .await;

        let mut pending: HashMap<usize, JobSpec> = HashMap::new();
        let mut jobs = JoinSet::new();
        for job in expansion.jobs {
            self.events
                .emit(Event::JobDispatched(JobDispatchedPayload {
                    run_id: self.run_id,
                    tier: job.tier.clone(),
                    job_id: job.id,
                    display_name: job.display_name.clone(),
                    coordinate: job.coordinate.clone(),
                    deploy_eligible: job.deploy_eligible,
                    dispatched_at: Utc::now(),
                }))
                .await;
            pending.insert(job.index, job.clone());
            jobs.spawn(execute_job(
                Arc::clone(&self.engine),
                job,
                self.semaphore.clone(),
                self.job_timeout,
            ));
        }

        let deadline = self
            .tier_timeout
            .map(|limit| tokio::time::Instant::now() + limit);
        let mut tier_timed_out = false;
        let mut results: Vec<JobResult> = Vec::with_capacity(pending.len());

        loop {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, jobs.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                run_id = %self.run_id,
                                tier = %self.tier.name,
                                outstanding = pending.len(),
                                "Tier timed out, aborting outstanding jobs"
                            );
                            jobs.abort_all();
                            tier_timed_out = true;
                            break;
                        }
                    }
                }
                None => jobs.join_next().await,
            };
            let Some(joined) = next else {
                break;
            };
            match joined {
                Ok(result) => {
                    pending.remove(&result.job.index);
                    self.record(&result).await;
                    results.push(result);
                }
                Err(e) => {
                    error!(tier = %self.tier.name, error = %e, "Job task failed");
                }
            }
        }

        let elapsed = start.elapsed();
        let mut leftovers: Vec<JobSpec> = pending.into_values().collect();
        leftovers.sort_by_key(|job| job.index);
        for job in leftovers {
            let result = match (tier_timed_out, self.tier_timeout) {
                (true, Some(limit)) => {
                    JobResult::timed_out(job, limit, elapsed.as_millis() as u64)
                }
                _ => JobResult::errored(job, "job task failed", elapsed.as_millis() as u64),
            };
            self.record(&result).await;
            results.push(result);
        }

        results.sort_by_key(|r| r.job.index);
        TierOutcome::completed(
            self.tier.name.clone(),
            self.tier.failure_policy,
            results,
            elapsed.as_millis() as u64,
        )
    }

    async fn record(&self, result: &JobResult) {
        debug!(
            tier = %self.tier.name,
            job = %result.job.display_name,
            status = %result.status,
            timed_out = result.timed_out,
            "Job completed"
        );
        self.events
            .emit(Event::JobCompleted(JobCompletedPayload {
                run_id: self.run_id,
                tier: result.job.tier.clone(),
                job_id: result.job.id,
                display_name: result.job.display_name.clone(),
                status: result.status,
                duration_ms: result.duration_ms,
                timed_out: result.timed_out,
                message: result.message.clone(),
                completed_at: Utc::now(),
            }))
            .await;
    }
}

/// Outcome for a tier whose task panicked or was cancelled.
fn crashed_tier(run_id: RunId, tier: String, policy: FailurePolicy, err: JoinError) -> TierOutcome {
    let reason = if err.is_panic() {
        format!("tier task panicked: {}", panic_message(err.into_panic().as_ref()))
    } else {
        "tier task was cancelled".to_string()
    };
    error!(run_id = %run_id, tier = %tier, reason = %reason, "Tier task failed");
    TierOutcome::crashed(tier, policy, reason)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aborts the wrapped task when dropped, so an aborted job also stops its engine call.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn execute_job(
    engine: Arc<dyn ExecutionEngine>,
    job: JobSpec,
    semaphore: Option<Arc<Semaphore>>,
    job_timeout: Option<Duration>,
) -> JobResult {
    let _permit = match semaphore {
        Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => return JobResult::errored(job, "job slots closed", 0),
        },
        None => None,
    };

    let start = Instant::now();
    debug!(job = %job.display_name, "Executing job");

    let exec_job = job.clone();
    let handle = tokio::spawn(async move { engine.execute(&exec_job).await });
    let _guard = AbortOnDrop(handle.abort_handle());

    let outcome = match job_timeout {
        Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| limit),
        None => Ok(handle.await),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(Ok(report))) => JobResult::from_report(job, report, duration_ms),
        Ok(Ok(Err(e))) => {
            warn!(job = %job.display_name, error = %e, "Execution engine error");
            JobResult::errored(job, e.to_string(), duration_ms)
        }
        Ok(Err(e)) => {
            error!(job = %job.display_name, error = %e, "Job panicked");
            JobResult::errored(job, format!("job panicked: {}", e), duration_ms)
        }
        Err(limit) => {
            warn!(job = %job.display_name, timeout = ?limit, "Job timed out");
            JobResult::timed_out(job, limit, duration_ms)
        }
    }
}
