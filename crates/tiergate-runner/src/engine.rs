//! Execution engine that runs a job's steps through the host shell.

use crate::runner::{OutputLine, OutputStream, RunnerConfig, StepContext};
use crate::shell::ShellRunner;
use async_trait::async_trait;
use tiergate_core::interpolation::InterpolationContext;
use tiergate_core::ports::ExecutionEngine;
use tiergate_core::run::{JobReport, JobSpec};
use tiergate_core::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Runs every step of a job in order and stops at the first failing step.
///
/// Step commands and step env values are interpolated with the job's matrix
/// coordinate, and `TIERGATE_*` variables are exported to each step.
pub struct ShellEngine {
    runner: ShellRunner,
    output: Option<mpsc::Sender<OutputLine>>,
}

impl ShellEngine {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            runner: ShellRunner::new(config),
            output: None,
        }
    }

    /// Forward step output to `tx` instead of the debug log.
    pub fn with_output(mut self, tx: mpsc::Sender<OutputLine>) -> Self {
        self.output = Some(tx);
        self
    }

    fn step_context(&self, job: &JobSpec, index: usize) -> StepContext {
        let mut ctx = InterpolationContext::for_job(job);
        let mut step = job.steps[index].clone();

        let mut env = InterpolationContext::job_env(job);
        for (key, value) in &step.env {
            env.insert(key.clone(), ctx.interpolate(value));
        }
        for (key, value) in &env {
            ctx.variables.insert(key.clone(), value.clone());
        }
        step.run = ctx.interpolate(&step.run);

        let workspace = match &step.working_directory {
            Some(dir) => self.runner.config().workspace.join(ctx.interpolate(dir)),
            None => self.runner.config().workspace.clone(),
        };

        StepContext {
            job: job.display_name.clone(),
            workspace,
            env,
            step,
        }
    }
}

impl Default for ShellEngine {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl ExecutionEngine for ShellEngine {
    async fn execute(&self, job: &JobSpec) -> Result<JobReport> {
        if job.steps.is_empty() {
            debug!(job = %job.display_name, "Job has no steps");
            return Ok(JobReport::success());
        }

        for index in 0..job.steps.len() {
            let ctx = self.step_context(job, index);
            let (tx, mut rx) = mpsc::channel::<OutputLine>(100);

            let forward = self.output.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    match &forward {
                        Some(out) => {
                            if out.send(line).await.is_err() {
                                break;
                            }
                        }
                        None => debug!(
                            job = %line.job,
                            step = %line.step,
                            line = line.line_number,
                            stderr = line.stream == OutputStream::Stderr,
                            "{}",
                            line.content
                        ),
                    }
                }
            });

            let result = self.runner.execute(&ctx, tx).await;
            let _ = forwarder.await;

            match result {
                Ok(step) if step.success => {
                    debug!(
                        job = %job.display_name,
                        step = %ctx.step.name,
                        duration_ms = step.duration_ms,
                        "Step passed"
                    );
                }
                Ok(step) => {
                    info!(
                        job = %job.display_name,
                        step = %ctx.step.name,
                        exit_code = step.exit_code,
                        "Step failed"
                    );
                    return Ok(JobReport::failure(format!(
                        "step '{}' exited with code {}",
                        ctx.step.name, step.exit_code
                    )));
                }
                Err(Error::JobTimeout { seconds }) => {
                    return Ok(JobReport::timed_out(format!(
                        "step '{}' timed out after {}s",
                        ctx.step.name, seconds
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(JobReport::success())
    }
}
