//! Shell-based step execution on the host.

use crate::runner::{OutputLine, OutputStream, RunnerConfig, StepContext, StepResult};
use std::collections::HashMap;
use std::process::Stdio;
use tiergate_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

/// Shell runner for executing commands on the host.
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one step, streaming its output to `output_tx`.
    pub async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let start = std::time::Instant::now();
        let command = &ctx.step.run;

        info!(
            job = %ctx.job,
            step = %ctx.step.name,
            command = %command,
            workspace = %ctx.workspace.display(),
            "Executing shell command"
        );

        let mut env_vars: HashMap<String, String> = if self.config.inherit_env {
            std::env::vars().collect()
        } else {
            HashMap::new()
        };
        env_vars.extend(ctx.env.clone());

        let mut command_builder = Command::new(&ctx.step.shell);
        command_builder
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.config.inherit_env {
            command_builder.env_clear();
        }
        #[cfg(unix)]
        command_builder.process_group(0);
        let mut child = command_builder
            .envs(&env_vars)
            .spawn()
            .map_err(|e| Error::Engine(format!("Failed to spawn process: {}", e)))?;
        let mut group = ProcessGroup::new(child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("stderr not captured".to_string()))?;

        let stdout_handle = tokio::spawn(stream_lines(
            stdout,
            OutputStream::Stdout,
            ctx.job.clone(),
            ctx.step.name.clone(),
            output_tx.clone(),
        ));
        let stderr_handle = tokio::spawn(stream_lines(
            stderr,
            OutputStream::Stderr,
            ctx.job.clone(),
            ctx.step.name.clone(),
            output_tx,
        ));

        let wait_result = if let Some(timeout_secs) = self.config.timeout_seconds {
            match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_secs,
                        step = %ctx.step.name,
                        "Command timed out, killing process group"
                    );
                    group.kill();
                    let _ = child.kill().await;
                    let _ = stdout_handle.await;
                    let _ = stderr_handle.await;
                    return Err(Error::JobTimeout {
                        seconds: timeout_secs,
                    });
                }
            }
        } else {
            child.wait().await
        };
        group.disarm();

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        let status =
            wait_result.map_err(|e| Error::Engine(format!("Failed to wait for process: {}", e)))?;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(exit_code, duration_ms, "Command completed");

        Ok(StepResult {
            exit_code,
            success: exit_code == 0,
            duration_ms,
        })
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

/// Kills the step's whole process group when dropped unless disarmed.
///
/// Dropping the step future (job or tier timeout) must not leave
/// grandchildren holding the output pipes open.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL)
            && e != nix::errno::Errno::ESRCH
        {
            warn!(pgid, error = ?e, "Failed to kill process group");
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn stream_lines<R>(
    reader: R,
    stream: OutputStream,
    job: String,
    step: String,
    tx: mpsc::Sender<OutputLine>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_number = 0u32;

    while let Ok(Some(line)) = lines.next_line().await {
        line_number += 1;
        let output = OutputLine {
            job: job.clone(),
            step: step.clone(),
            stream,
            content: line,
            line_number,
            timestamp: chrono::Utc::now(),
        };
        if tx.send(output).await.is_err() {
            break;
        }
    }
}
