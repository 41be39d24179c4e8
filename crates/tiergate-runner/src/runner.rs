//! Step execution types.

use std::collections::HashMap;
use std::path::PathBuf;
use tiergate_core::workflow::StepDefinition;

/// Output line from step execution.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub job: String,
    pub step: String,
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of step execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
}

/// Context for step execution. `step.run` is already interpolated.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub job: String,
    pub workspace: PathBuf,
    pub env: HashMap<String, String>,
    pub step: StepDefinition,
}

/// Configuration for step execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workspace: PathBuf,
    /// Per-step limit. Job and tier limits are enforced by the orchestrator.
    pub timeout_seconds: Option<u64>,
    /// Start from the parent process environment.
    pub inherit_env: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout_seconds: Some(3600), // 1 hour default
            inherit_env: true,
        }
    }
}
