//! Port traits (interfaces) the orchestrator is written against.

use crate::Result;
use crate::events::Event;
use crate::run::{JobReport, JobSpec};
use async_trait::async_trait;

/// Runs a single job and reports its status.
///
/// Implementations must be safe to call concurrently; the orchestrator
/// dispatches every job in a tier at once, bounded only by its parallelism
/// limit. An `Err` is recorded as a failed job, never as a failed run.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, job: &JobSpec) -> Result<JobReport>;
}

/// Receives lifecycle events.
///
/// Publishing failures are logged and otherwise ignored.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event) -> Result<()>;
}
