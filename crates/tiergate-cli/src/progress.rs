//! Live console progress for `tiergate run`.

use async_trait::async_trait;
use console::style;
use tiergate_core::Result;
use tiergate_core::events::Event;
use tiergate_core::ports::EventSink;
use tiergate_core::run::{JobStatus, TierState};
use tiergate_runner::{OutputLine, OutputStream};
use tokio::sync::mpsc;

/// Prints tier and job transitions as they happen.
pub struct ConsoleProgress;

#[async_trait]
impl EventSink for ConsoleProgress {
    async fn publish(&self, event: Event) -> Result<()> {
        match event {
            Event::RunStarted(p) => {
                println!(
                    "\n{} Running workflow: {} ({} on {})",
                    style("▶").cyan().bold(),
                    style(&p.workflow).bold(),
                    p.event,
                    style(&p.branch).dim()
                );
                println!("  tiers: {}\n", p.tiers.join(" → "));
            }
            Event::TierStarted(p) => {
                println!(
                    "{} Tier {} [{}] {} job(s)",
                    style("▶").cyan(),
                    style(&p.tier).bold(),
                    p.failure_policy,
                    p.job_count
                );
            }
            Event::JobDispatched(_) => {}
            Event::JobCompleted(p) => {
                let marker = match p.status {
                    JobStatus::Success => style("✓").green(),
                    JobStatus::Failure => style("✗").red(),
                    JobStatus::Cancelled => style("⊘").yellow(),
                };
                let detail = p.message.map(|m| format!(": {}", m)).unwrap_or_default();
                println!(
                    "    {} {} ({}ms){}",
                    marker,
                    p.display_name,
                    p.duration_ms,
                    style(detail).dim()
                );
            }
            Event::TierSkipped(p) => {
                println!(
                    "{} Tier {} skipped (upstream failed: {})",
                    style("⊘").yellow(),
                    style(&p.tier).bold(),
                    p.upstream.join(", ")
                );
            }
            Event::TierCompleted(p) => {
                let marker = match p.state {
                    TierState::Succeeded => style("✓").green(),
                    _ => style("✗").red(),
                };
                println!(
                    "{} Tier {} {} ({} passed, {} failed)\n",
                    marker,
                    style(&p.tier).bold(),
                    p.state,
                    p.passed,
                    p.failed
                );
            }
            Event::GateEvaluated(_) | Event::RunCompleted(_) => {}
        }
        Ok(())
    }
}

/// Print step output lines until the engine drops its sender.
pub async fn print_output(mut rx: mpsc::Receiver<OutputLine>) {
    while let Some(line) = rx.recv().await {
        let prefix = format!(
            "{} [{} / {}]",
            line.timestamp.format("%H:%M:%S"),
            line.job,
            line.step
        );
        match line.stream {
            OutputStream::Stdout => println!("      {} {}", style(prefix).dim(), line.content),
            OutputStream::Stderr => {
                eprintln!("      {} {}", style(prefix).dim(), style(line.content).red())
            }
        }
    }
}
