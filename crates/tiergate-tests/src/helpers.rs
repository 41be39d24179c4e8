//! Test doubles for the orchestrator's ports.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiergate_core::events::Event;
use tiergate_core::ports::{EventSink, ExecutionEngine};
use tiergate_core::run::{JobReport, JobSpec};
use tiergate_core::{Error, Result};

/// What a scripted job does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Cancel,
    /// Return `Err` from the engine.
    Error,
    Panic,
    /// Never finish on its own.
    Hang,
}

/// Execution engine driven by a script of per-tier and per-job behaviors.
///
/// Records every job it receives and the peak number of jobs executing at once.
pub struct ScriptedEngine {
    default: Behavior,
    tiers: HashMap<String, Behavior>,
    jobs: HashMap<(String, usize), Behavior>,
    delays: HashMap<String, Duration>,
    dispatched: Mutex<Vec<JobSpec>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            default: Behavior::Succeed,
            tiers: HashMap::new(),
            jobs: HashMap::new(),
            delays: HashMap::new(),
            dispatched: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every job of `tier` behaves as `behavior`.
    pub fn tier(mut self, tier: &str, behavior: Behavior) -> Self {
        self.tiers.insert(tier.to_string(), behavior);
        self
    }

    pub fn fail_tier(self, tier: &str) -> Self {
        self.tier(tier, Behavior::Fail)
    }

    /// The job at `index` within `tier` behaves as `behavior`; wins over tier rules.
    pub fn job(mut self, tier: &str, index: usize, behavior: Behavior) -> Self {
        self.jobs.insert((tier.to_string(), index), behavior);
        self
    }

    /// Jobs of `tier` take `delay` before reporting.
    pub fn delay(mut self, tier: &str, delay: Duration) -> Self {
        self.delays.insert(tier.to_string(), delay);
        self
    }

    pub fn dispatched(&self) -> Vec<JobSpec> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatched_for(&self, tier: &str) -> Vec<JobSpec> {
        self.dispatched()
            .into_iter()
            .filter(|j| j.tier == tier)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, job: &JobSpec) -> Behavior {
        self.jobs
            .get(&(job.tier.clone(), job.index))
            .or_else(|| self.tiers.get(&job.tier))
            .copied()
            .unwrap_or(self.default)
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn execute(&self, job: &JobSpec) -> Result<JobReport> {
        self.dispatched.lock().unwrap().push(job.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(&job.tier) {
            tokio::time::sleep(*delay).await;
        }

        match self.behavior_for(job) {
            Behavior::Succeed => Ok(JobReport::success()),
            Behavior::Fail => Ok(JobReport::failure(format!("{} failed", job.display_name))),
            Behavior::Cancel => Ok(JobReport::cancelled("cancelled by engine")),
            Behavior::Error => Err(Error::Engine("engine unavailable".to_string())),
            Behavior::Panic => panic!("scripted panic in {}", job.display_name),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(JobReport::success())
            }
        }
    }
}

/// Event sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.events().iter().map(Event::subject).collect()
    }

    /// Subjects starting with `prefix`, such as `tier.skipped.`.
    pub fn count(&self, prefix: &str) -> usize {
        self.subjects()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: Event) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Event sink that rejects every event.
pub struct FailingEventSink;

#[async_trait]
impl EventSink for FailingEventSink {
    async fn publish(&self, _event: Event) -> Result<()> {
        Err(Error::EventSink("sink offline".to_string()))
    }
}

/// Event sink that panics on every event whose subject starts with `prefix`.
pub struct PanickingEventSink {
    prefix: String,
}

impl PanickingEventSink {
    pub fn on(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl EventSink for PanickingEventSink {
    async fn publish(&self, event: Event) -> Result<()> {
        if event.subject().starts_with(&self.prefix) {
            panic!("sink cannot handle {}", event.subject());
        }
        Ok(())
    }
}
