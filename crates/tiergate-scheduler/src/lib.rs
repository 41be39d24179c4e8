//! Tier scheduling, matrix expansion and gating for Tiergate.

pub mod dag;
pub mod deploy;
pub mod gate;
pub mod matrix;
pub mod orchestrator;
pub mod triggers;

pub use dag::{DagBuilder, DagError, TierDag};
pub use deploy::{DeployDecision, DeployGate, DeployTarget};
pub use gate::SummaryGate;
pub use matrix::{MatrixExpander, MatrixExpansion};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use triggers::TriggerMatcher;
