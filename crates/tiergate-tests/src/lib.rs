//! Integration test infrastructure for Tiergate.
//!
//! Provides workflow fixtures, a scripted execution engine whose per-tier and
//! per-job behavior is set up front, and an event sink that records
//! everything it receives.
//!
//! # Usage
//!
//! ```ignore
//! use tiergate_tests::{ScriptedEngine, WorkflowFixture};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let engine = Arc::new(ScriptedEngine::new().fail_tier("primary"));
//!     let outcome = Orchestrator::new(engine.clone())
//!         .run(&WorkflowFixture::three_tier(), &TriggerContext::push("main"))
//!         .await?;
//! }
//! ```

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tiergate_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
