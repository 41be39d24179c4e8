//! Host shell execution engine for Tiergate.

pub mod engine;
pub mod runner;
pub mod shell;

pub use engine::ShellEngine;
pub use runner::{OutputLine, OutputStream, RunnerConfig, StepContext, StepResult};
pub use shell::ShellRunner;
