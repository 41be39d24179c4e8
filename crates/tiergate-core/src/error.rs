//! Error types for Tiergate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors, raised before any job is dispatched
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    #[error("Cyclic tier dependency: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("Tier '{tier}' depends on unknown tier '{dependency}'")]
    UnknownDependency { tier: String, dependency: String },

    #[error("Duplicate tier name: {0}")]
    DuplicateTier(String),

    #[error("Duplicate axis '{axis}' in tier '{tier}'")]
    DuplicateAxis { tier: String, axis: String },

    #[error("Duplicate value '{value}' for axis '{axis}' in tier '{tier}'")]
    DuplicateAxisValue {
        tier: String,
        axis: String,
        value: String,
    },

    #[error("Summary gate depends on unknown tier '{0}'")]
    UnknownGateDependency(String),

    // Execution errors
    #[error("Execution engine error: {0}")]
    Engine(String),

    #[error("Job timeout after {seconds} seconds")]
    JobTimeout { seconds: u64 },

    #[error("Event sink error: {0}")]
    EventSink(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error describes a broken workflow rather than a runtime fault.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidWorkflow(_)
                | Error::CyclicDependency { .. }
                | Error::UnknownDependency { .. }
                | Error::DuplicateTier(_)
                | Error::DuplicateAxis { .. }
                | Error::DuplicateAxisValue { .. }
                | Error::UnknownGateDependency(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::InvalidWorkflow(err.to_string())
    }
}
