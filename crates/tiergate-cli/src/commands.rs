//! CLI command definitions.

use clap::Subcommand;
use tiergate_core::workflow::EventType;

use crate::config::OutputFormat;

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter workflow file
    Init {
        /// Path of the workflow file to create
        #[arg(default_value = "tiergate.yaml")]
        path: String,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow file
        #[arg(default_value = "tiergate.yaml")]
        path: String,
    },

    /// Show the jobs every tier expands to
    Expand {
        /// Path to workflow file
        #[arg(default_value = "tiergate.yaml")]
        path: String,

        /// Triggering branch
        #[arg(short, long)]
        branch: Option<String>,

        /// Triggering event (push, pull_request, manual, schedule)
        #[arg(short, long, default_value = "push")]
        event: EventType,

        /// Output format
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },

    /// Run a workflow on this host
    Run {
        /// Path to workflow file
        #[arg(default_value = "tiergate.yaml")]
        path: String,

        /// Triggering branch
        #[arg(short, long)]
        branch: Option<String>,

        /// Triggering event (push, pull_request, manual, schedule)
        #[arg(short, long, default_value = "push")]
        event: EventType,

        /// Per-job timeout in seconds
        #[arg(long)]
        job_timeout: Option<u64>,

        /// Per-tier timeout in seconds
        #[arg(long)]
        tier_timeout: Option<u64>,

        /// Maximum number of jobs running at once
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Output format for the final report
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Print step output
        #[arg(long)]
        show_output: bool,

        /// Run even if no trigger matches
        #[arg(long)]
        force: bool,
    },

    /// Print the JSON schema of the workflow file format
    Schema,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
