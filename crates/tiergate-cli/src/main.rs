//! Tiergate CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod progress;

use commands::{Commands, ConfigCommands};
use config::CliConfig;
use handlers::RunOptions;

#[derive(Parser)]
#[command(name = "tiergate")]
#[command(author, version, about = "Tiered build-matrix orchestrator", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CliConfig::load().unwrap_or_default();

    match cli.command {
        Commands::Init { path } => handlers::init(&path).await?,
        Commands::Validate { path } => handlers::validate(&path).await?,
        Commands::Expand {
            path,
            branch,
            event,
            format,
        } => handlers::expand(&config, &path, branch, event, format).await?,
        Commands::Run {
            path,
            branch,
            event,
            job_timeout,
            tier_timeout,
            max_parallel,
            format,
            show_output,
            force,
        } => {
            let options = RunOptions {
                branch,
                event,
                job_timeout,
                tier_timeout,
                max_parallel,
                format,
                show_output,
                force,
            };
            let code = handlers::run_workflow(&config, &path, options).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
