//! Command handlers.

use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tiergate_core::run::{AggregateStatus, JobSpec, RunOutcome, TierState, TriggerContext};
use tiergate_core::workflow::{EventType, FailurePolicy, WorkflowDefinition};
use tiergate_runner::{RunnerConfig, ShellEngine};
use tiergate_scheduler::{
    DagBuilder, DeployDecision, DeployGate, MatrixExpander, Orchestrator, OrchestratorConfig,
    SummaryGate, TriggerMatcher,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{CliConfig, OutputFormat};
use crate::progress::{ConsoleProgress, print_output};

const TEMPLATE: &str = r#"name: my-project
version: "1"

triggers:
  - type: push
    branches: ["main"]
  - type: pull_request

# Only this matrix cell publishes, and only from main.
deploy:
  runtime_versions: ["3.12"]
  platforms: ["ubuntu-latest"]
  branches: ["main"]

tiers:
  - name: primary
    axes:
      - name: platform
        values: ["ubuntu-latest"]
      - name: runtime_version
        values: ["3.12"]
      - name: use_venv
        values: [true, false]
    steps:
      - name: build
        run: echo "building on ${{ matrix.platform }} with ${{ matrix.runtime_version }}"

  - name: secondary
    depends_on: [primary]
    axes:
      - name: platform
        values: ["ubuntu-latest"]
      - name: runtime_version
        values: ["3.9", "3.10", "3.11"]
    steps:
      - name: build
        run: echo "building ${{ matrix.runtime_version }}"

  - name: experimental
    failure_policy: best_effort
    depends_on: [primary]
    axes:
      - name: runtime_version
        values: ["3.13"]
    steps:
      - name: build
        run: echo "trying ${{ matrix.runtime_version }}"

summary:
  run_unconditionally: true
"#;

/// Write a starter workflow.
pub async fn init(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(path);

    if path.exists() {
        println!("{} {} already exists", style("!").yellow(), path.display());
        return Ok(());
    }

    std::fs::write(path, TEMPLATE)?;
    debug!(path = %path.display(), "Wrote workflow template");
    println!("{} Created {}", style("✓").green(), path.display());
    Ok(())
}

/// Validate a workflow file: structure, dependency graph and matrix sizes.
pub async fn validate(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let definition = WorkflowDefinition::from_file(Path::new(path))?;
    let dag = DagBuilder::new().build(&definition)?;

    println!(
        "{} Workflow \"{}\" is valid",
        style("✓").green(),
        definition.name
    );
    println!("  Tiers: {}", dag.len());
    let roots: Vec<&str> = dag.roots().iter().map(|n| n.name.as_str()).collect();
    println!("  Entry tiers: {}", roots.join(", "));

    for node in dag.topological_order() {
        let tier = &node.definition;
        let depends = if tier.depends_on.is_empty() {
            String::new()
        } else {
            format!(", after {}", tier.depends_on.join(", "))
        };
        println!(
            "    - {} [{}] {} job(s){}",
            tier.name,
            tier.failure_policy,
            tier.job_count(),
            depends
        );
        for axis in tier.axes.iter().filter(|a| a.values.is_empty()) {
            println!(
                "      {} axis '{}' has no values, tier expands to zero jobs",
                style("!").yellow(),
                axis.name
            );
        }
    }

    let gate = SummaryGate::from_workflow(&definition);
    println!(
        "  Gate '{}' depends on: {}{}",
        gate.name(),
        gate.depends_on().join(", "),
        if gate.is_unconditional() {
            ""
        } else {
            " (conditional)"
        }
    );

    Ok(())
}

#[derive(Serialize)]
struct ExpandedTier {
    tier: String,
    failure_policy: FailurePolicy,
    jobs: Vec<JobSpec>,
}

/// Print the jobs each tier expands to for a trigger.
pub async fn expand(
    config: &CliConfig,
    path: &str,
    branch: Option<String>,
    event: EventType,
    format: Option<OutputFormat>,
) -> Result<(), Box<dyn std::error::Error>> {
    let definition = WorkflowDefinition::from_file(Path::new(path))?;
    let dag = DagBuilder::new().build(&definition)?;
    let trigger = TriggerContext::new(
        branch.unwrap_or_else(|| config.default_branch.clone()),
        event,
    );

    let expander = MatrixExpander::new();
    let tiers: Vec<ExpandedTier> = dag
        .topological_order()
        .into_iter()
        .map(|node| {
            let tier = &node.definition;
            let expansion =
                expander.expand(tier, definition.deploy_policy_for(tier), &trigger);
            ExpandedTier {
                tier: tier.name.clone(),
                failure_policy: tier.failure_policy,
                jobs: expansion.jobs,
            }
        })
        .collect();

    match format.unwrap_or(config.output_format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tiers)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&tiers)?),
        OutputFormat::Table => {
            println!(
                "{} {} on {} ({})\n",
                style("▶").cyan(),
                style(&definition.name).bold(),
                style(&trigger.branch).dim(),
                trigger.event
            );
            for tier in &tiers {
                println!(
                    "{} [{}] {} job(s)",
                    style(&tier.tier).bold(),
                    tier.failure_policy,
                    tier.jobs.len()
                );
                for job in &tier.jobs {
                    let deploy = if job.deploy_eligible {
                        style(" deploy").green().to_string()
                    } else {
                        String::new()
                    };
                    println!("    {:>3}. {}{}", job.index + 1, job.display_name, deploy);
                }
            }
        }
    }

    Ok(())
}

/// Options for `tiergate run` after merging flags over the CLI config.
pub struct RunOptions {
    pub branch: Option<String>,
    pub event: EventType,
    pub job_timeout: Option<u64>,
    pub tier_timeout: Option<u64>,
    pub max_parallel: Option<usize>,
    pub format: Option<OutputFormat>,
    pub show_output: bool,
    pub force: bool,
}

#[derive(Serialize)]
struct RunReport<'a> {
    outcome: &'a RunOutcome,
    deploy: &'a DeployDecision,
}

/// Run a workflow on this host and return the process exit code.
pub async fn run_workflow(
    config: &CliConfig,
    path: &str,
    options: RunOptions,
) -> Result<i32, Box<dyn std::error::Error>> {
    let path = Path::new(path);
    let definition = WorkflowDefinition::from_file(path)?;
    let trigger = TriggerContext::new(
        options
            .branch
            .unwrap_or_else(|| config.default_branch.clone()),
        options.event,
    );

    if !options.force && !TriggerMatcher::new().matches(&definition, &trigger) {
        debug!(workflow = %definition.name, branch = %trigger.branch, "No trigger matched");
        println!(
            "{} Workflow \"{}\" is not triggered by {} on {}",
            style("i").blue(),
            definition.name,
            trigger.event,
            trigger.branch
        );
        return Ok(0);
    }

    let format = options.format.unwrap_or(config.output_format);
    let workspace = workspace_for(path);
    info!(
        workflow = %definition.name,
        branch = %trigger.branch,
        event = %trigger.event,
        workspace = %workspace.display(),
        "Running workflow"
    );

    let mut engine = ShellEngine::new(RunnerConfig {
        workspace,
        ..Default::default()
    });
    let printer = if options.show_output {
        let (tx, rx) = mpsc::channel(256);
        engine = engine.with_output(tx);
        Some(tokio::spawn(print_output(rx)))
    } else {
        None
    };

    let orchestrator_config = OrchestratorConfig {
        job_timeout: options
            .job_timeout
            .or(config.job_timeout_secs)
            .map(Duration::from_secs),
        tier_timeout: options
            .tier_timeout
            .or(config.tier_timeout_secs)
            .map(Duration::from_secs),
        max_parallel_jobs: options.max_parallel.or(config.max_parallel_jobs),
    };

    let mut orchestrator = Orchestrator::new(Arc::new(engine)).with_config(orchestrator_config);
    if format == OutputFormat::Table {
        orchestrator = orchestrator.with_event_sink(Arc::new(ConsoleProgress));
    }

    let outcome = orchestrator.run(&definition, &trigger).await?;
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let deploy = DeployGate::new().evaluate(&outcome);

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&RunReport {
                outcome: &outcome,
                deploy: &deploy,
            })?
        ),
        OutputFormat::Yaml => print!(
            "{}",
            serde_yaml::to_string(&RunReport {
                outcome: &outcome,
                deploy: &deploy,
            })?
        ),
        OutputFormat::Table => print_summary(&definition, &outcome, &deploy),
    }

    Ok(outcome.exit_code())
}

fn workspace_for(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn print_summary(definition: &WorkflowDefinition, outcome: &RunOutcome, deploy: &DeployDecision) {
    println!("{}", style("Summary").bold().underlined());
    for tier in &definition.tiers {
        let Some(result) = outcome.tier(&tier.name) else {
            continue;
        };
        let marker = match result.state {
            TierState::Succeeded => style("✓").green(),
            TierState::Skipped => style("⊘").yellow(),
            _ => style("✗").red(),
        };
        let detail = match &result.skip_reason {
            Some(reason) => reason.to_string(),
            None => format!("{} passed, {} failed", result.passed(), result.failed()),
        };
        println!(
            "  {} {:<16} {:<12} {:<10} {}",
            marker,
            tier.name,
            result.failure_policy.to_string(),
            result.state.to_string(),
            style(detail).dim()
        );
    }

    println!();
    let gate = &outcome.gate;
    match outcome.final_status {
        AggregateStatus::Success => println!(
            "{} Gate '{}' passed: {}",
            style("✓").green().bold(),
            gate.gate,
            gate.message
        ),
        AggregateStatus::Failure => {
            println!(
                "{} Gate '{}' {}: {}",
                style("✗").red().bold(),
                gate.gate,
                gate.status,
                gate.message
            );
            for violation in &gate.violations {
                println!("    - {}", violation);
            }
        }
    }

    if deploy.allowed {
        println!("{} Deploy: {}", style("✓").green(), deploy.reason);
        for target in &deploy.targets {
            println!("    - {}", target.display_name);
        }
    } else {
        println!("{} Deploy: {}", style("i").blue(), deploy.reason);
    }

    println!(
        "\n  Run {} finished in {}ms",
        style(outcome.run_id).dim(),
        outcome.duration_ms
    );
}

/// Print the JSON schema of the workflow format.
pub fn schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = schemars::schema_for!(WorkflowDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    fn or_unset<T: ToString>(value: Option<T>) -> String {
        value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    }

    println!("Current configuration:");
    println!("  default_branch: {}", config.default_branch);
    println!("  job_timeout_secs: {}", or_unset(config.job_timeout_secs));
    println!("  tier_timeout_secs: {}", or_unset(config.tier_timeout_secs));
    println!("  max_parallel_jobs: {}", or_unset(config.max_parallel_jobs));
    println!("  output_format: {}", config.output_format);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_a_valid_workflow() {
        let definition = WorkflowDefinition::from_yaml(TEMPLATE).unwrap();
        DagBuilder::new().build(&definition).unwrap();
        assert_eq!(definition.gating_tiers(), vec!["primary", "secondary"]);
    }

    #[tokio::test]
    async fn test_init_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiergate.yaml");
        let path = path.to_str().unwrap();

        init(path).await.unwrap();
        validate(path).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_returns_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiergate.yaml");
        std::fs::write(
            &path,
            r#"
name: exit-codes
tiers:
  - name: primary
    steps:
      - name: fail
        run: exit 1
"#,
        )
        .unwrap();

        let options = RunOptions {
            branch: Some("main".into()),
            event: EventType::Push,
            job_timeout: None,
            tier_timeout: None,
            max_parallel: None,
            format: Some(OutputFormat::Json),
            show_output: false,
            force: false,
        };
        let code = run_workflow(&CliConfig::default(), path.to_str().unwrap(), options)
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_untriggered_run_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiergate.yaml");
        std::fs::write(
            &path,
            r#"
name: release-only
triggers:
  - type: push
    branches: ["release/*"]
tiers:
  - name: primary
    steps:
      - name: fail
        run: exit 1
"#,
        )
        .unwrap();

        let options = RunOptions {
            branch: Some("main".into()),
            event: EventType::Push,
            job_timeout: None,
            tier_timeout: None,
            max_parallel: None,
            format: Some(OutputFormat::Json),
            show_output: false,
            force: false,
        };
        let code = run_workflow(&CliConfig::default(), path.to_str().unwrap(), options)
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
