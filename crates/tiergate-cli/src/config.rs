//! CLI configuration management.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Branch assumed when `--branch` is not given.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Per-job timeout in seconds.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
    /// Per-tier timeout in seconds.
    #[serde(default)]
    pub tier_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_parallel_jobs: Option<usize>,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            job_timeout_secs: None,
            tier_timeout_secs: None,
            max_parallel_jobs: None,
            output_format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => f.write_str("table"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "tiergate", "tiergate")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "default_branch" => self.default_branch = value.to_string(),
            "job_timeout_secs" => self.job_timeout_secs = parse_optional(key, value)?,
            "tier_timeout_secs" => self.tier_timeout_secs = parse_optional(key, value)?,
            "max_parallel_jobs" => self.max_parallel_jobs = parse_optional(key, value)?,
            "output_format" => self.output_format = value.parse()?,
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

/// `none` clears the value.
fn parse_optional<T: FromStr>(key: &str, value: &str) -> Result<Option<T>, String> {
    if value == "none" {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| format!("Invalid value for {}: {}", key, value))
}
