use crate::run::JobSpec;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").expect("interpolation pattern is valid")
});

/// Context for variable interpolation in step commands.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    /// Plain variables: `tier`, `branch`, `job` and step env
    pub variables: HashMap<String, String>,
    /// Matrix values for the current job
    pub matrix: HashMap<String, String>,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context a job's steps are rendered with.
    pub fn for_job(job: &JobSpec) -> Self {
        let mut ctx = Self::new();
        ctx.variables.insert("tier".to_string(), job.tier.clone());
        ctx.variables.insert("branch".to_string(), job.branch.clone());
        ctx.variables.insert("job".to_string(), job.display_name.clone());
        ctx.variables.insert(
            "deploy_eligible".to_string(),
            job.deploy_eligible.to_string(),
        );
        for (axis, value) in job.coordinate.iter() {
            ctx.matrix.insert(axis.to_string(), value.to_string());
        }
        ctx
    }

    /// Interpolate variables in a string.
    ///
    /// Supports:
    /// - `${{ variable }}` - direct variable lookup
    /// - `${{ env.VAR }}` - context variable, then process environment
    /// - `${{ matrix.axis }}` - matrix value
    ///
    /// Unknown expressions render as the empty string.
    pub fn interpolate(&self, input: &str) -> String {
        EXPRESSION
            .replace_all(input, |caps: &regex::Captures| {
                let expr = caps.get(1).map_or("", |m| m.as_str()).trim();
                self.resolve_expression(expr)
            })
            .to_string()
    }

    fn resolve_expression(&self, expr: &str) -> String {
        if let Some(var_name) = expr.strip_prefix("env.") {
            return self
                .variables
                .get(var_name)
                .cloned()
                .or_else(|| std::env::var(var_name).ok())
                .unwrap_or_default();
        }

        if let Some(key) = expr.strip_prefix("matrix.") {
            return self.matrix.get(key).cloned().unwrap_or_default();
        }

        self.variables.get(expr).cloned().unwrap_or_default()
    }

    /// Environment variables exported to every step of the job.
    pub fn job_env(job: &JobSpec) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("TIERGATE_TIER".to_string(), job.tier.clone());
        env.insert("TIERGATE_BRANCH".to_string(), job.branch.clone());
        env.insert("TIERGATE_JOB".to_string(), job.display_name.clone());
        env.insert(
            "TIERGATE_DEPLOY_ELIGIBLE".to_string(),
            job.deploy_eligible.to_string(),
        );
        for (axis, value) in job.coordinate.iter() {
            env.insert(
                format!("TIERGATE_MATRIX_{}", env_key(axis)),
                value.to_string(),
            );
        }
        env
    }
}

fn env_key(axis: &str) -> String {
    axis.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
