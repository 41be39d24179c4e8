//! Trigger matching and evaluation.

use tiergate_core::run::TriggerContext;
use tiergate_core::workflow::{EventType, TriggerConfig, WorkflowDefinition};

/// Matcher for determining if a workflow should run for a trigger.
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Check if a workflow should be triggered by an event.
    pub fn matches(&self, workflow: &WorkflowDefinition, trigger: &TriggerContext) -> bool {
        if workflow.triggers.is_empty() {
            // Default: push and pull requests on any branch
            return matches!(trigger.event, EventType::Push | EventType::PullRequest);
        }

        workflow
            .triggers
            .iter()
            .any(|config| self.trigger_matches(config, trigger))
    }

    fn trigger_matches(&self, config: &TriggerConfig, trigger: &TriggerContext) -> bool {
        config.event == trigger.event && self.branch_matches(&config.branches, &trigger.branch)
    }

    fn branch_matches(&self, patterns: &[String], branch: &str) -> bool {
        if patterns.is_empty() {
            return true; // Match all branches if no patterns specified
        }
        patterns.iter().any(|p| self.glob_match(p, branch))
    }

    /// `*` matches any run of characters, including `/`.
    fn glob_match(&self, pattern: &str, text: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let text: Vec<char> = text.chars().collect();

        let (mut p, mut t) = (0, 0);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < pattern.len() && pattern[p] == '*' {
                backtrack = Some((p, t));
                p += 1;
            } else if p < pattern.len() && pattern[p] == text[t] {
                p += 1;
                t += 1;
            } else if let Some((star_p, star_t)) = backtrack {
                p = star_p + 1;
                t = star_t + 1;
                backtrack = Some((star_p, star_t + 1));
            } else {
                return false;
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}
