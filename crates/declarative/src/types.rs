//! Core types for evaluation results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of one rule (or one queued restart) after a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Predicate was false; nothing was touched
    Skipped,
    /// Target already in the desired state
    NoOp,
    /// A change was applied (or, in a dry run, would be)
    Changed,
    /// The action failed
    Failed { reason: String },
}

impl Outcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::NoOp => "no-op",
            Self::Changed => "changed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// What happened to one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    /// Action kind (`service`, `template`, `uninstall`, `group`)
    pub kind: String,
    pub description: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Extra context, e.g. the rendered command line or the file path written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What happened to one deferred restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub service: String,
    /// Rules whose changes requested this restart
    pub requested_by: Vec<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Full record of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Rule outcomes in declared order
    pub applied: Vec<RuleOutcome>,
    /// Restarts flushed after all rules ran
    pub notifications: Vec<NotificationOutcome>,
    /// No host changes were made
    pub dry_run: bool,
}

impl EvaluationResult {
    pub fn outcome(&self, rule_id: &str) -> Option<&Outcome> {
        self.applied
            .iter()
            .find(|r| r.rule_id == rule_id)
            .map(|r| &r.outcome)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for r in &self.applied {
            summary.add(&r.outcome);
        }
        for n in &self.notifications {
            if n.outcome.is_change() {
                summary.restarted += 1;
            } else if !n.outcome.is_success() {
                summary.failed += 1;
            }
        }
        summary
    }

    /// Check if every rule and restart succeeded
    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub changed: usize,
    pub no_op: usize,
    pub skipped: usize,
    pub failed: usize,
    pub restarted: usize,
}

impl Summary {
    /// Total number of actual changes made, restarts included
    pub fn total_changes(&self) -> usize {
        self.changed + self.restarted
    }

    /// Check if the pass was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of rules processed
    pub fn total(&self) -> usize {
        self.changed + self.no_op + self.skipped + self.failed
    }

    pub fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::NoOp => self.no_op += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Options for a pass
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Check every action instead of applying it
    pub dry_run: bool,
    /// Treat a missing fact as an error instead of `false`
    pub strict: bool,
}

/// Output from an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
