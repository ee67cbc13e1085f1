//! Error types for rule evaluation.
//!
//! Errors fall into three groups:
//! - [`PredicateError`]: a rule definition is malformed or references facts
//!   that are not available in strict mode
//! - [`ActionError`]: the side effect behind an action failed
//! - [`EvaluateError`]: the whole pass failed (a critical rule failed)

use std::fmt;

use crate::types::EvaluationResult;

/// Errors raised while validating or evaluating rule predicates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateError {
    /// The predicate itself is malformed.
    #[error("malformed predicate in rule '{rule_id}': {reason}")]
    Malformed { rule_id: String, reason: String },

    /// A referenced fact is absent and strict mode is on.
    #[error("fact '{0}' is not available")]
    MissingFact(String),

    /// `notifies` points at a rule that does not exist or is not a service.
    #[error("rule '{rule_id}' notifies '{target}', which is not a service rule")]
    UnknownNotifyTarget { rule_id: String, target: String },

    /// Two rules share the same id.
    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    /// A `{{ placeholder }}` has no matching variable.
    #[error("unresolved variable '{{{{ {0} }}}}'")]
    UnresolvedVariable(String),
}

/// Kind of side effect that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionErrorKind {
    /// Starting, stopping or (de)registering a service failed.
    ServiceControl,
    /// Reading or writing a managed file failed.
    FileWrite,
    /// The template could not be rendered.
    Render,
    /// A process could not be launched or exited non-zero.
    ProcessExec,
    /// Group membership could not be read or changed.
    GroupModify,
    /// The underlying call did not finish within its deadline.
    Timeout,
}

impl ActionErrorKind {
    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ServiceControl => "service control",
            Self::FileWrite => "file write",
            Self::Render => "render",
            Self::ProcessExec => "process exec",
            Self::GroupModify => "group modify",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ActionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The side effect behind an action failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failed: {detail}")]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub detail: String,
}

impl ActionError {
    pub fn new(kind: ActionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn service(detail: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::ServiceControl, detail)
    }

    pub fn file_write(detail: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::FileWrite, detail)
    }

    pub fn render(detail: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Render, detail)
    }

    pub fn process(detail: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::ProcessExec, detail)
    }

    pub fn group(detail: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::GroupModify, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Timeout, detail)
    }

    /// Whether the failure was a deadline expiring rather than a hard error.
    pub fn is_timeout(&self) -> bool {
        self.kind == ActionErrorKind::Timeout
    }
}

/// Why a single rule failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

/// A pass that could not complete.
#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    /// A critical rule failed; evaluation stopped after it.
    #[error("critical rule '{rule_id}' failed: {source}")]
    CriticalFailure {
        rule_id: String,
        #[source]
        source: Error,
        /// Outcomes recorded up to and including the failing rule.
        partial: Box<EvaluationResult>,
    },
}

impl EvaluateError {
    /// Outcomes recorded before the pass halted.
    pub fn partial(&self) -> &EvaluationResult {
        match self {
            Self::CriticalFailure { partial, .. } => partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display_includes_kind() {
        let err = ActionError::service("sc.exe exited with 1060");
        assert_eq!(err.to_string(), "service control failed: sc.exe exited with 1060");
    }

    #[test]
    fn test_timeout_is_detected() {
        assert!(ActionError::timeout("powershell.exe after 30s").is_timeout());
        assert!(!ActionError::process("exit 1").is_timeout());
    }

    #[test]
    fn test_unresolved_variable_display() {
        let err = PredicateError::UnresolvedVariable("arch".into());
        assert_eq!(err.to_string(), "unresolved variable '{{ arch }}'");
    }
}
