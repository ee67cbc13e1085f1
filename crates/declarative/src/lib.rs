//! # Declarative
//!
//! A rule engine for converging a host towards a declared state.
//!
//! A pass takes an immutable snapshot of host facts and an ordered rule set.
//! Each rule whose predicate holds applies one idempotent action; changed
//! rules may ask for a service restart, which is deferred to the end of the
//! pass and performed at most once per service.
//!
//! ## Core Concepts
//!
//! - **HostFacts**: Read-only snapshot of the machine (`platform`, `kernel.machine`, ...)
//! - **Predicate**: Data-driven condition over facts
//! - **Rule**: Predicate + [`Action`] + optional `notifies` target
//! - **NotificationQueue**: Deduplicated restarts flushed after all rules
//! - **EvaluationResult**: Every rule's outcome, failures included
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Action, EvaluateOptions, HostFacts, Predicate, Rule, RuleSet, ServiceState};
//!
//! let rules = RuleSet::new(vec![Rule::new(
//!     "stop-nscp",
//!     Predicate::equals("platform", "windows"),
//!     Action::Service {
//!         name: "nscp".into(),
//!         states: vec![ServiceState::Stop, ServiceState::Disable],
//!     },
//! )])?;
//!
//! let facts = HostFacts::collect(&source, rules.fact_keys());
//! let result = declarative::evaluate_simple(&facts, &rules, &ctx, &EvaluateOptions::default())?;
//! ```
//!
//! ## Collaborator Traits
//!
//! Side effects go through injected traits so the crate has no hard
//! dependency on a service manager, a template engine or the filesystem:
//!
//! - [`ServiceController`]: Starts, stops, enables and restarts services
//! - [`TemplateRenderer`]: Renders template content
//! - [`FileStore`]: Reads and atomically writes managed files
//! - [`CommandRunner`]: Runs external commands
//! - [`GroupManager`]: Reads and changes group membership
//! - [`FactSource`]: Answers fact lookups

pub mod action;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod facts;
pub mod predicate;
pub mod queue;
pub mod rule;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{
    ApplyContext, CommandRunner, FileStore, GroupManager, NoProgress, ProgressCallback,
    ServiceController, TemplateRenderer,
};
pub use error::{ActionError, ActionErrorKind, Error, EvaluateError, PredicateError};
pub use evaluator::{evaluate, evaluate_simple};
pub use facts::{FactSource, FactValue, HostFacts};
pub use predicate::Predicate;
pub use queue::NotificationQueue;
pub use rule::{Action, CommandSpec, Rule, RuleSet, ServiceState, ValueExpr, Vars, interpolate};
pub use types::{
    CommandOutput, EvaluateOptions, EvaluationResult, NotificationOutcome, Outcome, RuleOutcome,
    Summary,
};
