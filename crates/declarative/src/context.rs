//! Apply context and collaborator traits
//!
//! The engine never touches the host directly. Every side effect goes
//! through one of these traits, so the same rules run against real services
//! in the binary and against in-memory fakes in tests.

use std::collections::BTreeMap;

use crate::error::ActionError;
use crate::rule::ServiceState;
use crate::types::{CommandOutput, NotificationOutcome, RuleOutcome};

/// Controls system services
pub trait ServiceController {
    /// Whether driving `name` through `states` would change anything
    fn check(&self, name: &str, states: &[ServiceState]) -> Result<bool, ActionError>;

    /// Drive `name` through `states` in order; returns whether anything changed
    fn set_state(&self, name: &str, states: &[ServiceState]) -> Result<bool, ActionError>;
}

/// Renders named templates
pub trait TemplateRenderer {
    fn render(
        &self,
        template_id: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, ActionError>;
}

/// Reads and atomically replaces managed files
pub trait FileStore {
    /// Current content, or `None` when the file does not exist
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ActionError>;

    /// Replace the file so readers see either the old or the new content
    fn write_atomic(&self, path: &str, content: &[u8]) -> Result<(), ActionError>;
}

/// Runs external commands
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ActionError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ActionError> {
        (**self).run(program, args)
    }
}

/// Reads and rewrites group membership
pub trait GroupManager {
    fn members(&self, group: &str) -> Result<Vec<String>, ActionError>;

    fn set_members(&self, group: &str, members: &[String]) -> Result<(), ActionError>;
}

/// Progress callback for a pass
///
/// Implement this trait to receive updates while rules are evaluated.
pub trait ProgressCallback {
    /// Called before a rule's predicate is evaluated
    fn on_rule_start(&mut self, id: &str, description: &str);

    /// Called when a rule reaches its terminal outcome
    fn on_rule_complete(&mut self, outcome: &RuleOutcome);

    /// Called when a queued restart has been flushed
    fn on_notification(&mut self, outcome: &NotificationOutcome);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_rule_start(&mut self, _id: &str, _description: &str) {}
    fn on_rule_complete(&mut self, _outcome: &RuleOutcome) {}
    fn on_notification(&mut self, _outcome: &NotificationOutcome) {}
}

/// Collaborators available to actions during a pass
pub struct ApplyContext<'a> {
    pub services: &'a dyn ServiceController,
    pub templates: &'a dyn TemplateRenderer,
    pub files: &'a dyn FileStore,
    pub commands: &'a dyn CommandRunner,
    pub groups: &'a dyn GroupManager,
}
