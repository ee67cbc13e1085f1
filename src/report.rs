//! Machine-readable report of a pass

use chrono::{DateTime, Utc};
use declarative::{
    Action, EvaluationResult, FileStore, HostFacts, NotificationOutcome, Outcome, RuleOutcome,
    RuleSet, Summary,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub cookbook: &'a str,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub facts: &'a HostFacts,
    pub rules: &'a [RuleOutcome],
    pub notifications: &'a [NotificationOutcome],
    pub summary: Summary,
    /// Why the pass stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
    /// blake3 of every file a rule wrote, keyed by path
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
}

impl<'a> Report<'a> {
    pub fn new(cookbook: &'a str, facts: &'a HostFacts, result: &'a EvaluationResult) -> Self {
        Self {
            cookbook,
            generated_at: Utc::now(),
            dry_run: result.dry_run,
            facts,
            rules: &result.applied,
            notifications: &result.notifications,
            summary: result.summary(),
            halted: None,
            files: BTreeMap::new(),
        }
    }

    pub fn halted(mut self, reason: Option<String>) -> Self {
        self.halted = reason;
        self
    }

    /// Hash the files written by changed template rules
    pub fn with_file_hashes(mut self, rules: &RuleSet, files: &dyn FileStore) -> Self {
        if self.dry_run {
            return self;
        }
        for outcome in self.rules {
            if outcome.outcome != Outcome::Changed {
                continue;
            }
            let action = rules.get(&outcome.rule_id).map(|r| &r.action);
            let Some(Action::Template { path, .. }) = action else {
                continue;
            };
            match files.read(path) {
                Ok(Some(content)) => {
                    self.files.insert(path.clone(), content_hash(&content));
                }
                Ok(None) => log::warn!("{path} vanished after it was written"),
                Err(e) => log::warn!("Could not hash {path}: {e}"),
            }
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}
