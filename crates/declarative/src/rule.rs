//! Rules and the actions they apply
//!
//! A rule pairs a [`Predicate`] with one idempotent [`Action`]. Rule sets are
//! validated once when built and never change afterwards.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use crate::error::PredicateError;
use crate::facts::HostFacts;
use crate::predicate::Predicate;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.:-]*)\s*\}\}").expect("placeholder regex is valid")
});

/// A desired service state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Start,
    Stop,
    Enable,
    Disable,
    Restart,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Restart => "restart",
        };
        f.write_str(s)
    }
}

/// A value resolved from the fact snapshot at apply time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueExpr {
    /// Fixed text
    Literal(String),
    /// The fact's value rendered as text
    Fact { fact: String },
    /// `then` when the predicate holds, `otherwise` when it does not
    Choose {
        when: Predicate,
        then: String,
        otherwise: String,
    },
}

impl ValueExpr {
    pub fn literal(value: &str) -> Self {
        Self::Literal(value.to_string())
    }

    /// Resolve against the snapshot.
    ///
    /// A missing fact follows the pass policy: leniently an absent `Fact`
    /// resolves to `None` and a `Choose` takes `otherwise`; in strict mode
    /// both are [`PredicateError::MissingFact`].
    pub fn resolve(
        &self,
        facts: &HostFacts,
        strict: bool,
    ) -> Result<Option<String>, PredicateError> {
        match self {
            Self::Literal(s) => Ok(Some(s.clone())),
            Self::Fact { fact } => match facts.get(fact) {
                Some(value) => Ok(Some(value.to_string())),
                None if strict => Err(PredicateError::MissingFact(fact.clone())),
                None => Ok(None),
            },
            Self::Choose {
                when,
                then,
                otherwise,
            } => {
                let chosen = if when.evaluate(facts, strict)? {
                    then
                } else {
                    otherwise
                };
                Ok(Some(chosen.clone()))
            }
        }
    }

    /// Check the predicate inside a `Choose`
    fn validate(&self, rule_id: &str) -> Result<(), PredicateError> {
        match self {
            Self::Choose { when, .. } => when.validate(rule_id),
            Self::Literal(_) | Self::Fact { .. } => Ok(()),
        }
    }

    fn fact_keys(&self) -> Vec<&str> {
        match self {
            Self::Literal(_) => Vec::new(),
            Self::Fact { fact } => vec![fact.as_str()],
            Self::Choose { when, .. } => when.fact_keys(),
        }
    }
}

/// Variables available to templates and command arguments
pub type Vars = BTreeMap<String, ValueExpr>;

/// A command line; every element may contain `{{ var }}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Substitute placeholders in the program and every argument.
    pub fn interpolate(
        &self,
        vars: &BTreeMap<String, String>,
    ) -> Result<(String, Vec<String>), PredicateError> {
        let program = interpolate(&self.program, vars)?;
        let args = self
            .args
            .iter()
            .map(|a| interpolate(a, vars))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((program, args))
    }
}

/// One idempotent change to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Drive a service through the states in order. An empty list declares
    /// the service so other rules can notify it, and does nothing itself.
    Service {
        name: String,
        #[serde(default)]
        states: Vec<ServiceState>,
    },
    /// Render a template to a file
    Template {
        path: String,
        template: String,
        #[serde(default)]
        context: Vars,
    },
    /// Run an external uninstall step. When `unless` exits 0 the host is
    /// already converged and nothing runs.
    Uninstall {
        command: CommandSpec,
        #[serde(default)]
        unless: Option<CommandSpec>,
        #[serde(default)]
        vars: Vars,
    },
    /// Ensure group membership
    GroupMembers {
        group: String,
        members: Vec<String>,
        /// Keep members not listed here
        #[serde(default)]
        append: bool,
    },
}

impl Action {
    /// Short kind label used in reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service { .. } => "service",
            Self::Template { .. } => "template",
            Self::Uninstall { .. } => "uninstall",
            Self::GroupMembers { .. } => "group",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match self {
            Self::Service { name, states } if states.is_empty() => {
                format!("Declare service {name}")
            }
            Self::Service { name, states } => {
                let states: Vec<String> = states.iter().map(ToString::to_string).collect();
                format!("Service {name}: {}", states.join(", "))
            }
            Self::Template { path, template, .. } => format!("Render {template} to {path}"),
            Self::Uninstall { command, .. } => format!("Uninstall via {}", command.program),
            Self::GroupMembers { group, members, .. } => {
                format!("Group {group}: {}", members.join(", "))
            }
        }
    }

    /// The service this action controls, if it is a service action
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::Service { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Variables resolved when the action is applied
    fn vars(&self) -> Option<&Vars> {
        match self {
            Self::Template { context: vars, .. } | Self::Uninstall { vars, .. } => Some(vars),
            Self::Service { .. } | Self::GroupMembers { .. } => None,
        }
    }

    fn fact_keys(&self) -> Vec<&str> {
        self.vars()
            .into_iter()
            .flat_map(Vars::values)
            .flat_map(ValueExpr::fact_keys)
            .collect()
    }
}

/// A predicate plus the action it guards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub when: Predicate,
    pub action: Action,
    /// Rule id of a service rule to restart when this rule changes something
    #[serde(default)]
    pub notifies: Option<String>,
    /// A failure of this rule halts the pass
    #[serde(default)]
    pub critical: bool,
}

impl Rule {
    pub fn new(id: &str, when: Predicate, action: Action) -> Self {
        Self {
            id: id.to_string(),
            when,
            action,
            notifies: None,
            critical: false,
        }
    }

    pub fn notifies(mut self, target: &str) -> Self {
        self.notifies = Some(target.to_string());
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Every fact key this rule reads
    pub fn fact_keys(&self) -> Vec<&str> {
        let mut keys = self.when.fact_keys();
        keys.extend(self.action.fact_keys());
        keys
    }
}

/// An ordered, validated list of rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Validate and freeze a list of rules.
    ///
    /// Rejects duplicate ids, malformed predicates, and `notifies` targets
    /// that are missing or are not service rules.
    pub fn new(rules: Vec<Rule>) -> Result<Self, PredicateError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(PredicateError::DuplicateRule(rule.id.clone()));
            }
            rule.when.validate(&rule.id)?;
            for expr in rule.action.vars().into_iter().flat_map(Vars::values) {
                expr.validate(&rule.id)?;
            }
        }

        for rule in &rules {
            if let Some(target) = &rule.notifies {
                let is_service = rules
                    .iter()
                    .find(|r| &r.id == target)
                    .is_some_and(|r| r.action.service_name().is_some());
                if !is_service {
                    return Err(PredicateError::UnknownNotifyTarget {
                        rule_id: rule.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every fact key any rule reads, deduplicated, in first-use order
    pub fn fact_keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rules
            .iter()
            .flat_map(Rule::fact_keys)
            .filter(|k| seen.insert(*k))
            .collect()
    }
}

/// Resolve every variable against the snapshot, dropping absent facts
pub fn resolve_vars(
    vars: &Vars,
    facts: &HostFacts,
    strict: bool,
) -> Result<BTreeMap<String, String>, PredicateError> {
    let mut resolved = BTreeMap::new();
    for (name, expr) in vars {
        if let Some(value) = expr.resolve(facts, strict)? {
            resolved.insert(name.clone(), value);
        }
    }
    Ok(resolved)
}

/// Replace `{{ name }}` placeholders; an unknown name is an error
pub fn interpolate(
    input: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, PredicateError> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = vars
            .get(name.as_str())
            .ok_or_else(|| PredicateError::UnresolvedVariable(name.as_str().to_string()))?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}
