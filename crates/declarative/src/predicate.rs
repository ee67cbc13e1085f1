//! Predicates over host facts
//!
//! Predicates are plain data so rule tables can live in configuration files.
//! Evaluation is pure: it only reads the [`HostFacts`] snapshot.

use serde::{Deserialize, Serialize};

use crate::error::PredicateError;
use crate::facts::{FactValue, HostFacts};

/// A condition a rule must satisfy before its action is applied
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Always true
    #[default]
    Always,
    /// Fact equals the given value
    Equals { fact: String, value: FactValue },
    /// Fact is present and differs from the given value
    NotEquals { fact: String, value: FactValue },
    /// Fact is present in the snapshot
    Present { fact: String },
    /// Fact is present and truthy
    Truthy { fact: String },
    /// Fact equals one of the values
    OneOf { fact: String, values: Vec<FactValue> },
    /// All nested predicates hold (true when empty)
    All(Vec<Predicate>),
    /// At least one nested predicate holds (false when empty)
    Any(Vec<Predicate>),
    /// Nested predicate does not hold
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(fact: &str, value: impl Into<FactValue>) -> Self {
        Self::Equals {
            fact: fact.to_string(),
            value: value.into(),
        }
    }

    pub fn truthy(fact: &str) -> Self {
        Self::Truthy {
            fact: fact.to_string(),
        }
    }

    /// Evaluate against a snapshot.
    ///
    /// A missing fact makes the leaf that references it false. With `strict`
    /// set, a missing fact is an error instead.
    pub fn evaluate(&self, facts: &HostFacts, strict: bool) -> Result<bool, PredicateError> {
        match self {
            Self::Always => Ok(true),
            Self::Equals { fact, value } => {
                Ok(lookup(facts, fact, strict)?.is_some_and(|v| v == value))
            }
            Self::NotEquals { fact, value } => {
                Ok(lookup(facts, fact, strict)?.is_some_and(|v| v != value))
            }
            Self::Present { fact } => Ok(facts.contains(fact)),
            Self::Truthy { fact } => {
                Ok(lookup(facts, fact, strict)?.is_some_and(FactValue::is_truthy))
            }
            Self::OneOf { fact, values } => {
                Ok(lookup(facts, fact, strict)?.is_some_and(|v| values.contains(v)))
            }
            Self::All(preds) => {
                for p in preds {
                    if !p.evaluate(facts, strict)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any(preds) => {
                for p in preds {
                    if p.evaluate(facts, strict)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.evaluate(facts, strict)?),
        }
    }

    /// Every fact key this predicate reads, in declaration order.
    pub fn fact_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Self::Always => {}
            Self::Equals { fact, .. }
            | Self::NotEquals { fact, .. }
            | Self::Present { fact }
            | Self::Truthy { fact }
            | Self::OneOf { fact, .. } => keys.push(fact),
            Self::All(preds) | Self::Any(preds) => {
                for p in preds {
                    p.collect_keys(keys);
                }
            }
            Self::Not(inner) => inner.collect_keys(keys),
        }
    }

    /// Reject definitions that can never be evaluated meaningfully.
    pub fn validate(&self, rule_id: &str) -> Result<(), PredicateError> {
        let malformed = |reason: &str| PredicateError::Malformed {
            rule_id: rule_id.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Self::Always => Ok(()),
            Self::Equals { fact, .. }
            | Self::NotEquals { fact, .. }
            | Self::Present { fact }
            | Self::Truthy { fact } => {
                if fact.trim().is_empty() {
                    return Err(malformed("empty fact path"));
                }
                Ok(())
            }
            Self::OneOf { fact, values } => {
                if fact.trim().is_empty() {
                    return Err(malformed("empty fact path"));
                }
                if values.is_empty() {
                    return Err(malformed("one_of needs at least one value"));
                }
                Ok(())
            }
            Self::All(preds) | Self::Any(preds) => {
                preds.iter().try_for_each(|p| p.validate(rule_id))
            }
            Self::Not(inner) => inner.validate(rule_id),
        }
    }
}

fn lookup<'f>(
    facts: &'f HostFacts,
    fact: &str,
    strict: bool,
) -> Result<Option<&'f FactValue>, PredicateError> {
    match facts.get(fact) {
        Some(v) => Ok(Some(v)),
        None if strict => Err(PredicateError::MissingFact(fact.to_string())),
        None => Ok(None),
    }
}
