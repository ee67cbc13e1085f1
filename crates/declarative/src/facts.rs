//! Host facts - a read-only snapshot of the managed machine
//!
//! Facts are keyed by dotted path (`platform`, `kernel.machine`). Facts that
//! answer a question about the host use a `<kind>:<argument>` key instead,
//! for example `user:dd-agent` or `directory:/etc/dd-agent/conf.d`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ActionError;

/// Key prefix for "does this user account exist" facts.
pub const USER_PROBE: &str = "user:";
/// Key prefix for "does this directory exist" facts.
pub const DIRECTORY_PROBE: &str = "directory:";
/// Key prefix for "does this file exist" facts.
pub const FILE_PROBE: &str = "file:";
/// Key prefix for "is this program on PATH" facts.
pub const COMMAND_PROBE: &str = "command:";

/// A scalar fact value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl FactValue {
    /// Truthiness used by `truthy` predicates: `false`, `0` and `""` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::String(s) => !s.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Source of host facts
///
/// Implementations answer one key at a time. Returning `Ok(None)` means the
/// fact does not apply to this host; an error means the probe itself broke.
pub trait FactSource {
    fn lookup(&self, key: &str) -> Result<Option<FactValue>, ActionError>;
}

/// Immutable snapshot of host facts, captured once per pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostFacts {
    values: BTreeMap<String, FactValue>,
}

impl HostFacts {
    /// Snapshot the given keys from a fact source.
    ///
    /// Keys the source does not know are left out of the snapshot. Probe
    /// failures are logged and treated as absent facts.
    pub fn collect<'k, S>(source: &S, keys: impl IntoIterator<Item = &'k str>) -> Self
    where
        S: FactSource + ?Sized,
    {
        let mut values = BTreeMap::new();
        for key in keys {
            if values.contains_key(key) {
                continue;
            }
            match source.lookup(key) {
                Ok(Some(value)) => {
                    log::trace!("fact {key} = {value}");
                    values.insert(key.to_string(), value);
                }
                Ok(None) => log::trace!("fact {key} is absent"),
                Err(e) => log::warn!("Could not probe fact {key}: {e}"),
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&FactValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Return a new snapshot with `other`'s facts layered on top of these.
    pub fn merged(&self, other: &HostFacts) -> Self {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { values }
    }
}

impl<K, V> FromIterator<(K, V)> for HostFacts
where
    K: Into<String>,
    V: Into<FactValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
