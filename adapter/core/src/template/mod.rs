//! JSON Template Primitives
//!
//! The three tree operations every profile invocation is built from:
//!
//! - [`inject`]: substitute `{{name}}` placeholders with runtime variables
//! - [`get_by_path`]: read a value out of a response with a dotted path
//! - [`deep_merge`]: overlay an externally supplied body template
//!
//! All three take borrowed input and return fresh trees. A [`crate::Profile`]
//! is shared across concurrent invocations, so nothing here mutates its input.

mod inject;
mod merge;
mod path;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use inject::{inject, inject_str};
pub use merge::deep_merge;
pub use path::{get_by_path, get_str, get_string_list};

/// Runtime variables available to `{{name}}` placeholders
///
/// Values are JSON so that callers can pass structured data (a message
/// array, a nested options object) as well as plain strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars(BTreeMap<String, Value>);

impl Vars {
    /// Create an empty variable set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether a variable is set
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Copy every variable from `other` that is not already set here
    pub fn fill_from(&mut self, other: &Vars) {
        for (name, value) in &other.0 {
            self.0
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Copy every variable from `other`, replacing existing ones
    pub fn extend(&mut self, other: &Vars) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Iterate over variable names and values
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no variables are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Vars
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
