//! Configuration values (`conf`) attached to a profile
//!
//! Conf keys look like `tools.build:jobs`. Only keys whitelisted through
//! `tools.info.package_id:confs` ever reach a package id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Conf key holding the package id whitelist
pub const PACKAGE_ID_CONFS: &str = "tools.info.package_id:confs";

/// A conf value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for ConfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for ConfValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for ConfValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<String>> for ConfValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Conf values keyed by conf name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conf(BTreeMap<String, ConfValue>);

impl Conf {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply every value of `other` on top of this conf
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Whitelisted patterns from `tools.info.package_id:confs`
    ///
    /// A text value is read as a comma separated list.
    #[must_use]
    pub fn package_id_confs(&self) -> Vec<String> {
        match self.0.get(PACKAGE_ID_CONFS) {
            Some(ConfValue::List(items)) => items.clone(),
            Some(ConfValue::Text(text)) => text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}
