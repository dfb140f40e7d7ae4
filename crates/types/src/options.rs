//! Recipe options and their declared values

use crate::settings::ANY_VALUE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Option values keyed by option name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionValues(BTreeMap<String, String>);

impl OptionValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `name/*:option=value` assignments reproducing these values
    #[must_use]
    pub fn as_assignments(&self, package: &str) -> Vec<String> {
        self.0
            .iter()
            .map(|(k, v)| format!("{package}/*:{k}={v}"))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OptionValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Options a recipe declares, with their allowed values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionsSchema(BTreeMap<String, Vec<String>>);

impl OptionsSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option and its allowed values
    #[must_use]
    pub fn with<I, S>(mut self, name: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(name.into(), allowed.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn allowed(&self, name: &str) -> &[String] {
        self.0.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether `value` is allowed for a declared option
    #[must_use]
    pub fn accepts(&self, name: &str, value: &str) -> bool {
        self.0
            .get(name)
            .is_some_and(|allowed| allowed.iter().any(|a| a == ANY_VALUE || a == value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_accepts() {
        let schema = OptionsSchema::new()
            .with("shared", ["True", "False"])
            .with("prefix", [ANY_VALUE]);
        assert!(schema.accepts("shared", "True"));
        assert!(!schema.accepts("shared", "maybe"));
        assert!(schema.accepts("prefix", "/opt"));
        assert!(!schema.accepts("fpic", "True"));
    }

    #[test]
    fn test_assignments() {
        let mut values = OptionValues::new();
        values.set("shared", "True");
        values.set("fpic", false);
        assert_eq!(
            values.as_assignments("zlib"),
            vec!["zlib/*:fpic=false", "zlib/*:shared=True"]
        );
    }
}
