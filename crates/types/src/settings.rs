//! Settings and their schema
//!
//! Settings are dotted keys (`os`, `compiler.version`) mapped to values.
//! A sub-setting such as `compiler.version` belongs to its root `compiler`.

use kiln_errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value accepted for any setting
pub const ANY_VALUE: &str = "ANY";

/// Settings values keyed by dotted name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a setting and all of its sub-settings
    pub fn remove(&mut self, key: &str) {
        let prefix = format!("{key}.");
        self.0.retain(|k, _| k != key && !k.starts_with(&prefix));
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Subset of settings that belong to the declared roots
    #[must_use]
    pub fn declared<S: AsRef<str>>(&self, roots: &[S]) -> Self {
        self.0
            .iter()
            .filter(|(key, _)| {
                roots.iter().any(|root| {
                    let root = root.as_ref();
                    key.as_str() == root
                        || key
                            .strip_prefix(root)
                            .is_some_and(|rest| rest.starts_with('.'))
                })
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Apply every value of `other` on top of these settings
    pub fn overlay(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Allowed values per dotted setting key
///
/// A list containing `ANY` accepts every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsSchema(BTreeMap<String, Vec<String>>);

impl SettingsSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a setting and its allowed values
    #[must_use]
    pub fn with<I, S>(mut self, key: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(key.into(), allowed.into_iter().map(Into::into).collect());
        self
    }

    /// Validate every value against the schema
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UndefinedSetting` for keys the schema does not
    /// know, and `ConfigError::InvalidSetting` for values outside the
    /// allowed list.
    pub fn validate(&self, settings: &Settings) -> Result<(), ConfigError> {
        for (key, value) in settings.iter() {
            let allowed = self
                .0
                .get(key)
                .ok_or_else(|| ConfigError::UndefinedSetting {
                    key: key.to_string(),
                })?;
            if !allowed.iter().any(|a| a == ANY_VALUE || a == value) {
                return Err(ConfigError::InvalidSetting {
                    key: key.to_string(),
                    value: value.to_string(),
                    allowed: allowed.clone(),
                });
            }
        }
        Ok(())
    }
}
