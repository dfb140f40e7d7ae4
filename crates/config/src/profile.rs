//! Profiles: the settings, options and conf a resolution runs with
//!
//! ```toml
//! build = ["missing"]
//! options = ["zlib/*:shared=True", "fpic=False"]
//!
//! [settings]
//! os = "Linux"
//! build_type = "Release"
//!
//! [[package_settings]]
//! pattern = "zlib/*"
//! settings = { build_type = "Debug" }
//!
//! [conf]
//! "tools.info.package_id:confs" = ["tools.build:cxxflags"]
//! ```
//!
//! Profiles are layered: a base profile first, then the command line.
//! Within a layer the plain settings apply first and the matching package
//! patterns after them in file order. Each key is resolved on its own, so
//! the last layer or pattern that sets a key wins for that key only.

use crate::pattern::{PackagePattern, CONSUMER};
use kiln_errors::{ConfigError, Error};
use kiln_types::{Conf, OptionValues, RecipeReference, Settings, SettingsSchema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;

/// One `pattern:option=value` entry
///
/// Without a pattern the assignment applies to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OptionAssignment {
    pub pattern: PackagePattern,
    pub option: String,
    pub value: String,
}

impl OptionAssignment {
    /// Parse an assignment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `=` or the option name is
    /// missing, and `ConfigError::InvalidPattern` for a bad pattern.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            field: "options".to_string(),
            value: text.to_string(),
        };
        let (target, value) = text.split_once('=').ok_or_else(invalid)?;
        let (pattern, option) = match target.rsplit_once(':') {
            Some((pattern, option)) => (pattern, option),
            None => (CONSUMER, target),
        };
        let option = option.trim();
        if option.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            pattern: PackagePattern::parse(pattern)?,
            option: option.to_string(),
            value: value.trim().to_string(),
        })
    }
}

impl fmt::Display for OptionAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.pattern, self.option, self.value)
    }
}

impl TryFrom<String> for OptionAssignment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OptionAssignment> for String {
    fn from(assignment: OptionAssignment) -> Self {
        assignment.to_string()
    }
}

/// Settings that only apply to packages matching a pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSettings {
    pub pattern: PackagePattern,
    #[serde(default)]
    pub settings: Settings,
}

/// A single profile layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub package_settings: Vec<PackageSettings>,
    #[serde(default)]
    pub options: Vec<OptionAssignment>,
    #[serde(default)]
    pub conf: Conf,
    /// Build policy entries (`missing`, `missing:<pattern>`, `<pattern>`, `never`)
    #[serde(default)]
    pub build: Vec<String>,
}

impl Profile {
    /// Parse a profile from TOML text
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for invalid TOML or invalid entries.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load a profile from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;
        Self::from_toml(&contents)
    }

    /// Layer a command line profile over a base profile
    #[must_use]
    pub fn compose(base: Profile, cli: Profile) -> ProfileStack {
        ProfileStack::new(base).with_layer(cli)
    }
}

/// Ordered profile layers, lowest precedence first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileStack {
    layers: Vec<Profile>,
}

impl ProfileStack {
    #[must_use]
    pub fn new(base: Profile) -> Self {
        Self { layers: vec![base] }
    }

    /// Add a layer with higher precedence than every existing one
    #[must_use]
    pub fn with_layer(mut self, layer: Profile) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(&self) -> &[Profile] {
        &self.layers
    }

    /// Settings without any package pattern applied
    #[must_use]
    pub fn global_settings(&self) -> Settings {
        let mut settings = Settings::new();
        for layer in &self.layers {
            settings.overlay(&layer.settings);
        }
        settings
    }

    /// Settings as seen by one package
    #[must_use]
    pub fn settings_for(&self, reference: &RecipeReference, is_consumer: bool) -> Settings {
        let mut settings = Settings::new();
        for layer in &self.layers {
            settings.overlay(&layer.settings);
            for scoped in &layer.package_settings {
                if scoped.pattern.matches(reference, is_consumer) {
                    settings.overlay(&scoped.settings);
                }
            }
        }
        settings
    }

    /// Option values assigned to one package, last assignment winning
    #[must_use]
    pub fn options_for(&self, reference: &RecipeReference, is_consumer: bool) -> OptionValues {
        let mut values = OptionValues::new();
        for layer in &self.layers {
            for assignment in &layer.options {
                if assignment.pattern.matches(reference, is_consumer) {
                    values.set(assignment.option.clone(), assignment.value.clone());
                }
            }
        }
        values
    }

    /// Conf merged across layers
    #[must_use]
    pub fn conf(&self) -> Conf {
        let mut conf = Conf::new();
        for layer in &self.layers {
            conf.merge(&layer.conf);
        }
        conf
    }

    /// Build policy of the highest layer that declares one
    #[must_use]
    pub fn build_policy(&self) -> &[String] {
        self.layers
            .iter()
            .rev()
            .find(|layer| !layer.build.is_empty())
            .map_or(&[], |layer| layer.build.as_slice())
    }

    /// Validate every settings value of every layer against the schema
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` the schema reports.
    pub fn validate(&self, schema: &SettingsSchema) -> Result<(), ConfigError> {
        for layer in &self.layers {
            schema.validate(&layer.settings)?;
            for scoped in &layer.package_settings {
                schema.validate(&scoped.settings)?;
            }
        }
        Ok(())
    }
}
