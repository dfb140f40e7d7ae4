//! Package patterns used by profiles and build policies
//!
//! A pattern is either `&`, which stands for the consumer being resolved,
//! or a glob matched against the package name and its reference
//! (`zlib`, `zlib/*`, `boost*`, `*`).

use globset::{Glob, GlobMatcher};
use kiln_errors::ConfigError;
use kiln_types::RecipeReference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pattern text standing for the consumer
pub const CONSUMER: &str = "&";

#[derive(Debug, Clone)]
enum Matcher {
    Consumer,
    Glob(GlobMatcher),
}

/// A compiled package pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackagePattern {
    text: String,
    matcher: Matcher,
}

impl PackagePattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if the glob does not compile.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConfigError::InvalidPattern {
                pattern: text.to_string(),
                message: "empty pattern".to_string(),
            });
        }
        let matcher = if text == CONSUMER {
            Matcher::Consumer
        } else {
            let glob = Glob::new(text).map_err(|e| ConfigError::InvalidPattern {
                pattern: text.to_string(),
                message: e.to_string(),
            })?;
            Matcher::Glob(glob.compile_matcher())
        };
        Ok(Self {
            text: text.to_string(),
            matcher,
        })
    }

    /// Whether the pattern applies to a package
    ///
    /// `is_consumer` tells whether `reference` is the root being resolved.
    #[must_use]
    pub fn matches(&self, reference: &RecipeReference, is_consumer: bool) -> bool {
        match &self.matcher {
            Matcher::Consumer => is_consumer,
            Matcher::Glob(glob) => {
                glob.is_match(&reference.name)
                    || glob.is_match(format!("{}/{}", reference.name, reference.version))
                    || glob.is_match(reference.display_without_revision())
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_consumer(&self) -> bool {
        matches!(self.matcher, Matcher::Consumer)
    }
}

impl PartialEq for PackagePattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for PackagePattern {}

impl fmt::Display for PackagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for PackagePattern {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PackagePattern> for String {
    fn from(pattern: PackagePattern) -> Self {
        pattern.text
    }
}
