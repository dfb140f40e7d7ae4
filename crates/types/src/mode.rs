//! Package id modes, contexts and the package id itself

use kiln_errors::VersionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much of a dependency's identity flows into a consumer's package id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageIdMode {
    #[serde(rename = "unrelated_mode")]
    Unrelated,
    #[serde(rename = "major_mode")]
    Major,
    #[serde(rename = "minor_mode")]
    Minor,
    #[serde(rename = "patch_mode")]
    Patch,
    #[serde(rename = "semver_mode")]
    Semver,
    #[serde(rename = "full_version_mode")]
    FullVersion,
    #[serde(rename = "full_recipe_mode")]
    FullRecipe,
    #[serde(rename = "recipe_revision_mode")]
    RecipeRevision,
    #[serde(rename = "full_package_mode")]
    FullPackage,
    #[serde(rename = "full_mode")]
    Full,
}

impl PackageIdMode {
    pub const ALL: [Self; 10] = [
        Self::Unrelated,
        Self::Major,
        Self::Minor,
        Self::Patch,
        Self::Semver,
        Self::FullVersion,
        Self::FullRecipe,
        Self::RecipeRevision,
        Self::FullPackage,
        Self::Full,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unrelated => "unrelated_mode",
            Self::Major => "major_mode",
            Self::Minor => "minor_mode",
            Self::Patch => "patch_mode",
            Self::Semver => "semver_mode",
            Self::FullVersion => "full_version_mode",
            Self::FullRecipe => "full_recipe_mode",
            Self::RecipeRevision => "recipe_revision_mode",
            Self::FullPackage => "full_package_mode",
            Self::Full => "full_mode",
        }
    }
}

impl fmt::Display for PackageIdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageIdMode {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| VersionError::InvalidMode {
                input: s.to_string(),
            })
    }
}

/// Context a node is resolved in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// Runs on the target machine
    Host,
    /// Runs during the build (tool requires)
    Build,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// Hex digest identifying one binary configuration of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
