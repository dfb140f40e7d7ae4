//! Recipe references and requirement specs
//!
//! A reference names one recipe: `name/version[@user/channel][#revision]`.
//! A package spec is the requirement side of it, where the version may be
//! a bracketed range: `zlib/[>=1.2 <2]@acme/stable`.

use crate::{Version, VersionRange};
use chrono::{DateTime, Utc};
use kiln_errors::VersionError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

fn invalid(input: &str, reason: &str) -> VersionError {
    VersionError::InvalidReference {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_name(input: &str, name: &str, what: &str) -> Result<(), VersionError> {
    if name.is_empty() {
        return Err(invalid(input, &format!("empty {what}")));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+')))
    {
        return Err(invalid(input, &format!("unexpected character '{bad}' in {what}")));
    }
    Ok(())
}

/// The pieces shared by references and specs
struct Parts<'a> {
    name: &'a str,
    version: &'a str,
    user: Option<String>,
    channel: Option<String>,
    revision: Option<String>,
}

fn split_parts(input: &str) -> Result<Parts<'_>, VersionError> {
    let input = input.trim();
    let (rest, revision) = match input.split_once('#') {
        Some((rest, rev)) if !rev.is_empty() => (rest, Some(rev.to_string())),
        Some(_) => return Err(invalid(input, "empty revision")),
        None => (input, None),
    };
    let (rest, user, channel) = match rest.rsplit_once('@') {
        Some((rest, user_channel)) => {
            let (user, channel) = match user_channel.split_once('/') {
                Some((user, channel)) => (user, Some(channel.to_string())),
                None => (user_channel, None),
            };
            validate_name(input, user, "user")?;
            if let Some(channel) = &channel {
                validate_name(input, channel, "channel")?;
            }
            (rest, Some(user.to_string()), channel)
        }
        None => (rest, None, None),
    };
    let (name, version) = rest
        .split_once('/')
        .ok_or_else(|| invalid(input, "expected name/version"))?;
    validate_name(input, name, "name")?;
    if version.trim().is_empty() {
        return Err(invalid(input, "empty version"));
    }

    Ok(Parts {
        name,
        version: version.trim(),
        user,
        channel,
        revision,
    })
}

fn write_user_channel(
    f: &mut fmt::Formatter<'_>,
    user: Option<&String>,
    channel: Option<&String>,
) -> fmt::Result {
    if let Some(user) = user {
        write!(f, "@{user}")?;
        if let Some(channel) = channel {
            write!(f, "/{channel}")?;
        }
    }
    Ok(())
}

/// A concrete recipe reference
///
/// Equality, ordering and hashing ignore the revision and its timestamp;
/// use [`RecipeReference::eq_with_revision`] to compare them too.
#[derive(Debug, Clone)]
pub struct RecipeReference {
    pub name: String,
    pub version: Version,
    pub user: Option<String>,
    pub channel: Option<String>,
    pub revision: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecipeReference {
    /// Create a reference without user, channel or revision
    pub fn new(name: impl Into<String>, version: impl Into<Version>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            user: None,
            channel: None,
            revision: None,
            timestamp: None,
        }
    }

    /// Parse `name/version[@user/channel][#revision]`
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidReference` when the name or version
    /// is missing or contains unexpected characters.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let parts = split_parts(input)?;
        if parts.version.starts_with('[') {
            return Err(invalid(input, "a reference needs an exact version"));
        }
        Ok(Self {
            name: parts.name.to_string(),
            version: Version::parse(parts.version),
            user: parts.user,
            channel: parts.channel,
            revision: parts.revision,
            timestamp: None,
        })
    }

    /// Set the revision and its timestamp
    #[must_use]
    pub fn with_revision(
        mut self,
        revision: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        self.revision = Some(revision.into());
        self.timestamp = timestamp;
        self
    }

    /// Same reference without revision information
    #[must_use]
    pub fn without_revision(&self) -> Self {
        Self {
            revision: None,
            timestamp: None,
            ..self.clone()
        }
    }

    /// Compare including the revision
    #[must_use]
    pub fn eq_with_revision(&self, other: &Self) -> bool {
        self == other && self.revision == other.revision
    }

    /// Text form without the revision
    #[must_use]
    pub fn display_without_revision(&self) -> String {
        self.without_revision().to_string()
    }
}

impl PartialEq for RecipeReference {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.user == other.user
            && self.channel == other.channel
    }
}

impl Eq for RecipeReference {}

impl Hash for RecipeReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.user.hash(state);
        self.channel.hash(state);
    }
}

impl Ord for RecipeReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.user.cmp(&other.user))
            .then_with(|| self.channel.cmp(&other.channel))
    }
}

impl PartialOrd for RecipeReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RecipeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        write_user_channel(f, self.user.as_ref(), self.channel.as_ref())?;
        if let Some(revision) = &self.revision {
            write!(f, "#{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for RecipeReference {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RecipeReference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RecipeReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Version part of a requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Exact(Version),
    Range(VersionRange),
}

impl VersionSpec {
    /// Check if a version satisfies this spec
    #[must_use]
    pub fn matches(&self, version: &Version, resolve_prereleases: bool) -> bool {
        match self {
            Self::Exact(v) => v == version,
            Self::Range(range) => range.contains(version, resolve_prereleases),
        }
    }

    #[must_use]
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Range(range) => write!(f, "{range}"),
        }
    }
}

/// A requirement's target: a name plus an exact version or a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: VersionSpec,
    pub user: Option<String>,
    pub channel: Option<String>,
    pub revision: Option<String>,
}

impl PackageSpec {
    /// Parse `name/version` or `name/[range]`, with optional user, channel
    /// and revision
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if the reference or the range is malformed.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let parts = split_parts(input)?;
        let version = if parts.version.starts_with('[') {
            VersionSpec::Range(VersionRange::parse(parts.version)?)
        } else {
            VersionSpec::Exact(Version::parse(parts.version))
        };
        Ok(Self {
            name: parts.name.to_string(),
            version,
            user: parts.user,
            channel: parts.channel,
            revision: parts.revision,
        })
    }

    /// Whether a concrete reference satisfies this spec
    #[must_use]
    pub fn matches(&self, reference: &RecipeReference, resolve_prereleases: bool) -> bool {
        self.name == reference.name
            && self.user == reference.user
            && self.channel == reference.channel
            && self.version.matches(&reference.version, resolve_prereleases)
            && self
                .revision
                .as_ref()
                .is_none_or(|rev| reference.revision.as_ref() == Some(rev))
    }

    /// The exact reference, when the version is not a range
    #[must_use]
    pub fn as_reference(&self) -> Option<RecipeReference> {
        match &self.version {
            VersionSpec::Exact(version) => Some(RecipeReference {
                name: self.name.clone(),
                version: version.clone(),
                user: self.user.clone(),
                channel: self.channel.clone(),
                revision: self.revision.clone(),
                timestamp: None,
            }),
            VersionSpec::Range(_) => None,
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        write_user_channel(f, self.user.as_ref(), self.channel.as_ref())?;
        if let Some(revision) = &self.revision {
            write!(f, "#{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for PackageSpec {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PackageSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
