//! Package sources: the local cache and remote index snapshots

use chrono::{DateTime, Utc};
use kiln_errors::Error;
use kiln_hash::Hash;
use kiln_types::{PackageId, RecipeReference};
use std::fmt;

use crate::models::Index;

/// Where a candidate came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    Cache,
    Remote(String),
}

impl SourceId {
    #[must_use]
    pub fn is_cache(&self) -> bool {
        matches!(self, Self::Cache)
    }

    /// Remote name, `None` for the cache
    #[must_use]
    pub fn remote(&self) -> Option<&str> {
        match self {
            Self::Cache => None,
            Self::Remote(name) => Some(name),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Remote(name) => write!(f, "remote '{name}'"),
        }
    }
}

/// A recipe revision offered by a source
///
/// `reference` always carries its revision and timestamp.
#[derive(Debug, Clone)]
pub struct RecipeCandidate {
    pub reference: RecipeReference,
    pub source: SourceId,
}

/// A binary offered by a source
#[derive(Debug, Clone)]
pub struct BinaryCandidate {
    pub package_id: PackageId,
    pub package_revision: String,
    pub timestamp: DateTime<Utc>,
    /// Absent for binaries already in the cache
    pub download_url: Option<String>,
    pub blake3: Option<Hash>,
    pub source: SourceId,
}

/// Contract every recipe and binary source implements
///
/// Lookups are synchronous: backends answer from an in-memory snapshot
/// loaded before resolution starts.
pub trait PackageBackend: Send + Sync {
    /// Identity used for tie-breaks
    fn source(&self) -> SourceId;

    /// Every recipe revision published under `name` for this user/channel
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn recipe_candidates(
        &self,
        name: &str,
        user: Option<&str>,
        channel: Option<&str>,
    ) -> Result<Vec<RecipeCandidate>, Error>;

    /// The binary for `package_id` of one recipe revision, if present
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn binary(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Result<Option<BinaryCandidate>, Error>;
}

/// A remote served from a loaded index snapshot
#[derive(Debug, Clone)]
pub struct IndexBackend {
    remote: String,
    index: Index,
}

impl IndexBackend {
    pub fn new(remote: impl Into<String>, index: Index) -> Self {
        Self {
            remote: remote.into(),
            index,
        }
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }
}

impl PackageBackend for IndexBackend {
    fn source(&self) -> SourceId {
        SourceId::Remote(self.remote.clone())
    }

    fn recipe_candidates(
        &self,
        name: &str,
        user: Option<&str>,
        channel: Option<&str>,
    ) -> Result<Vec<RecipeCandidate>, Error> {
        let Some(package) = self.index.packages.get(name) else {
            return Ok(Vec::new());
        };
        Ok(package
            .recipes
            .iter()
            .filter(|entry| entry.user.as_deref() == user && entry.channel.as_deref() == channel)
            .map(|entry| RecipeCandidate {
                reference: entry.reference(name),
                source: self.source(),
            })
            .collect())
    }

    fn binary(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Result<Option<BinaryCandidate>, Error> {
        let Some(entry) = self.index.binary(reference, package_id) else {
            return Ok(None);
        };
        Ok(Some(BinaryCandidate {
            package_id: package_id.clone(),
            package_revision: entry.package_revision.clone(),
            timestamp: entry.timestamp,
            download_url: Some(entry.download_url.clone()),
            blake3: Some(Hash::from_hex(&entry.blake3)?),
            source: self.source(),
        }))
    }
}
