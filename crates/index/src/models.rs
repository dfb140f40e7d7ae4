//! Index data models

use chrono::{DateTime, Utc};
use kiln_errors::{Error, StorageError};
use kiln_hash::Hash;
use kiln_types::{PackageId, RecipeReference, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remote index snapshot
///
/// ```json
/// {
///   "version": 1,
///   "timestamp": "2025-05-29T12:00:00Z",
///   "packages": {
///     "zlib": {
///       "recipes": [{
///         "version": "1.3",
///         "revision": "5f1c3b",
///         "timestamp": "2025-05-01T08:00:00Z",
///         "binaries": {
///           "<package id>": {
///             "package_revision": "a1",
///             "timestamp": "2025-05-01T09:00:00Z",
///             "download_url": "https://cdn.example.com/zlib/1.3/a1.tgz",
///             "blake3": "<hex>"
///           }
///         }
///       }]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    #[serde(flatten)]
    pub metadata: IndexMetadata,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageEntry>,
}

/// Index metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

/// Every recipe revision published under one name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageEntry {
    #[serde(default)]
    pub recipes: Vec<RecipeEntry>,
}

/// One recipe revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub revision: String,
    pub timestamp: DateTime<Utc>,
    /// Binaries keyed by package id
    #[serde(default)]
    pub binaries: BTreeMap<String, BinaryEntry>,
}

/// One prebuilt binary of a recipe revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryEntry {
    pub package_revision: String,
    pub timestamp: DateTime<Utc>,
    pub download_url: String,
    pub blake3: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

fn corrupted(message: String) -> Error {
    StorageError::CorruptedData { message }.into()
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    /// Create a new empty index
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: IndexMetadata {
                version: crate::SUPPORTED_INDEX_VERSION,
                timestamp: Utc::now(),
            },
            packages: BTreeMap::new(),
        }
    }

    /// Parse index from JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| corrupted(format!("invalid index JSON: {e}")))
    }

    /// Serialize index to JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be serialized to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self)
            .map_err(|e| corrupted(format!("failed to serialize index: {e}")))
    }

    /// Validate index format and version
    ///
    /// # Errors
    ///
    /// Returns an error if the index version is unsupported, a name, version
    /// or revision is empty, or a binary lacks its URL or a valid hash.
    pub fn validate(&self) -> Result<(), Error> {
        if self.metadata.version > crate::SUPPORTED_INDEX_VERSION {
            return Err(corrupted(format!(
                "index version {} is newer than supported version {}",
                self.metadata.version,
                crate::SUPPORTED_INDEX_VERSION
            )));
        }

        for (name, package) in &self.packages {
            if name.is_empty() {
                return Err(corrupted("empty package name in index".to_string()));
            }

            for recipe in &package.recipes {
                if recipe.version.is_empty() {
                    return Err(corrupted(format!("empty version for package {name}")));
                }
                if recipe.revision.is_empty() {
                    return Err(corrupted(format!(
                        "missing revision for {name}/{}",
                        recipe.version
                    )));
                }

                for (package_id, binary) in &recipe.binaries {
                    if binary.download_url.is_empty() {
                        return Err(corrupted(format!(
                            "missing download URL for {name}/{}:{package_id}",
                            recipe.version
                        )));
                    }
                    Hash::from_hex(&binary.blake3)?;
                }
            }
        }

        Ok(())
    }

    /// Add a recipe revision, replacing an entry with the same revision
    pub fn add_recipe(&mut self, name: impl Into<String>, entry: RecipeEntry) {
        let recipes = &mut self.packages.entry(name.into()).or_default().recipes;
        recipes.retain(|r| !(r.version == entry.version && r.revision == entry.revision));
        recipes.push(entry);
    }

    /// Look up one recipe revision
    #[must_use]
    pub fn recipe(&self, reference: &RecipeReference) -> Option<&RecipeEntry> {
        let revision = reference.revision.as_deref()?;
        self.packages
            .get(&reference.name)?
            .recipes
            .iter()
            .find(|entry| {
                entry.revision == revision && entry.reference(&reference.name) == *reference
            })
    }

    /// Look up a binary of one recipe revision
    #[must_use]
    pub fn binary(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Option<&BinaryEntry> {
        self.recipe(reference)?.binaries.get(package_id.as_str())
    }

    /// Get total package count
    #[must_use]
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    /// Get total recipe revision count
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.packages.values().map(|p| p.recipes.len()).sum()
    }
}

impl RecipeEntry {
    /// The full reference of this entry, revision and timestamp included
    #[must_use]
    pub fn reference(&self, name: &str) -> RecipeReference {
        RecipeReference {
            name: name.to_string(),
            version: Version::parse(&self.version),
            user: self.user.clone(),
            channel: self.channel.clone(),
            revision: Some(self.revision.clone()),
            timestamp: Some(self.timestamp),
        }
    }
}
