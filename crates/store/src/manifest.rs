//! Completion manifests written into every cache entry

use chrono::{DateTime, Utc};
use kiln_errors::{Error, StorageError};
use kiln_hash::Hash;
use kiln_types::{PackageId, RecipeReference};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Contents of `manifest.json`
///
/// The manifest is written last, so an entry without one was never
/// completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryManifest {
    pub reference: RecipeReference,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<PackageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_revision: Option<String>,
    /// BLAKE3 of every file below `files/`
    pub files: BTreeMap<String, Hash>,
}

impl EntryManifest {
    /// Compare recorded hashes against the current tree
    ///
    /// Returns a description of the first difference.
    #[must_use]
    pub fn diff(&self, actual: &BTreeMap<String, Hash>) -> Option<String> {
        for (path, expected) in &self.files {
            match actual.get(path) {
                None => return Some(format!("missing file {path}")),
                Some(hash) if hash != expected => return Some(format!("hash mismatch for {path}")),
                Some(_) => {}
            }
        }
        actual
            .keys()
            .find(|path| !self.files.contains_key(*path))
            .map(|path| format!("unexpected file {path}"))
    }
}

/// Read `manifest.json` from an entry directory
///
/// # Errors
/// Returns an error if reading or parsing the manifest fails.
pub async fn read_manifest(path: &Path) -> Result<EntryManifest, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, path))?;
    serde_json::from_str(&content).map_err(|e| {
        StorageError::CorruptedData {
            message: format!("invalid manifest {}: {e}", path.display()),
        }
        .into()
    })
}

/// Write `manifest.json`
///
/// # Errors
/// Returns an error if serialization or writing fails.
pub async fn write_manifest(path: &Path, manifest: &EntryManifest) -> Result<(), Error> {
    let content = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| StorageError::from_io_with_path(&e, path))?;
    Ok(())
}
