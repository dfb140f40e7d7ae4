//! Lockfile: the exact recipe revisions a resolution picked
//!
//! ```json
//! {
//!   "version": 1,
//!   "strict": false,
//!   "requires": [
//!     { "ref": "zlib/1.3#5f1c3b" },
//!     { "ref": "cmake/3.27.1#9a0e11", "build": true }
//!   ]
//! }
//! ```
//!
//! A locked entry replaces range resolution for requirements it matches.
//! Python requires are exact references already and are never locked.

use kiln_errors::{Error, LockfileError, StorageError};
use kiln_types::{Context, RecipeReference};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::graph::Graph;
use crate::requirement::Requirement;

/// Format version written by this crate
pub const LOCKFILE_VERSION: u32 = 1;

fn is_false(value: &bool) -> bool {
    !*value
}

/// One locked recipe revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    #[serde(rename = "ref")]
    pub reference: RecipeReference,
    /// Locked for the build context
    #[serde(default, skip_serializing_if = "is_false")]
    pub build: bool,
    /// Only reachable through test requirements
    #[serde(default, skip_serializing_if = "is_false")]
    pub test: bool,
    /// Required by the consumer itself
    #[serde(default, skip_serializing_if = "is_false")]
    pub direct: bool,
}

/// Set of locked references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    /// Fail on requirements that have no entry instead of resolving them
    #[serde(default)]
    pub strict: bool,
    #[serde(rename = "requires", default)]
    entries: Vec<LockEntry>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockfile {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: LOCKFILE_VERSION,
            strict: false,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Lock every package node of a resolved graph
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        let mut lockfile = Self::new();
        lockfile.update_from_graph(graph);
        lockfile
    }

    /// Add or replace entries with what the graph resolved
    ///
    /// Entries for packages the graph does not contain are kept.
    pub fn update_from_graph(&mut self, graph: &Graph) {
        let direct: Vec<_> = graph
            .root()
            .edges()
            .iter()
            .map(|edge| edge.target)
            .collect();

        for node in graph.nodes() {
            let Some(reference) = node.reference() else {
                continue;
            };
            let entry = LockEntry {
                reference: reference.clone(),
                build: node.context() == Context::Build,
                test: node.is_test(),
                direct: direct.contains(&node.id()),
            };
            self.insert(entry);
        }
    }

    /// Add an entry, replacing one for the same reference and context
    pub fn insert(&mut self, entry: LockEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.reference == entry.reference && e.build == entry.build)
        {
            existing.test &= entry.test;
            existing.direct |= entry.direct;
            if existing.reference.revision != entry.reference.revision {
                existing.reference = entry.reference;
            }
            return;
        }
        self.entries.push(entry);
        self.sort();
    }

    /// Name, then context, then newest reference first
    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            (&a.reference.name, a.build)
                .cmp(&(&b.reference.name, b.build))
                .then_with(|| b.reference.cmp(&a.reference))
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[LockEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one package name and context, newest first
    pub fn entries_for<'a, 'n>(
        &'a self,
        name: &'n str,
        build: bool,
    ) -> impl Iterator<Item = &'a LockEntry> + use<'a, 'n> {
        self.entries
            .iter()
            .filter(move |entry| entry.reference.name == name && entry.build == build)
    }

    /// The locked reference a requirement resolves to in `context`
    ///
    /// Several versions of one package can be locked when a private
    /// requirement duplicated it; the highest satisfying one is used.
    /// Returns `Ok(None)` when nothing is locked for the requirement and
    /// the lockfile is not strict.
    ///
    /// # Errors
    ///
    /// Returns `LockfileError::Mismatch` when entries exist for the package
    /// but none satisfies the requirement, or `LockfileError::Unlocked` for
    /// a requirement a strict lockfile does not cover.
    pub fn locked(
        &self,
        requirement: &Requirement,
        context: Context,
        resolve_prereleases: bool,
    ) -> Result<Option<&RecipeReference>, LockfileError> {
        let mut candidates = self
            .entries_for(requirement.name(), context == Context::Build)
            .peekable();
        let Some(first) = candidates.peek().map(|entry| entry.reference.to_string()) else {
            if self.strict {
                return Err(LockfileError::Unlocked {
                    requirement: requirement.spec.to_string(),
                });
            }
            return Ok(None);
        };

        candidates
            .find(|entry| requirement.spec.matches(&entry.reference, resolve_prereleases))
            .map(|entry| Some(&entry.reference))
            .ok_or_else(|| LockfileError::Mismatch {
                requirement: requirement.spec.to_string(),
                locked: first,
            })
    }

    /// # Errors
    ///
    /// Returns `LockfileError::Invalid` for malformed JSON,
    /// `LockfileError::UnsupportedVersion` for a newer format, or
    /// `LockfileError::MissingRevision` for an entry without revision.
    pub fn from_json(json: &str) -> Result<Self, LockfileError> {
        let mut lockfile: Self = serde_json::from_str(json).map_err(|e| LockfileError::Invalid {
            message: e.to_string(),
        })?;
        if lockfile.version > LOCKFILE_VERSION {
            return Err(LockfileError::UnsupportedVersion {
                version: lockfile.version,
            });
        }
        if let Some(entry) = lockfile
            .entries
            .iter()
            .find(|entry| entry.reference.revision.is_none())
        {
            return Err(LockfileError::MissingRevision {
                reference: entry.reference.to_string(),
            });
        }
        lockfile.sort();
        Ok(lockfile)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a lockfile from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// lockfile.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path))?;
        let lockfile = Self::from_json(&content)?;
        debug!(path = %path.display(), entries = lockfile.len(), "lockfile loaded");
        Ok(lockfile)
    }

    /// Write the lockfile next to its final path, then rename it in place
    ///
    /// # Errors
    ///
    /// Returns an error if writing or renaming fails.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let content = self.to_json()?;
        let tmp = path.with_extension("lock.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StorageError::AtomicRenameFailed {
                message: format!("{} -> {}: {e}", tmp.display(), path.display()),
            })?;
        debug!(path = %path.display(), entries = self.len(), "lockfile saved");
        Ok(())
    }
}
