#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Local package cache for kiln
//!
//! Recipes are keyed by `(name, version, user, channel, revision)` and
//! binaries additionally by `(package_id, package_revision)`. Every entry
//! is assembled in a staging directory under `<root>/tmp` and renamed into
//! place, so a partially written entry is never visible. Each entry carries
//! a manifest with BLAKE3 hashes of its files; an entry whose manifest is
//! missing or whose files no longer match is reported as corrupted and can
//! be removed on its own.

mod layout;
mod manifest;
mod tree;

pub use manifest::{read_manifest, write_manifest, EntryManifest};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kiln_errors::{Error, StorageError};
use kiln_hash::hash_tree;
use kiln_index::{BinaryCandidate, PackageBackend, RecipeCandidate, SourceId};
use kiln_types::{PackageId, RecipeReference};
use layout::{
    package_dir, package_id_dir, recipe_dir, recipe_packages_dir, reference_from_segments,
    FILES_DIR, MANIFEST_FILE, PACKAGES_DIR, PACKAGE_DEPTH, RECIPES_DIR, RECIPE_DEPTH, TEMP_DIR,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// One binary revision held in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub package_revision: String,
    pub timestamp: DateTime<Utc>,
}

/// A directory being assembled before it is committed
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    /// Where the entry's files go
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.dir.join(FILES_DIR)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Drop a staging directory that will not be committed
    pub async fn discard(self) {
        if let Err(e) = fs::remove_dir_all(&self.dir).await {
            warn!(path = %self.dir.display(), error = %e, "failed to remove staging directory");
        }
    }
}

type PackageKey = (String, String);

fn package_key(reference: &RecipeReference, package_id: &PackageId) -> PackageKey {
    (reference.to_string(), package_id.as_str().to_string())
}

/// Filesystem-backed package cache
#[derive(Debug)]
pub struct LocalCache {
    root: PathBuf,
    recipes: DashMap<String, Vec<RecipeReference>>,
    packages: DashMap<PackageKey, Vec<PackageRecord>>,
    corrupted_recipes: DashMap<String, String>,
    corrupted_packages: DashMap<PackageKey, String>,
}

impl LocalCache {
    /// Open the cache at `root`, creating it when missing
    ///
    /// Leftover staging directories from interrupted writes are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directories cannot be created or read.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        for dir in [RECIPES_DIR, PACKAGES_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, &path))?;
        }
        let temp = root.join(TEMP_DIR);
        if fs::metadata(&temp).await.is_ok() {
            fs::remove_dir_all(&temp)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, &temp))?;
        }

        let cache = Self {
            root,
            recipes: DashMap::new(),
            packages: DashMap::new(),
            corrupted_recipes: DashMap::new(),
            corrupted_packages: DashMap::new(),
        };
        cache.scan().await?;
        Ok(cache)
    }

    async fn scan(&self) -> Result<(), Error> {
        for (dir, segments) in tree::entry_dirs(&self.root.join(RECIPES_DIR), RECIPE_DEPTH).await? {
            let Some(reference) = reference_from_segments(&segments) else {
                continue;
            };
            match read_manifest(&dir.join(MANIFEST_FILE)).await {
                Ok(manifest) => self.index_recipe(manifest.reference.with_revision(
                    reference.revision.clone().unwrap_or_default(),
                    Some(manifest.timestamp),
                )),
                Err(e) => {
                    warn!(
                        reference = %reference,
                        error = %e,
                        "recipe entry without a valid manifest"
                    );
                    self.corrupted_recipes
                        .insert(reference.to_string(), "missing manifest".to_string());
                }
            }
        }

        for (dir, segments) in
            tree::entry_dirs(&self.root.join(PACKAGES_DIR), PACKAGE_DEPTH).await?
        {
            let Some(reference) = reference_from_segments(&segments) else {
                continue;
            };
            let package_id = PackageId::new(segments[5].clone());
            match read_manifest(&dir.join(MANIFEST_FILE)).await {
                Ok(manifest) => self.index_package(
                    &reference,
                    &package_id,
                    PackageRecord {
                        package_revision: segments[6].clone(),
                        timestamp: manifest.timestamp,
                    },
                ),
                Err(e) => {
                    warn!(
                        reference = %reference,
                        package_id = %package_id,
                        error = %e,
                        "package entry without a valid manifest"
                    );
                    self.corrupted_packages.insert(
                        package_key(&reference, &package_id),
                        "missing manifest".to_string(),
                    );
                }
            }
        }

        debug!(
            recipes = self.recipes.iter().map(|e| e.len()).sum::<usize>(),
            packages = self.packages.len(),
            "cache scanned"
        );
        Ok(())
    }

    fn index_recipe(&self, reference: RecipeReference) {
        let mut revisions = self.recipes.entry(reference.name.clone()).or_default();
        revisions.retain(|r| !r.eq_with_revision(&reference));
        revisions.push(reference);
    }

    fn index_package(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
        record: PackageRecord,
    ) {
        let mut records = self
            .packages
            .entry(package_key(reference, package_id))
            .or_default();
        records.retain(|r| r.package_revision != record.package_revision);
        records.push(record);
        records.sort_by_key(|r| r.timestamp);
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this exact recipe revision is present and complete
    #[must_use]
    pub fn has_recipe(&self, reference: &RecipeReference) -> bool {
        self.recipes
            .get(&reference.name)
            .is_some_and(|revisions| revisions.iter().any(|r| r.eq_with_revision(reference)))
    }

    /// Binary revisions of one package id, oldest first
    #[must_use]
    pub fn package_revisions(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Vec<PackageRecord> {
        self.packages
            .get(&package_key(reference, package_id))
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Files directory of a recipe revision
    ///
    /// # Errors
    ///
    /// Returns `StorageError::RecipeCorrupted` for an incomplete entry and
    /// `StorageError::PathNotFound` when the revision is not cached.
    pub fn recipe_path(&self, reference: &RecipeReference) -> Result<PathBuf, Error> {
        if let Some(reason) = self.corrupted_recipes.get(&reference.to_string()) {
            return Err(StorageError::RecipeCorrupted {
                reference: reference.to_string(),
                reason: reason.clone(),
            }
            .into());
        }
        let dir = recipe_dir(&self.root, reference)?;
        if !self.has_recipe(reference) {
            return Err(StorageError::PathNotFound {
                path: dir.display().to_string(),
            }
            .into());
        }
        Ok(dir.join(FILES_DIR))
    }

    /// Files directory of the newest binary revision of a package id
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PackageCorrupted` for an incomplete entry and
    /// `StorageError::PathNotFound` when no binary is cached.
    pub fn package_path(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Result<PathBuf, Error> {
        let key = package_key(reference, package_id);
        if let Some(reason) = self.corrupted_packages.get(&key) {
            return Err(StorageError::PackageCorrupted {
                reference: reference.to_string(),
                package_id: package_id.to_string(),
                reason: reason.clone(),
            }
            .into());
        }
        let latest = self
            .package_revisions(reference, package_id)
            .pop()
            .ok_or_else(|| StorageError::PathNotFound {
                path: format!("{reference}:{package_id}"),
            })?;
        let dir = package_dir(&self.root, reference, package_id, &latest.package_revision)?;
        Ok(dir.join(FILES_DIR))
    }

    /// Create an empty staging directory inside the cache root
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn staging(&self) -> Result<Staging, Error> {
        let dir = self.root.join(TEMP_DIR).join(Uuid::new_v4().to_string());
        let files = dir.join(FILES_DIR);
        fs::create_dir_all(&files)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &files))?;
        Ok(Staging { dir })
    }

    async fn commit(
        &self,
        staging: Staging,
        manifest: &EntryManifest,
        dest: &Path,
    ) -> Result<(), Error> {
        write_manifest(&staging.dir.join(MANIFEST_FILE), manifest).await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, parent))?;
        }
        if fs::metadata(dest).await.is_ok() {
            fs::remove_dir_all(dest)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, dest))?;
        }
        fs::rename(&staging.dir, dest)
            .await
            .map_err(|e| StorageError::AtomicRenameFailed {
                message: format!("{} -> {}: {e}", staging.dir.display(), dest.display()),
            })?;
        Ok(())
    }

    /// Move a staged recipe into place
    ///
    /// # Errors
    ///
    /// Returns an error if the reference has no revision or the entry
    /// cannot be written.
    pub async fn commit_recipe(
        &self,
        staging: Staging,
        reference: &RecipeReference,
    ) -> Result<PathBuf, Error> {
        let dest = recipe_dir(&self.root, reference)?;
        let timestamp = reference.timestamp.unwrap_or_else(Utc::now);
        let manifest = EntryManifest {
            reference: reference.clone(),
            timestamp,
            package_id: None,
            package_revision: None,
            files: hash_tree(&staging.files_dir()).await?,
        };
        self.commit(staging, &manifest, &dest).await?;

        let revision = reference.revision.clone().unwrap_or_default();
        self.index_recipe(reference.clone().with_revision(revision, Some(timestamp)));
        self.corrupted_recipes.remove(&reference.to_string());
        debug!(reference = %reference, "recipe stored");
        Ok(dest.join(FILES_DIR))
    }

    /// Move a staged binary into place
    ///
    /// # Errors
    ///
    /// Returns an error if the reference has no revision or the entry
    /// cannot be written.
    pub async fn commit_package(
        &self,
        staging: Staging,
        reference: &RecipeReference,
        package_id: &PackageId,
        package_revision: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, Error> {
        let dest = package_dir(&self.root, reference, package_id, package_revision)?;
        let manifest = EntryManifest {
            reference: reference.clone(),
            timestamp,
            package_id: Some(package_id.clone()),
            package_revision: Some(package_revision.to_string()),
            files: hash_tree(&staging.files_dir()).await?,
        };
        self.commit(staging, &manifest, &dest).await?;

        self.index_package(
            reference,
            package_id,
            PackageRecord {
                package_revision: package_revision.to_string(),
                timestamp,
            },
        );
        self.corrupted_packages
            .remove(&package_key(reference, package_id));
        debug!(reference = %reference, package_id = %package_id, "package stored");
        Ok(dest.join(FILES_DIR))
    }

    /// Copy a recipe export directory into the cache
    ///
    /// # Errors
    ///
    /// Returns an error if copying or committing fails.
    pub async fn store_recipe(
        &self,
        reference: &RecipeReference,
        source: &Path,
    ) -> Result<PathBuf, Error> {
        let staging = self.staging().await?;
        tree::copy_tree(source, &staging.files_dir()).await?;
        self.commit_recipe(staging, reference).await
    }

    /// Copy a built package directory into the cache
    ///
    /// # Errors
    ///
    /// Returns an error if copying or committing fails.
    pub async fn store_package(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
        package_revision: &str,
        source: &Path,
    ) -> Result<PathBuf, Error> {
        let staging = self.staging().await?;
        tree::copy_tree(source, &staging.files_dir()).await?;
        self.commit_package(staging, reference, package_id, package_revision, Utc::now())
            .await
    }

    /// Re-hash a recipe entry against its manifest
    ///
    /// # Errors
    ///
    /// Returns `StorageError::RecipeCorrupted` when the manifest is missing
    /// or a file changed.
    pub async fn verify_recipe(&self, reference: &RecipeReference) -> Result<(), Error> {
        let dir = recipe_dir(&self.root, reference)?;
        let corrupted = |reason: String| {
            self.corrupted_recipes
                .insert(reference.to_string(), reason.clone());
            Error::from(StorageError::RecipeCorrupted {
                reference: reference.to_string(),
                reason,
            })
        };
        let Ok(manifest) = read_manifest(&dir.join(MANIFEST_FILE)).await else {
            return Err(corrupted("missing manifest".to_string()));
        };
        let actual = hash_tree(&dir.join(FILES_DIR)).await?;
        match manifest.diff(&actual) {
            Some(reason) => Err(corrupted(reason)),
            None => Ok(()),
        }
    }

    /// Re-hash the newest binary of a package id against its manifest
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PackageCorrupted` when the manifest is missing
    /// or a file changed.
    pub async fn verify_package(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Result<(), Error> {
        let files = self.package_path(reference, package_id)?;
        let dir = files.parent().map(Path::to_path_buf).unwrap_or_default();
        let corrupted = |reason: String| {
            self.corrupted_packages
                .insert(package_key(reference, package_id), reason.clone());
            Error::from(StorageError::PackageCorrupted {
                reference: reference.to_string(),
                package_id: package_id.to_string(),
                reason,
            })
        };
        let Ok(manifest) = read_manifest(&dir.join(MANIFEST_FILE)).await else {
            return Err(corrupted("missing manifest".to_string()));
        };
        let actual = hash_tree(&files).await?;
        match manifest.diff(&actual) {
            Some(reason) => Err(corrupted(reason)),
            None => Ok(()),
        }
    }

    /// Remove one recipe revision and every binary built from it
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be removed.
    pub async fn remove_recipe(&self, reference: &RecipeReference) -> Result<(), Error> {
        let dir = recipe_dir(&self.root, reference)?;
        let packages = recipe_packages_dir(&self.root, reference)?;
        for path in [&dir, &packages] {
            if fs::metadata(path).await.is_ok() {
                fs::remove_dir_all(path)
                    .await
                    .map_err(|e| StorageError::from_io_with_path(&e, path))?;
            }
        }

        if let Some(mut revisions) = self.recipes.get_mut(&reference.name) {
            revisions.retain(|r| !r.eq_with_revision(reference));
        }
        let key = reference.to_string();
        self.corrupted_recipes.remove(&key);
        self.packages.retain(|(r, _), _| *r != key);
        self.corrupted_packages.retain(|(r, _), _| *r != key);
        tree::prune_empty(&self.root.join(RECIPES_DIR)).await?;
        tree::prune_empty(&self.root.join(PACKAGES_DIR)).await?;
        debug!(reference = %reference, "recipe removed");
        Ok(())
    }

    /// Remove every binary revision of one package id
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub async fn remove_package(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Result<(), Error> {
        let dir = package_id_dir(&self.root, reference, package_id)?;
        if fs::metadata(&dir).await.is_ok() {
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, &dir))?;
        }
        let key = package_key(reference, package_id);
        self.packages.remove(&key);
        self.corrupted_packages.remove(&key);
        tree::prune_empty(&self.root.join(PACKAGES_DIR)).await?;
        Ok(())
    }
}

impl PackageBackend for LocalCache {
    fn source(&self) -> SourceId {
        SourceId::Cache
    }

    fn recipe_candidates(
        &self,
        name: &str,
        user: Option<&str>,
        channel: Option<&str>,
    ) -> Result<Vec<RecipeCandidate>, Error> {
        let Some(revisions) = self.recipes.get(name) else {
            return Ok(Vec::new());
        };
        Ok(revisions
            .iter()
            .filter(|r| r.user.as_deref() == user && r.channel.as_deref() == channel)
            .map(|r| RecipeCandidate {
                reference: r.clone(),
                source: SourceId::Cache,
            })
            .collect())
    }

    fn binary(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
    ) -> Result<Option<BinaryCandidate>, Error> {
        if reference.revision.is_none() {
            return Ok(None);
        }
        Ok(self
            .package_revisions(reference, package_id)
            .pop()
            .map(|record| BinaryCandidate {
                package_id: package_id.clone(),
                package_revision: record.package_revision,
                timestamp: record.timestamp,
                download_url: None,
                blake3: None,
                source: SourceId::Cache,
            }))
    }
}
