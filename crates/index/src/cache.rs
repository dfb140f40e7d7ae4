//! On-disk copies of remote index snapshots

use crate::models::Index;
use kiln_errors::{Error, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Index snapshot cache, one file per remote
#[derive(Debug, Clone)]
pub struct IndexCache {
    cache_dir: PathBuf,
}

impl IndexCache {
    /// Create a new cache manager
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    fn index_path(&self, remote: &str) -> PathBuf {
        self.cache_dir.join(format!("{remote}.json"))
    }

    fn etag_path(&self, remote: &str) -> PathBuf {
        self.cache_dir.join(format!("{remote}.etag"))
    }

    /// Load the snapshot of `remote`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file doesn't exist or contains invalid data.
    pub async fn load(&self, remote: &str) -> Result<Index, Error> {
        let path = self.index_path(remote);

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &path))?;

        let index = Index::from_json(&content)?;
        index.validate()?;
        Ok(index)
    }

    /// Save the snapshot of `remote`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the file cannot be written.
    pub async fn save(&self, remote: &str, index: &Index) -> Result<(), Error> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| StorageError::IoError {
                message: format!("failed to create cache dir: {e}"),
            })?;

        let path = self.index_path(remote);
        let json = index.to_json()?;

        // Write to temporary file first
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .await
            .map_err(|e| StorageError::IoError {
                message: format!("failed to write cache: {e}"),
            })?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::AtomicRenameFailed {
                message: format!("{}: {e}", path.display()),
            })?;

        Ok(())
    }

    /// Check if a snapshot exists
    pub async fn exists(&self, remote: &str) -> bool {
        fs::metadata(self.index_path(remote)).await.is_ok()
    }

    /// Remove the snapshot and its `ETag`
    pub async fn clear(&self, remote: &str) {
        let _ = fs::remove_file(self.index_path(remote)).await;
        let _ = fs::remove_file(self.etag_path(remote)).await;
    }

    /// Load the cached `ETag`, `None` when absent
    pub async fn load_etag(&self, remote: &str) -> Option<String> {
        fs::read_to_string(self.etag_path(remote))
            .await
            .ok()
            .and_then(|content| content.lines().next().map(String::from))
    }

    /// Save `ETag`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_etag(&self, remote: &str, etag: &str) -> Result<(), Error> {
        let path = self.etag_path(remote);
        fs::write(&path, etag)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &path))?;
        Ok(())
    }
}
