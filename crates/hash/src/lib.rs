#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! BLAKE3 hashing for kiln
//!
//! Package ids are BLAKE3 digests of canonical text, and the cache records
//! BLAKE3 digests of every stored file to detect corruption.

use blake3::Hasher;
use kiln_errors::{Error, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Hex digest of empty input
pub const EMPTY_HEX: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

/// A BLAKE3 hash value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    bytes: [u8; 32],
}

impl Hash {
    /// Create a hash from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from hex string
    ///
    /// # Errors
    /// Returns an error if the input string is not valid hexadecimal or is
    /// not exactly 64 characters (32 bytes).
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| StorageError::CorruptedData {
            message: format!("invalid hex: {e}"),
        })?;

        if bytes.len() != 32 {
            return Err(StorageError::CorruptedData {
                message: format!("hash must be 32 bytes, got {}", bytes.len()),
            }
            .into());
        }

        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self::from_bytes(array))
    }

    /// Compute hash of a byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self::from_bytes(*hash.as_bytes())
    }

    /// Compute hash of a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, read, or if any I/O operation fails.
    pub async fn hash_file(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|_| StorageError::PathNotFound {
                path: path.display().to_string(),
            })?;

        let mut hasher = Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self::from_bytes(*hasher.finalize().as_bytes()))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hex BLAKE3 digest of a text
#[must_use]
pub fn digest_hex(text: &str) -> String {
    Hash::from_data(text.as_bytes()).to_hex()
}

/// Verify a file matches an expected hash
///
/// # Errors
/// Returns an error if the file cannot be read or hashed.
pub async fn verify_file(path: &Path, expected: &Hash) -> Result<bool, Error> {
    let actual = Hash::hash_file(path).await?;
    Ok(actual == *expected)
}

/// Hash every regular file below `root`
///
/// Keys are `/` separated paths relative to `root`, so the result is
/// stable across platforms and can be stored in a manifest.
///
/// # Errors
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub async fn hash_tree(root: &Path) -> Result<BTreeMap<String, Hash>, Error> {
    let mut hashes = BTreeMap::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|_| StorageError::IoError {
                        message: format!("failed to compute relative path for {}", path.display()),
                    })?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                hashes.insert(relative, Hash::hash_file(&path).await?);
            }
        }
    }

    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_basics() {
        let data = b"hello world";
        let hash = Hash::from_data(data);

        // Known BLAKE3 hash of "hello world"
        let expected = "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24";
        assert_eq!(hash.to_hex(), expected);
    }

    #[test]
    fn test_empty_digest() {
        assert_eq!(digest_hex(""), EMPTY_HEX);
    }

    #[test]
    fn test_hash_serialization() {
        let hash = Hash::from_data(b"test");
        let json = serde_json::to_string(&hash).unwrap();
        let deserialized: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, deserialized);
    }

    #[tokio::test]
    async fn test_hash_file() {
        use std::io::Write;
        let mut temp = NamedTempFile::new().unwrap();
        let data = b"test file content";
        temp.write_all(data).unwrap();

        let hash = Hash::hash_file(temp.path()).await.unwrap();
        let expected = Hash::from_data(data);
        assert_eq!(hash, expected);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = Hash::hash_file(Path::new("/nonexistent/kiln/file"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::PathNotFound { .. })
        ));
    }
}
