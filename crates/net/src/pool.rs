//! Bounded pool that downloads prebuilt packages into the local cache

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use kiln_config::Config;
use kiln_errors::{Error, NetworkError, StorageError};
use kiln_events::{DownloadEvent, EventEmitter, FailureContext};
use kiln_hash::Hash;
use kiln_index::BinaryCandidate;
use kiln_store::{LocalCache, Staging};
use kiln_types::{PackageId, RecipeReference};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::client::{classify, NetClient};

/// Archive name used when the URL does not end in a usable file name
const DEFAULT_ARCHIVE: &str = "package.tgz";

/// One binary to fetch from a remote
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub reference: RecipeReference,
    pub package_id: PackageId,
    pub package_revision: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub expected: Option<Hash>,
}

impl DownloadRequest {
    /// Request for a binary offered by a remote
    ///
    /// Returns `None` for binaries already in the cache and for index
    /// entries without a download URL.
    #[must_use]
    pub fn from_candidate(
        reference: &RecipeReference,
        candidate: &BinaryCandidate,
    ) -> Option<Self> {
        if candidate.source.is_cache() {
            return None;
        }
        let url = candidate.download_url.clone()?;
        Some(Self {
            reference: reference.clone(),
            package_id: candidate.package_id.clone(),
            package_revision: candidate.package_revision.clone(),
            timestamp: candidate.timestamp,
            url,
            expected: candidate.blake3.clone(),
        })
    }

    /// `reference:package_id`, as listed in batch failures
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.reference, self.package_id)
    }

    fn archive_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('/').next() {
            Some(name) if !name.is_empty() && name != "." && name != ".." => name,
            _ => DEFAULT_ARCHIVE,
        }
    }
}

/// A binary that is now in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPackage {
    pub reference: RecipeReference,
    pub package_id: PackageId,
    /// Files directory of the committed cache entry
    pub path: PathBuf,
    pub hash: Hash,
    pub size: u64,
    /// Already cached, nothing was transferred
    pub reused: bool,
}

/// Downloads binaries with at most `parallel_downloads` transfers in flight
///
/// Every request runs to completion even when others fail; failures are
/// reported together once the batch is done.
#[derive(Debug, Clone)]
pub struct DownloadPool {
    client: NetClient,
    cache: Arc<LocalCache>,
    semaphore: Arc<Semaphore>,
}

impl DownloadPool {
    #[must_use]
    pub fn new(client: NetClient, cache: Arc<LocalCache>, parallel_downloads: usize) -> Self {
        Self {
            client,
            cache,
            semaphore: Arc::new(Semaphore::new(parallel_downloads.max(1))),
        }
    }

    /// Pool sized by `[general] parallel_downloads`
    #[must_use]
    pub fn from_config(client: NetClient, cache: Arc<LocalCache>, config: &Config) -> Self {
        Self::new(client, cache, config.general.parallel_downloads)
    }

    /// Download every request into the cache
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::BatchFailed` listing every failed request once
    /// all of them have finished. Successful downloads stay in the cache.
    pub async fn download_all(
        &self,
        requests: &[DownloadRequest],
    ) -> Result<Vec<DownloadedPackage>, Error> {
        let started = Instant::now();
        for (position, request) in requests.iter().enumerate() {
            self.client.emit_download(DownloadEvent::Queued {
                url: request.url.clone(),
                package: request.label(),
                queue_position: position,
            });
        }

        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .map(|request| async move {
                let result = match self.semaphore.acquire().await {
                    Ok(_permit) => self.download(request).await,
                    Err(e) => Err(Error::internal(format!("download pool closed: {e}"))),
                };
                (request, result)
            })
            .collect();

        let mut downloaded = Vec::new();
        let mut failures = Vec::new();
        while let Some((request, result)) = pending.next().await {
            match result {
                Ok(package) => downloaded.push(package),
                Err(e) => {
                    warn!(
                        package = %request.label(),
                        url = %request.url,
                        error = %e,
                        "download failed"
                    );
                    self.client.emit_download(DownloadEvent::failed(
                        request.url.clone(),
                        request.label(),
                        FailureContext::from_error(&e),
                    ));
                    failures.push(format!("{}: {e}", request.label()));
                }
            }
        }

        self.client.emit_download(DownloadEvent::BatchCompleted {
            succeeded: downloaded.len(),
            failed: failures.len(),
            total_time: started.elapsed(),
        });
        if !failures.is_empty() {
            failures.sort();
            return Err(NetworkError::BatchFailed { failures }.into());
        }
        info!(packages = downloaded.len(), "downloads completed");
        Ok(downloaded)
    }

    /// Fetch one binary into a staging directory and commit it
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadedPackage, Error> {
        if let Some(package) = self.reuse(request).await? {
            return Ok(package);
        }

        let started = Instant::now();
        self.client.emit_download(DownloadEvent::Started {
            url: request.url.clone(),
            package: request.label(),
        });

        let staging = self.cache.staging().await?;
        let (hash, size) = match self.fetch_into(request, &staging).await {
            Ok(fetched) => fetched,
            Err(e) => {
                staging.discard().await;
                return Err(e);
            }
        };

        let path = self
            .cache
            .commit_package(
                staging,
                &request.reference,
                &request.package_id,
                &request.package_revision,
                request.timestamp,
            )
            .await?;

        self.client.emit_download(DownloadEvent::Completed {
            url: request.url.clone(),
            package: request.label(),
            final_size: size,
            total_time: started.elapsed(),
            hash: hash.to_hex(),
        });
        debug!(package = %request.label(), size, "package downloaded");
        Ok(DownloadedPackage {
            reference: request.reference.clone(),
            package_id: request.package_id.clone(),
            path,
            hash,
            size,
            reused: false,
        })
    }

    /// The cached entry for this exact binary revision, when it is intact
    async fn reuse(&self, request: &DownloadRequest) -> Result<Option<DownloadedPackage>, Error> {
        let cached = self
            .cache
            .package_revisions(&request.reference, &request.package_id)
            .iter()
            .any(|record| record.package_revision == request.package_revision);
        if !cached {
            return Ok(None);
        }
        if self
            .cache
            .verify_package(&request.reference, &request.package_id)
            .await
            .is_err()
        {
            return Ok(None);
        }

        let path = self.cache.package_path(&request.reference, &request.package_id)?;
        let archive = path.join(request.archive_name());
        let hash = match &request.expected {
            Some(expected) => {
                if !kiln_hash::verify_file(&archive, expected).await? {
                    debug!(package = %request.label(), "cached archive differs, refetching");
                    return Ok(None);
                }
                expected.clone()
            }
            None => Hash::hash_file(&archive).await?,
        };
        let size = tokio::fs::metadata(&archive)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &archive))?
            .len();
        debug!(package = %request.label(), "package already cached");
        Ok(Some(DownloadedPackage {
            reference: request.reference.clone(),
            package_id: request.package_id.clone(),
            path,
            hash,
            size,
            reused: true,
        }))
    }

    /// Stream the archive into the staging directory, retrying whole attempts
    async fn fetch_into(
        &self,
        request: &DownloadRequest,
        staging: &Staging,
    ) -> Result<(Hash, u64), Error> {
        let dest = staging.files_dir().join(request.archive_name());
        let (hash, size) = self
            .client
            .retry_policy()
            .run(&request.url, &self.client, || self.stream_to(&request.url, &dest))
            .await?;

        if let Some(expected) = &request.expected {
            if *expected != hash {
                return Err(NetworkError::ChecksumMismatch {
                    url: request.url.clone(),
                    expected: expected.to_hex(),
                    actual: hash.to_hex(),
                }
                .into());
            }
        }
        Ok((hash, size))
    }

    async fn stream_to(&self, url: &str, dest: &Path) -> Result<(Hash, u64), Error> {
        let response = self.client.send(url, None).await?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, dest))?;
        let mut hasher = blake3::Hasher::new();
        let mut size = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(&e, url))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::from_io_with_path(&e, dest))?;
            size += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, dest))?;

        Ok((Hash::from_bytes(*hasher.finalize().as_bytes()), size))
    }
}
