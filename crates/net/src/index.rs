//! Fetching remote index snapshots

use kiln_config::RemoteConfig;
use kiln_errors::{Error, NetworkError};
use kiln_index::{Index, IndexBackend, IndexCache};
use tracing::{debug, info, warn};

use crate::client::{Fetched, NetClient};

/// Fetch the index of one remote, reusing the cached snapshot on `304`
///
/// A fresh snapshot is validated, then written to `cache` together with its
/// `ETag`. When the cached snapshot turns out to be unreadable after a `304`,
/// the snapshot and its `ETag` are dropped and the index is fetched again
/// unconditionally.
///
/// # Errors
///
/// Returns a network error when the remote cannot be reached, or
/// `NetworkError::MalformedResponse` when the document is not a valid index.
pub async fn fetch_index(
    client: &NetClient,
    remote: &RemoteConfig,
    cache: &IndexCache,
) -> Result<Index, Error> {
    let url = remote.index_url();
    let etag = cache.load_etag(&remote.name).await;

    if let Some(etag) = etag.as_deref() {
        match client.get_text_if_modified(&url, Some(etag)).await? {
            Fetched::NotModified => match cache.load(&remote.name).await {
                Ok(index) => {
                    debug!(remote = %remote.name, "index not modified");
                    return Ok(index);
                }
                Err(e) => {
                    warn!(remote = %remote.name, error = %e, "cached index unreadable, refetching");
                    cache.clear(&remote.name).await;
                }
            },
            Fetched::Modified { body, etag } => {
                return store(remote, cache, &url, &body, etag.as_deref()).await;
            }
        }
    }

    match client.get_text_if_modified(&url, None).await? {
        Fetched::Modified { body, etag } => {
            store(remote, cache, &url, &body, etag.as_deref()).await
        }
        Fetched::NotModified => Err(NetworkError::MalformedResponse {
            url,
            message: "304 without a conditional request".to_string(),
        }
        .into()),
    }
}

async fn store(
    remote: &RemoteConfig,
    cache: &IndexCache,
    url: &str,
    body: &str,
    etag: Option<&str>,
) -> Result<Index, Error> {
    let index = Index::from_json(body)
        .and_then(|index| index.validate().map(|()| index))
        .map_err(|e| NetworkError::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    cache.save(&remote.name, &index).await?;
    if let Some(etag) = etag {
        cache.save_etag(&remote.name, etag).await?;
    }
    info!(
        remote = %remote.name,
        recipes = index.recipe_count(),
        packages = index.package_count(),
        "index updated"
    );
    Ok(index)
}

/// Fetch every enabled remote, in configuration order, as package backends
///
/// # Errors
///
/// Returns the first remote that cannot be fetched.
pub async fn fetch_backends(
    client: &NetClient,
    remotes: &[RemoteConfig],
    cache: &IndexCache,
) -> Result<Vec<IndexBackend>, Error> {
    let mut backends = Vec::new();
    for remote in remotes.iter().filter(|remote| remote.enabled) {
        let index = fetch_index(client, remote, cache).await?;
        backends.push(IndexBackend::new(remote.name.clone(), index));
    }
    Ok(backends)
}
