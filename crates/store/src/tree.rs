//! Directory walking helpers

use kiln_errors::{Error, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Recursively copy `src` into `dest`
pub(crate) async fn copy_tree(src: &Path, dest: &Path) -> Result<(), Error> {
    let mut pending = vec![(src.to_path_buf(), dest.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &to))?;
        let mut entries = fs::read_dir(&from)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &from))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else if file_type.is_file() {
                fs::copy(entry.path(), &target)
                    .await
                    .map_err(|e| StorageError::from_io_with_path(&e, &target))?;
            }
        }
    }

    Ok(())
}

/// Directories exactly `depth` levels below `root`, with their path segments
///
/// A missing `root` yields nothing.
pub(crate) async fn entry_dirs(
    root: &Path,
    depth: usize,
) -> Result<Vec<(PathBuf, Vec<String>)>, Error> {
    let mut found = Vec::new();
    if fs::metadata(root).await.is_err() {
        return Ok(found);
    }

    let mut pending = vec![(root.to_path_buf(), Vec::new())];
    while let Some((dir, segments)) = pending.pop() {
        if segments.len() == depth {
            found.push((dir, segments));
            continue;
        }
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let mut next = segments.clone();
            next.push(entry.file_name().to_string_lossy().into_owned());
            pending.push((entry.path(), next));
        }
    }

    found.sort();
    Ok(found)
}

/// Remove empty directories below `dir`, returning whether `dir` is empty
pub(crate) async fn prune_empty(dir: &Path) -> Result<bool, Error> {
    let mut is_empty = true;
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if entry.file_type().await?.is_dir() {
            if Box::pin(prune_empty(&path)).await? {
                let _ = fs::remove_dir(&path).await;
            } else {
                is_empty = false;
            }
        } else {
            is_empty = false;
        }
    }

    Ok(is_empty)
}
