//! Integration tests for store crate

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kiln_errors::{Error, StorageError};
    use kiln_index::{PackageBackend, SourceId};
    use kiln_store::*;
    use kiln_types::{PackageId, RecipeReference};
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::fs;

    async fn create_export(dir: &Path) {
        fs::create_dir_all(dir.join("include")).await.unwrap();
        fs::write(dir.join("recipe.toml"), b"name = \"zlib\"\n")
            .await
            .unwrap();
        fs::write(dir.join("include/zlib.h"), b"#define ZLIB 1\n")
            .await
            .unwrap();
    }

    fn zlib() -> RecipeReference {
        RecipeReference::parse("zlib/1.3#r1").unwrap()
    }

    #[tokio::test]
    async fn test_store_and_reopen_recipe() {
        let temp = tempdir().unwrap();
        let export = temp.path().join("export");
        create_export(&export).await;

        let cache = LocalCache::open(temp.path().join("cache")).await.unwrap();
        let files = cache.store_recipe(&zlib(), &export).await.unwrap();
        assert!(files.join("include/zlib.h").exists());
        assert!(cache.has_recipe(&zlib()));
        assert!(!cache.has_recipe(&RecipeReference::parse("zlib/1.3#r2").unwrap()));
        cache.verify_recipe(&zlib()).await.unwrap();

        // Nothing is left behind in the staging area
        let mut staging = fs::read_dir(temp.path().join("cache/tmp")).await.unwrap();
        assert!(staging.next_entry().await.unwrap().is_none());

        let reopened = LocalCache::open(temp.path().join("cache")).await.unwrap();
        let candidates = reopened.recipe_candidates("zlib", None, None).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, SourceId::Cache);
        assert!(candidates[0].reference.eq_with_revision(&zlib()));
        assert!(candidates[0].reference.timestamp.is_some());
        assert!(reopened
            .recipe_candidates("zlib", Some("acme"), None)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_package_lookup_through_backend() {
        let temp = tempdir().unwrap();
        let build = temp.path().join("build");
        fs::create_dir_all(build.join("lib")).await.unwrap();
        fs::write(build.join("lib/libz.a"), b"archive").await.unwrap();

        let cache = LocalCache::open(temp.path().join("cache")).await.unwrap();
        let id = PackageId::new("0123abcd");
        cache.store_package(&zlib(), &id, "p1", &build).await.unwrap();

        let binary = cache.binary(&zlib(), &id).unwrap().unwrap();
        assert_eq!(binary.package_revision, "p1");
        assert!(binary.download_url.is_none());
        assert!(cache.binary(&zlib().without_revision(), &id).unwrap().is_none());
        assert!(cache
            .binary(&zlib(), &PackageId::new("other"))
            .unwrap()
            .is_none());

        let path = cache.package_path(&zlib(), &id).unwrap();
        assert!(path.join("lib/libz.a").exists());
        cache.verify_package(&zlib(), &id).await.unwrap();

        cache.remove_package(&zlib(), &id).await.unwrap();
        assert!(cache.binary(&zlib(), &id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tampered_package_is_reported_corrupted() {
        let temp = tempdir().unwrap();
        let build = temp.path().join("build");
        fs::create_dir_all(&build).await.unwrap();
        fs::write(build.join("libz.a"), b"archive").await.unwrap();

        let cache = LocalCache::open(temp.path().join("cache")).await.unwrap();
        let id = PackageId::new("0123abcd");
        let path = cache.store_package(&zlib(), &id, "p1", &build).await.unwrap();
        fs::write(path.join("libz.a"), b"tampered").await.unwrap();

        let err = cache.verify_package(&zlib(), &id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::PackageCorrupted { .. })
        ));
        assert!(matches!(
            cache.package_path(&zlib(), &id),
            Err(Error::Storage(StorageError::PackageCorrupted { .. }))
        ));

        // Re-fetching the same entry clears the corruption
        let staging = cache.staging().await.unwrap();
        fs::write(staging.files_dir().join("libz.a"), b"archive")
            .await
            .unwrap();
        cache
            .commit_package(staging, &zlib(), &id, "p1", Utc::now())
            .await
            .unwrap();
        cache.verify_package(&zlib(), &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_entry_without_manifest_is_corrupted_recipe() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("cache");
        let partial = root.join("recipes/zlib/1.3/_/_/r1/files");
        fs::create_dir_all(&partial).await.unwrap();

        let cache = LocalCache::open(&root).await.unwrap();
        assert!(!cache.has_recipe(&zlib()));
        assert!(matches!(
            cache.recipe_path(&zlib()),
            Err(Error::Storage(StorageError::RecipeCorrupted { .. }))
        ));

        cache.remove_recipe(&zlib()).await.unwrap();
        assert!(matches!(
            cache.recipe_path(&zlib()),
            Err(Error::Storage(StorageError::PathNotFound { .. }))
        ));
        assert!(!root.join("recipes/zlib").exists());
    }

    #[tokio::test]
    async fn test_interrupted_staging_is_discarded() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("cache");
        {
            let cache = LocalCache::open(&root).await.unwrap();
            let staging = cache.staging().await.unwrap();
            fs::write(staging.files_dir().join("half"), b"x").await.unwrap();
        }
        let cache = LocalCache::open(&root).await.unwrap();
        assert!(!root.join("tmp").exists());
        assert!(cache.recipe_candidates("zlib", None, None).unwrap().is_empty());
    }
}
