//! Integration tests for hash crate

#[cfg(test)]
mod tests {
    use kiln_hash::*;
    use tempfile::tempdir;
    use tokio::fs;

    #[tokio::test]
    async fn test_verify_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.txt");

        let data = b"verify this content";
        fs::write(&file_path, data).await.unwrap();

        let hash = Hash::from_data(data);
        assert!(verify_file(&file_path, &hash).await.unwrap());

        let wrong_hash = Hash::from_data(b"different content");
        assert!(!verify_file(&file_path, &wrong_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_tree_uses_relative_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("include/zlib"))
            .await
            .unwrap();
        fs::write(dir.path().join("recipe.toml"), b"recipe")
            .await
            .unwrap();
        fs::write(dir.path().join("include/zlib/zlib.h"), b"header")
            .await
            .unwrap();

        let hashes = hash_tree(dir.path()).await.unwrap();
        let keys: Vec<_> = hashes.keys().cloned().collect();
        assert_eq!(keys, vec!["include/zlib/zlib.h", "recipe.toml"]);
        assert_eq!(hashes["include/zlib/zlib.h"], Hash::from_data(b"header"));
    }

    #[test]
    fn test_hash_from_hex_errors() {
        // Too short
        let result = Hash::from_hex("1234");
        assert!(result.is_err());

        // Too long
        let result = Hash::from_hex(&"a".repeat(65));
        assert!(result.is_err());

        // Invalid hex
        let result = Hash::from_hex("xyz123");
        assert!(result.is_err());
    }
}
