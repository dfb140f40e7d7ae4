//! Integration tests for index crate

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use kiln_errors::Error;
    use kiln_hash::Hash;
    use kiln_index::*;
    use kiln_types::{PackageId, PackageSpec, RecipeReference};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0).unwrap()
    }

    fn recipe(version: &str, revision: &str, hour: u32) -> RecipeEntry {
        RecipeEntry {
            version: version.to_string(),
            user: None,
            channel: None,
            revision: revision.to_string(),
            timestamp: at(hour),
            binaries: BTreeMap::new(),
        }
    }

    fn remote(name: &str, entries: &[(&str, RecipeEntry)]) -> Arc<dyn PackageBackend> {
        let mut index = Index::new();
        for (package, entry) in entries {
            index.add_recipe(*package, entry.clone());
        }
        index.validate().unwrap();
        Arc::new(IndexBackend::new(name, index))
    }

    /// Stands in for the local cache
    struct CacheStub(Vec<RecipeReference>);

    impl PackageBackend for CacheStub {
        fn source(&self) -> SourceId {
            SourceId::Cache
        }

        fn recipe_candidates(
            &self,
            name: &str,
            _user: Option<&str>,
            _channel: Option<&str>,
        ) -> Result<Vec<RecipeCandidate>, Error> {
            Ok(self
                .0
                .iter()
                .filter(|r| r.name == name)
                .map(|r| RecipeCandidate {
                    reference: r.clone(),
                    source: SourceId::Cache,
                })
                .collect())
        }

        fn binary(
            &self,
            _reference: &RecipeReference,
            _package_id: &PackageId,
        ) -> Result<Option<BinaryCandidate>, Error> {
            Ok(None)
        }
    }

    fn cached(refs: &[(&str, &str, u32)]) -> Arc<dyn PackageBackend> {
        Arc::new(CacheStub(
            refs.iter()
                .map(|(r, rev, hour)| {
                    RecipeReference::parse(r)
                        .unwrap()
                        .with_revision(*rev, Some(at(*hour)))
                })
                .collect(),
        ))
    }

    fn spec(text: &str) -> PackageSpec {
        PackageSpec::parse(text).unwrap()
    }

    #[test]
    fn test_range_tie_break_with_and_without_update() {
        let sources = Sources::new()
            .with_backend(cached(&[("c/1.5", "rc", 1)]))
            .with_backend(remote("first", &[("c", recipe("1.5", "r1", 2))]))
            .with_backend(remote("second", &[("c", recipe("1.6", "r2", 3))]));

        let plain = sources.select(&spec("c/[>=1.0]"), false, false).unwrap().unwrap();
        assert_eq!(plain.reference.version.as_str(), "1.5");
        assert_eq!(plain.source, SourceId::Cache);

        let updated = sources.select(&spec("c/[>=1.0]"), true, false).unwrap().unwrap();
        assert_eq!(updated.reference.version.as_str(), "1.6");
        assert_eq!(updated.source, SourceId::Remote("second".into()));
    }

    #[test]
    fn test_update_respects_the_range() {
        let sources = Sources::new()
            .with_backend(cached(&[("liba/1.2", "a", 1), ("liba/1.9", "b", 1)]))
            .with_backend(remote(
                "center",
                &[("liba", recipe("1.5", "c", 5)), ("liba", recipe("2.0", "d", 5))],
            ));

        for update in [false, true] {
            let selected = sources
                .select(&spec("liba/[>=1.0 <2.0]"), update, false)
                .unwrap()
                .unwrap();
            assert_eq!(selected.reference.version.as_str(), "1.9");
            assert!(selected.source.is_cache());
        }
    }

    #[test]
    fn test_equal_versions_prefer_newer_revision_then_order() {
        let sources = Sources::new()
            .with_backend(cached(&[("c/1.5", "old", 1)]))
            .with_backend(remote("first", &[("c", recipe("1.5", "new", 4))]))
            .with_backend(remote("second", &[("c", recipe("1.5", "newest", 4))]));

        let updated = sources.select(&spec("c/1.5"), true, false).unwrap().unwrap();
        assert_eq!(updated.reference.revision.as_deref(), Some("new"));
        assert_eq!(updated.source.remote(), Some("first"));

        // Same revision everywhere keeps the cache
        let sources = Sources::new()
            .with_backend(cached(&[("c/1.5", "same", 4)]))
            .with_backend(remote("first", &[("c", recipe("1.5", "same", 4))]));
        let updated = sources.select(&spec("c/1.5"), true, false).unwrap().unwrap();
        assert!(updated.source.is_cache());
    }

    #[test]
    fn test_first_remote_wins_without_update() {
        let sources = Sources::new()
            .with_backend(cached(&[]))
            .with_backend(remote("first", &[("c", recipe("1.0", "a", 1))]))
            .with_backend(remote("second", &[("c", recipe("1.1", "b", 1))]));

        let selected = sources.select(&spec("c/[*]"), false, false).unwrap().unwrap();
        assert_eq!(selected.source.remote(), Some("first"));
        assert!(sources.select(&spec("zlib/[*]"), true, false).unwrap().is_none());
    }

    #[test]
    fn test_revision_pin_skips_other_sources() {
        let sources = Sources::new()
            .with_backend(cached(&[("c/1.0", "a", 1)]))
            .with_backend(remote("center", &[("c", recipe("1.0", "b", 2))]));

        let selected = sources.select(&spec("c/1.0#b"), false, false).unwrap().unwrap();
        assert_eq!(selected.source.remote(), Some("center"));
    }

    #[test]
    fn test_binary_lookup_per_remote() {
        let digest = Hash::from_data(b"payload").to_hex();
        let binary = |hour, url: &str| BinaryEntry {
            package_revision: format!("p{hour}"),
            timestamp: at(hour),
            download_url: url.to_string(),
            blake3: digest.clone(),
            size: Some(7),
        };
        let mut first = recipe("1.0", "a", 1);
        first
            .binaries
            .insert("id1".into(), binary(2, "https://first.example.com/c.tgz"));
        let mut second = recipe("1.0", "a", 1);
        second
            .binaries
            .insert("id1".into(), binary(6, "https://second.example.com/c.tgz"));

        let sources = Sources::new()
            .with_backend(remote("first", &[("c", first)]))
            .with_backend(remote("second", &[("c", second)]));
        let reference = RecipeReference::parse("c/1.0#a").unwrap();
        let id = PackageId::new("id1");

        let plain = sources.find_binary(&reference, &id, false).unwrap().unwrap();
        assert_eq!(plain.source.remote(), Some("first"));
        let updated = sources.find_binary(&reference, &id, true).unwrap().unwrap();
        assert_eq!(updated.source.remote(), Some("second"));
        assert_eq!(updated.blake3, Some(Hash::from_data(b"payload")));

        let missing = PackageId::new("id2");
        assert!(sources.find_binary(&reference, &missing, true).unwrap().is_none());
    }

    #[test]
    fn test_index_json_roundtrip_through_backend() {
        let json = r#"{
            "version": 1,
            "timestamp": "2025-05-29T12:00:00Z",
            "packages": {
                "zlib": {
                    "recipes": [
                        {"version": "1.3", "revision": "r1", "timestamp": "2025-05-01T08:00:00Z"},
                        {"version": "1.3", "user": "acme", "channel": "stable", "revision": "r2", "timestamp": "2025-05-02T08:00:00Z"}
                    ]
                }
            }
        }"#;
        let index = Index::from_json(json).unwrap();
        index.validate().unwrap();
        let backend = IndexBackend::new("center", index);

        let plain = backend.recipe_candidates("zlib", None, None).unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].reference.to_string(), "zlib/1.3#r1");

        let scoped = backend
            .recipe_candidates("zlib", Some("acme"), Some("stable"))
            .unwrap();
        assert_eq!(scoped[0].reference.to_string(), "zlib/1.3@acme/stable#r2");
    }
}
