//! Integration tests for resolver crate

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use kiln_config::{Config, Profile, ProfileStack};
    use kiln_errors::{ConfigError, Error, GraphError, LockfileError, PackageIdError};
    use kiln_events::{AppEvent, GeneralEvent, ResolverEvent};
    use kiln_index::{BinaryCandidate, PackageBackend, RecipeCandidate, SourceId, Sources};
    use kiln_package_id::EMPTY_PACKAGE_ID;
    use kiln_resolver::*;
    use kiln_types::{Context, PackageId, PackageSpec, RecipeReference, SettingsSchema};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Source serving fixed recipe revisions and, for some names, a binary
    /// for any package id
    struct Backend {
        source: SourceId,
        recipes: Vec<RecipeReference>,
        binaries: Vec<String>,
    }

    impl PackageBackend for Backend {
        fn source(&self) -> SourceId {
            self.source.clone()
        }

        fn recipe_candidates(
            &self,
            name: &str,
            _user: Option<&str>,
            _channel: Option<&str>,
        ) -> Result<Vec<RecipeCandidate>, Error> {
            Ok(self
                .recipes
                .iter()
                .filter(|r| r.name == name)
                .map(|r| RecipeCandidate {
                    reference: r.clone(),
                    source: self.source.clone(),
                })
                .collect())
        }

        fn binary(
            &self,
            reference: &RecipeReference,
            package_id: &PackageId,
        ) -> Result<Option<BinaryCandidate>, Error> {
            if !self.binaries.contains(&reference.name) {
                return Ok(None);
            }
            Ok(Some(BinaryCandidate {
                package_id: package_id.clone(),
                package_revision: "p1".to_string(),
                timestamp: Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap(),
                download_url: self
                    .source
                    .remote()
                    .map(|_| format!("https://example.com/{}.tgz", reference.name)),
                blake3: None,
                source: self.source.clone(),
            }))
        }
    }

    fn backend(source: SourceId, refs: &[&str], binaries: &[&str]) -> Arc<dyn PackageBackend> {
        Arc::new(Backend {
            source,
            recipes: refs
                .iter()
                .map(|r| {
                    RecipeReference::parse(&format!("{r}#rev-{}", r.replace('/', "-"))).unwrap()
                })
                .collect(),
            binaries: binaries.iter().map(ToString::to_string).collect(),
        })
    }

    fn cache(refs: &[&str], binaries: &[&str]) -> Arc<dyn PackageBackend> {
        backend(SourceId::Cache, refs, binaries)
    }

    fn remote(name: &str, refs: &[&str], binaries: &[&str]) -> Arc<dyn PackageBackend> {
        backend(SourceId::Remote(name.to_string()), refs, binaries)
    }

    fn req(text: &str) -> Requirement {
        Requirement::parse(text).unwrap()
    }

    fn reference(text: &str) -> RecipeReference {
        RecipeReference::parse(text).unwrap()
    }

    fn profile(toml: &str) -> ProfileStack {
        ProfileStack::new(Profile::from_toml(toml).unwrap())
    }

    fn linux() -> ProfileStack {
        profile(
            r#"
[settings]
os = "Linux"
arch = "x86_64"
build_type = "Release"
"#,
        )
    }

    fn loader(recipes: Vec<(&str, RecipeDef)>) -> Arc<dyn RecipeLoader> {
        let mut loader = MemoryLoader::new();
        for (text, recipe) in recipes {
            loader.insert(reference(text), Arc::new(recipe));
        }
        Arc::new(loader)
    }

    fn only(resolved: &ResolvedGraph, name: &str) -> NodeId {
        let nodes: Vec<_> = resolved.find(name).map(Node::id).collect();
        assert_eq!(nodes.len(), 1, "expected exactly one {name} node");
        nodes[0]
    }

    fn diamond(c_from_a: &str, c_from_b: &str) -> (Sources, Arc<dyn RecipeLoader>) {
        let sources = Sources::new().with_backend(cache(
            &["a/1.0", "b/1.0", "c/1.0", "c/2.0"],
            &[],
        ));
        let loader = loader(vec![
            ("a/1.0", RecipeDef::new("a").requires(req(c_from_a))),
            ("b/1.0", RecipeDef::new("b").requires(req(c_from_b))),
            ("c/1.0", RecipeDef::new("c")),
            ("c/2.0", RecipeDef::new("c")),
        ]);
        (sources, loader)
    }

    #[test]
    fn test_conflict_names_both_paths() {
        let (sources, loader) = diamond("c/1.0", "c/2.0");
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux())
            .require(req("a/1.0"))
            .require(req("b/1.0"));

        let err = resolver.resolve(&request).unwrap_err();
        match err {
            Error::Graph(GraphError::Conflict {
                name,
                existing,
                existing_path,
                requested,
                requested_path,
            }) => {
                assert_eq!(name, "c");
                assert_eq!(existing, "c/1.0");
                assert_eq!(existing_path, ["consumer", "a/1.0"]);
                assert_eq!(requested, "c/2.0");
                assert_eq!(requested_path, ["consumer", "b/1.0"]);
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_override_resolves_conflict_and_is_reported() {
        let (sources, loader) = diamond("c/1.0", "c/2.0");
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux())
            .require(req("a/1.0"))
            .require(req("b/1.0"))
            .require(Requirement::overriding(PackageSpec::parse("c/2.0").unwrap()));

        let resolved = resolver.resolve(&request).unwrap();
        let c = only(&resolved, "c");
        assert_eq!(resolved.node(c).label(), "c/2.0");

        let replacements: Vec<_> = resolved
            .overrides()
            .get("c/1.0")
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(replacements, ["c/2.0"]);
        assert_eq!(resolved.overrides().len(), 1);
        // the override declaration itself is not an edge
        assert_eq!(resolved.graph().root().edges().len(), 2);
    }

    #[test]
    fn test_forced_requirement_wins() {
        let (sources, loader) = diamond("c/1.0", "c/1.0");
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux())
            .require(req("c/2.0").forced())
            .require(req("a/1.0"))
            .require(req("b/1.0"));

        let resolved = resolver.resolve(&request).unwrap();
        let c = only(&resolved, "c");
        assert_eq!(resolved.node(c).label(), "c/2.0");
        assert_eq!(resolved.graph().dependants(c).len(), 3);
        assert!(resolved.overrides().get("c/1.0").is_some());
    }

    #[test]
    fn test_private_requirement_does_not_conflict() {
        let sources = Sources::new().with_backend(cache(
            &["a/1.0", "b/1.0", "c/1.0", "c/2.0"],
            &[],
        ));
        let loader = loader(vec![
            ("a/1.0", RecipeDef::new("a").requires(req("c/1.0"))),
            ("b/1.0", RecipeDef::new("b").requires(req("c/2.0").private())),
            ("c/1.0", RecipeDef::new("c")),
            ("c/2.0", RecipeDef::new("c")),
        ]);
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux())
            .require(req("a/1.0"))
            .require(req("b/1.0"));

        let resolved = resolver.resolve(&request).unwrap();
        let mut versions: Vec<_> = resolved.find("c").map(Node::label).collect();
        versions.sort();
        assert_eq!(versions, ["c/1.0", "c/2.0"]);
    }

    #[test]
    fn test_range_tie_break_with_update() {
        let sources = Sources::new()
            .with_backend(cache(&["c/1.5"], &[]))
            .with_backend(remote("r1", &["c/1.5"], &[]))
            .with_backend(remote("r2", &["c/1.6"], &[]));
        let loader = loader(vec![
            ("c/1.5", RecipeDef::new("c")),
            ("c/1.6", RecipeDef::new("c")),
        ]);
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux()).require(req("c/[>=1.0]"));

        let resolved = resolver.resolve(&request).unwrap();
        let c = resolved.node(only(&resolved, "c"));
        assert_eq!(c.label(), "c/1.5");
        assert_eq!(c.origin(), "cache");

        let resolved = resolver.resolve(&request.clone().with_update(true)).unwrap();
        let c = resolved.node(only(&resolved, "c"));
        assert_eq!(c.label(), "c/1.6");
        assert_eq!(c.origin(), "remote:r2");
    }

    #[test]
    fn test_end_to_end_range_ignores_out_of_range_update() {
        let sources = Sources::new()
            .with_backend(cache(&["liba/1.2", "liba/1.9"], &[]))
            .with_backend(remote("central", &["liba/1.5", "liba/2.0"], &[]));
        let loader = loader(
            ["liba/1.2", "liba/1.5", "liba/1.9", "liba/2.0"]
                .into_iter()
                .map(|r| (r, RecipeDef::new("liba")))
                .collect(),
        );
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux()).require(req("liba/[>=1.0,<2.0]"));

        for update in [false, true] {
            let resolved = resolver.resolve(&request.clone().with_update(update)).unwrap();
            let liba = resolved.node(only(&resolved, "liba"));
            assert_eq!(liba.label(), "liba/1.9", "update = {update}");
            assert_eq!(liba.origin(), "cache");
        }
    }

    #[test]
    fn test_not_found_and_loops() {
        let sources = Sources::new().with_backend(cache(&["a/1.0", "b/1.0"], &[]));
        let loader = loader(vec![
            ("a/1.0", RecipeDef::new("a").requires(req("b/1.0"))),
            ("b/1.0", RecipeDef::new("b").requires(req("a/1.0"))),
        ]);
        let resolver = Resolver::new(sources, loader);

        let request = ResolveRequest::new(linux()).require(req("zstd/[>=1.5]"));
        let err = resolver.resolve(&request).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::PackageNotFound { ref requirement, ref chain })
                if requirement == "zstd/[>=1.5]" && chain == &["consumer"]
        ));

        let request = ResolveRequest::new(linux()).require(req("a/1.0"));
        let err = resolver.resolve(&request).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::Loop { .. })));
    }

    fn chain_sources() -> (Sources, Arc<dyn RecipeLoader>) {
        // app -> (fmt, zlib), fmt -> zlib, app tool-requires cmake
        let sources = Sources::new()
            .with_backend(cache(
                &["app/1.0", "fmt/10.1", "zlib/1.3", "cmake/3.27"],
                &["zlib"],
            ))
            .with_backend(remote("central", &[], &["fmt", "app"]));
        let loader = loader(vec![
            (
                "app/1.0",
                RecipeDef::new("app")
                    .setting("os")
                    .setting("build_type")
                    .requires(req("fmt/10.1"))
                    .requires(req("zlib/[>=1.2 <2]"))
                    .tool_requires(req("cmake/3.27")),
            ),
            (
                "fmt/10.1",
                RecipeDef::new("fmt")
                    .setting("os")
                    .option("shared", ["True", "False"], "False")
                    .requires(req("zlib/1.3")),
            ),
            (
                "zlib/1.3",
                RecipeDef::new("zlib")
                    .setting("os")
                    .setting("arch")
                    .ignore_setting("arch"),
            ),
            ("cmake/3.27", RecipeDef::new("cmake").setting("os")),
        ]);
        (sources, loader)
    }

    #[test]
    fn test_build_order_places_dependencies_first() {
        let (sources, loader) = chain_sources();
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux()).require(req("app/1.0"));
        let resolved = resolver.resolve(&request).unwrap();

        let order = resolved.build_order();
        assert_eq!(order.iter().count(), resolved.graph().len());
        for node in resolved.nodes() {
            let level = order.level_of(node.id()).unwrap();
            let placements = order.levels().iter().filter(|l| l.contains(&node.id())).count();
            assert_eq!(placements, 1);
            for edge in node.edges() {
                assert!(order.level_of(edge.target).unwrap() < level);
            }
        }

        let app = only(&resolved, "app");
        let cmake = only(&resolved, "cmake");
        assert_eq!(resolved.node(cmake).context(), Context::Build);
        assert_eq!(resolved.node(app).context(), Context::Host);
        assert!(resolved.node(app).is_consumer());
        assert!(!resolved.node(cmake).is_consumer());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let (sources, loader) = chain_sources();
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux()).require(req("app/1.0"));

        let snapshot = |resolved: &ResolvedGraph| {
            let ids: Vec<_> = resolved
                .nodes()
                .map(|n| (n.label(), n.package_id().cloned()))
                .collect();
            let order: Vec<Vec<String>> = resolved
                .build_order()
                .levels()
                .iter()
                .map(|level| level.iter().map(|id| resolved.node(*id).label()).collect())
                .collect();
            (ids, order)
        };

        let first = resolver.resolve(&request).unwrap();
        let second = resolver.resolve(&request).unwrap();
        assert_eq!(snapshot(&first), snapshot(&second));
        assert!(first.nodes().all(|n| n.package_id().is_some()));
    }

    #[test]
    fn test_package_ids_follow_settings() {
        let (sources, loader) = chain_sources();
        let resolver = Resolver::new(sources, loader);
        let resolve = |profile: ProfileStack| {
            let resolved = resolver
                .resolve(&ResolveRequest::new(profile).require(req("app/1.0")))
                .unwrap();
            let id = |name: &str| resolved.package_id(only(&resolved, name)).cloned().unwrap();
            (id("zlib"), id("fmt"), id("app"))
        };

        let base = resolve(linux());
        let arm = resolve(profile(
            r#"
[settings]
os = "Linux"
arch = "armv8"
build_type = "Release"
"#,
        ));
        // zlib drops arch, and nothing else declares it
        assert_eq!(base, arm);

        let windows = resolve(profile(
            r#"
[settings]
os = "Windows"
arch = "x86_64"
build_type = "Release"
"#,
        ));
        assert_ne!(base.0, windows.0);
        assert_ne!(base.1, windows.1);
        assert_ne!(base.2, windows.2);

        let debug_fmt = resolve(profile(
            r#"
[settings]
os = "Linux"
arch = "x86_64"
build_type = "Release"

[[package_settings]]
pattern = "app"
settings = { build_type = "Debug" }
"#,
        ));
        assert_eq!(base.0, debug_fmt.0);
        assert_eq!(base.1, debug_fmt.1);
        assert_ne!(base.2, debug_fmt.2);
    }

    #[test]
    fn test_options_and_invalid_values() {
        let (sources, loader) = chain_sources();
        let resolver = Resolver::new(sources, loader);

        let shared = profile(r#"options = ["fmt/*:shared=True", "zlib/*:unknown=1"]"#);
        let resolved = resolver
            .resolve(&ResolveRequest::new(shared).require(req("app/1.0")))
            .unwrap();
        let fmt = resolved.node(only(&resolved, "fmt"));
        assert_eq!(fmt.config().options().get("shared"), Some("True"));
        let report = resolved.report(BuildScope::All);
        let item = report
            .iter()
            .flatten()
            .find(|item| item.reference.name == "fmt")
            .unwrap();
        assert_eq!(item.options_needed_to_rebuild, ["fmt/*:shared=True"]);

        let invalid = profile(r#"options = ["fmt/*:shared=Maybe"]"#);
        let err = resolver
            .resolve(&ResolveRequest::new(invalid).require(req("app/1.0")))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidOption { ref option, ref value, .. })
                if option == "shared" && value == "Maybe"
        ));
    }

    #[test]
    fn test_build_profile_schema_and_cpp_info() {
        let sources = Sources::new().with_backend(cache(&["app/1.0", "cmake/3.27"], &[]));
        let loader = loader(vec![
            (
                "app/1.0",
                RecipeDef::new("app")
                    .setting("os")
                    .tool_requires(req("cmake/3.27"))
                    .with_cpp_info(CppInfo {
                        include_dirs: vec!["include".to_string()],
                        libs: vec!["app".to_string()],
                        ..CppInfo::default()
                    }),
            ),
            ("cmake/3.27", RecipeDef::new("cmake").setting("os")),
        ]);
        let resolver = Resolver::new(sources, loader);
        let macos = profile(
            r#"
[settings]
os = "Macos"
"#,
        );
        let request = ResolveRequest::new(linux())
            .with_profile_build(macos)
            .require(req("app/1.0"));

        let resolved = resolver.resolve(&request).unwrap();
        let os = |name: &str| {
            let node = resolved.node(only(&resolved, name));
            node.config().settings().get("os").map(ToString::to_string)
        };
        assert_eq!(os("app").as_deref(), Some("Linux"));
        assert_eq!(os("cmake").as_deref(), Some("Macos"));

        let info = resolved.cpp_info(only(&resolved, "app"));
        assert_eq!(info.libs, ["app"]);
        assert_eq!(info.include_dirs, ["include"]);
        assert_eq!(resolved.cpp_info(only(&resolved, "cmake")), CppInfo::default());

        let schema = SettingsSchema::new()
            .with("os", ["Linux", "Macos"])
            .with("arch", ["x86_64"])
            .with("build_type", ["Debug", "Release"]);
        assert!(resolver
            .resolve(&request.clone().with_settings_schema(schema))
            .is_ok());

        let linux_only = SettingsSchema::new()
            .with("os", ["Linux"])
            .with("arch", ["x86_64"])
            .with("build_type", ["Release"]);
        let err = resolver
            .resolve(&request.with_settings_schema(linux_only))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidSetting { ref key, ref value, .. })
                if key == "os" && value == "Macos"
        ));
    }

    #[test]
    fn test_undeclared_options_are_reported_per_node() {
        let (sources, loader) = chain_sources();
        let (tx, mut rx) = kiln_events::channel();
        let resolver = Resolver::new(sources, loader).with_event_sender(tx);
        let unknown = profile(r#"options = ["zlib/*:unknown=1"]"#);
        resolver
            .resolve(&ResolveRequest::new(unknown).require(req("app/1.0")))
            .unwrap();

        let mut scopes = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::General(GeneralEvent::DebugLog { message: text }) = &message.event {
                assert!(text.contains("'unknown'"));
                scopes.push(message.meta.correlation_id.clone());
            }
        }
        assert_eq!(scopes, [Some("zlib/1.3".to_string())]);
    }

    #[test]
    fn test_binary_statuses_and_skip() {
        let (sources, loader) = chain_sources();
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux()).require(req("app/1.0"));

        let resolved = resolver.resolve(&request).unwrap();
        let status = |name: &str| resolved.binary(only(&resolved, name));
        assert_eq!(status("zlib"), BinaryStatus::Cache);
        assert_eq!(status("fmt"), BinaryStatus::Download);
        assert_eq!(status("app"), BinaryStatus::Download);
        // app is not built, so its build tool is not needed
        assert_eq!(status("cmake"), BinaryStatus::Skip);
        assert_eq!(
            resolved.node(only(&resolved, "fmt")).binary_remote(),
            Some("central")
        );
        resolved.check_binaries().unwrap();
        assert!(resolved.report(BuildScope::OnlyMissing).is_empty());

        let forced = request
            .clone()
            .with_build_policy(BuildPolicy::parse(&["app"]).unwrap());
        let resolved = resolver.resolve(&forced).unwrap();
        assert_eq!(resolved.binary(only(&resolved, "app")), BinaryStatus::Build);
        assert_eq!(resolved.binary(only(&resolved, "cmake")), BinaryStatus::Missing);
        let err = resolved.check_binaries().unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingBinaries { ref packages }
                if packages.len() == 1 && packages[0].starts_with("cmake/3.27#")
        ));

        let building = request
            .clone()
            .with_build_policy(BuildPolicy::parse(&["app", "missing"]).unwrap());
        let resolved = resolver.resolve(&building).unwrap();
        resolved.check_binaries().unwrap();
        let report = resolved.report(BuildScope::OnlyMissing);
        let names: Vec<Vec<&str>> = report
            .iter()
            .map(|level| level.iter().map(|i| i.reference.name.as_str()).collect())
            .collect();
        assert_eq!(names, [vec!["cmake"], vec!["app"]]);

        let stats = ExecutionStats::from_plan(&resolved.execution_plan());
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.to_build, 2);
    }

    #[test]
    fn test_tool_requires_live_in_build_context() {
        let sources = Sources::new().with_backend(cache(
            &["app/1.0", "zlib/1.2", "zlib/1.3", "protobuf/3.21"],
            &[],
        ));
        let loader = loader(vec![
            ("app/1.0", RecipeDef::new("app").requires(req("zlib/1.3"))),
            ("zlib/1.2", RecipeDef::new("zlib")),
            ("zlib/1.3", RecipeDef::new("zlib")),
            ("protobuf/3.21", RecipeDef::new("protobuf").requires(req("zlib/1.2"))),
        ]);
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux())
            .require(req("app/1.0"))
            .tool_require(req("protobuf/3.21"));

        let resolved = resolver.resolve(&request).unwrap();
        let zlibs: HashMap<Context, String> = resolved
            .find("zlib")
            .map(|n| (n.context(), n.label()))
            .collect();
        assert_eq!(zlibs[&Context::Host], "zlib/1.3");
        assert_eq!(zlibs[&Context::Build], "zlib/1.2");
    }

    #[test]
    fn test_cross_context_conflicts_when_enabled() {
        let sources = Sources::new().with_backend(cache(&["zlib/1.2", "zlib/1.3"], &[]));
        let loader = loader(vec![
            ("zlib/1.2", RecipeDef::new("zlib")),
            ("zlib/1.3", RecipeDef::new("zlib")),
        ]);
        let request = ResolveRequest::new(linux())
            .require(req("zlib/1.3"))
            .tool_require(req("zlib/1.2"));

        let resolver = Resolver::new(sources, loader);
        assert!(resolver.resolve(&request).is_ok());

        let mut config = Config::default();
        config.resolver.cross_context_conflicts = true;
        let resolver = resolver.with_config(&config);
        let err = resolver.resolve(&request).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::Conflict { .. })));
    }

    #[test]
    fn test_lockfile_pins_resolution() {
        let sources = Sources::new()
            .with_backend(cache(&["c/1.5"], &[]))
            .with_backend(remote("r2", &["c/1.6"], &[]));
        let loader = loader(vec![
            ("c/1.5", RecipeDef::new("c")),
            ("c/1.6", RecipeDef::new("c")),
        ]);
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux()).require(req("c/[>=1.0]"));

        let lockfile = resolver.resolve(&request).unwrap().lockfile();
        assert_eq!(lockfile.len(), 1);
        assert_eq!(lockfile.entries()[0].reference.to_string(), "c/1.5#rev-c-1.5");
        assert!(lockfile.entries()[0].direct);

        let locked = request.clone().with_update(true).with_lockfile(lockfile.clone());
        let resolved = resolver.resolve(&locked).unwrap();
        let c = resolved.node(only(&resolved, "c"));
        assert_eq!(c.label(), "c/1.5");
        assert_eq!(c.origin(), "lockfile");

        let narrowed = ResolveRequest::new(linux())
            .require(req("c/[>=1.6]"))
            .with_lockfile(lockfile.clone());
        assert!(matches!(
            resolver.resolve(&narrowed).unwrap_err(),
            Error::Lockfile(LockfileError::Mismatch { .. })
        ));

        let strict = ResolveRequest::new(linux())
            .require(req("c/[>=1.0]"))
            .require(req("d/1.0"))
            .with_lockfile(lockfile.strict());
        assert!(matches!(
            resolver.resolve(&strict).unwrap_err(),
            Error::Lockfile(LockfileError::Unlocked { .. })
        ));
    }

    #[test]
    fn test_lockfile_replays_private_duplicates() {
        let sources = Sources::new().with_backend(cache(&["a/1.0", "c/1.0", "c/2.0"], &[]));
        let loader = loader(vec![
            ("a/1.0", RecipeDef::new("a").requires(req("c/1.0").private())),
            ("c/1.0", RecipeDef::new("c")),
            ("c/2.0", RecipeDef::new("c")),
        ]);
        let resolver = Resolver::new(sources, loader);
        let request = ResolveRequest::new(linux())
            .require(req("a/1.0"))
            .require(req("c/[>=1.0]"));

        let labels = |resolved: &ResolvedGraph| {
            let mut labels: Vec<_> = resolved.find("c").map(Node::label).collect();
            labels.sort();
            labels
        };

        let first = resolver.resolve(&request).unwrap();
        assert_eq!(labels(&first), ["c/1.0", "c/2.0"]);
        let lockfile = first.lockfile();
        let locked: Vec<_> = lockfile
            .entries_for("c", false)
            .map(|entry| entry.reference.to_string())
            .collect();
        assert_eq!(locked, ["c/2.0#rev-c-2.0", "c/1.0#rev-c-1.0"]);

        let replayed = resolver
            .resolve(&request.clone().with_lockfile(lockfile))
            .unwrap();
        assert_eq!(labels(&replayed), ["c/1.0", "c/2.0"]);
        let direct = replayed
            .graph()
            .root()
            .edges()
            .iter()
            .map(|edge| replayed.node(edge.target).label())
            .find(|label| label.starts_with("c/"));
        assert_eq!(direct.as_deref(), Some("c/2.0"));
    }

    #[derive(Debug)]
    struct LinuxOnly;

    impl Recipe for LinuxOnly {
        fn name(&self) -> &str {
            "epoll"
        }

        fn settings(&self) -> Vec<String> {
            vec!["os".to_string()]
        }

        fn validate(&self, ctx: &RecipeContext<'_>) -> Result<(), String> {
            let settings = ctx.settings().map_err(|e| e.to_string())?;
            match settings.get("os") {
                Some("Linux") => Ok(()),
                other => Err(format!("epoll needs Linux, not {other:?}")),
            }
        }
    }

    #[derive(Debug)]
    struct Peeking;

    impl Recipe for Peeking {
        fn name(&self) -> &str {
            "peek"
        }

        fn package_id(
            &self,
            _info: &mut kiln_package_id::PackageIdInfo,
            ctx: &RecipeContext<'_>,
        ) -> Result<(), Error> {
            ctx.settings()?;
            Ok(())
        }
    }

    #[test]
    fn test_recipe_hooks_validate_and_guard() {
        let sources = Sources::new().with_backend(cache(&["epoll/1.0", "peek/1.0"], &["epoll"]));
        let mut memory = MemoryLoader::new();
        memory.insert(reference("epoll/1.0"), Arc::new(LinuxOnly));
        memory.insert(reference("peek/1.0"), Arc::new(Peeking));
        let resolver = Resolver::new(sources, Arc::new(memory));

        let linux_request = ResolveRequest::new(linux()).require(req("epoll/1.0"));
        let resolved = resolver.resolve(&linux_request).unwrap();
        assert_eq!(resolved.binary(only(&resolved, "epoll")), BinaryStatus::Cache);

        let windows = profile(
            r#"
[settings]
os = "Windows"
"#,
        );
        let resolved = resolver
            .resolve(&ResolveRequest::new(windows).require(req("epoll/1.0")))
            .unwrap();
        assert_eq!(resolved.binary(only(&resolved, "epoll")), BinaryStatus::Invalid);
        assert!(matches!(
            resolved.check_binaries(),
            Err(GraphError::InvalidConfiguration { .. })
        ));

        let err = resolver
            .resolve(&ResolveRequest::new(linux()).require(req("peek/1.0")))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PackageId(PackageIdError::ForbiddenAccess { ref field, .. })
                if field == "settings"
        ));
    }

    #[test]
    fn test_header_only_and_test_requires() {
        let sources =
            Sources::new().with_backend(cache(&["json/3.11", "gtest/1.14", "app/1.0"], &[]));
        let loader = loader(vec![
            (
                "app/1.0",
                RecipeDef::new("app")
                    .setting("os")
                    .requires(req("json/3.11"))
                    .test_requires(req("gtest/1.14")),
            ),
            ("json/3.11", RecipeDef::new("json").setting("os").header_only()),
            ("gtest/1.14", RecipeDef::new("gtest").setting("os")),
        ]);
        let resolver = Resolver::new(sources, loader);
        let resolved = resolver
            .resolve(&ResolveRequest::new(linux()).require(req("app/1.0")))
            .unwrap();

        let json = only(&resolved, "json");
        assert_eq!(resolved.package_id(json).unwrap().to_string(), EMPTY_PACKAGE_ID);

        let gtest = only(&resolved, "gtest");
        assert!(resolved.node(gtest).is_test());
        let app = resolved.node(only(&resolved, "app"));
        let info = app.info().unwrap();
        assert!(info.requires.get("json").is_some());
        assert!(info.requires.get("gtest").is_none());
    }

    #[test]
    fn test_events_report_progress() {
        let (sources, loader) = chain_sources();
        let (tx, mut rx) = kiln_events::channel();
        let resolver = Resolver::new(sources, loader).with_event_sender(tx);
        resolver
            .resolve(&ResolveRequest::new(linux()).require(req("app/1.0")))
            .unwrap();

        let mut started = false;
        let mut completed = None;
        let mut computed = 0;
        while let Ok(message) = rx.try_recv() {
            match message.event {
                AppEvent::Resolver(ResolverEvent::ResolutionStarted { requires, .. }) => {
                    started = requires == 1;
                }
                AppEvent::Resolver(ResolverEvent::PackageIdComputed { .. }) => computed += 1,
                AppEvent::Resolver(ResolverEvent::ResolutionCompleted { nodes, .. }) => {
                    completed = Some(nodes);
                }
                _ => {}
            }
        }
        assert!(started);
        assert_eq!(completed, Some(4));
        assert_eq!(computed, 4);
    }

    #[tokio::test]
    async fn test_lockfile_round_trip_on_disk() {
        let (sources, loader) = chain_sources();
        let resolver = Resolver::new(sources, loader);
        let resolved = resolver
            .resolve(&ResolveRequest::new(linux()).require(req("app/1.0")))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.lock");
        let lockfile = resolved.lockfile();
        lockfile.save(&path).await.unwrap();
        let loaded = Lockfile::load(&path).await.unwrap();
        assert_eq!(loaded, lockfile);
        assert!(loaded.entries().iter().any(|e| e.reference.name == "cmake" && e.build));
    }
}
