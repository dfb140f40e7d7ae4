//! Integration tests for package id computation

#[cfg(test)]
mod tests {
    use kiln_errors::{Error, PackageIdError};
    use kiln_package_id::*;
    use kiln_types::{Conf, OptionValues, PackageId, PackageIdMode, RecipeReference, Settings};
    use proptest::prelude::*;

    fn reference(text: &str) -> RecipeReference {
        RecipeReference::parse(text).unwrap()
    }

    fn dependency(kind: DependencyKind, text: &str, package_id: &str) -> Dependency {
        Dependency {
            kind,
            reference: reference(text),
            package_id: PackageId::new(package_id),
            requirement_mode: None,
            declared_mode: None,
        }
    }

    fn compute(
        config: &ResolvedConfig,
        dependencies: Vec<Dependency>,
        conf: &Conf,
        header_only: bool,
    ) -> PackageId {
        let node = reference("app/1.0#r0");
        let input = PackageIdInput {
            reference: &node,
            config,
            dependencies,
            conf,
            header_only,
        };
        PackageIdEngine::default()
            .compute(&input, |_| Ok(()))
            .unwrap()
            .package_id
    }

    fn pairs() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[a-e]{1,3}", "[A-Z0-9]{1,4}"), 0..6)
    }

    proptest! {
        #[test]
        fn insertion_order_never_matters(settings in pairs(), options in pairs()) {
            let forward = ResolvedConfig::new(
                settings.iter().cloned().collect(),
                options.iter().cloned().collect(),
            );
            // later duplicates win on insert, so keep only the last of each key
            let dedup = |items: &[(String, String)]| {
                let mut seen = std::collections::BTreeMap::new();
                for (k, v) in items {
                    seen.insert(k.clone(), v.clone());
                }
                seen.into_iter().rev().collect::<Vec<_>>()
            };
            let reversed = ResolvedConfig::new(
                dedup(&settings).into_iter().collect(),
                dedup(&options).into_iter().collect(),
            );
            let conf = Conf::new();
            prop_assert_eq!(
                compute(&forward, Vec::new(), &conf, false),
                compute(&reversed, Vec::new(), &conf, false)
            );
        }

        #[test]
        fn changing_a_value_changes_the_id(
            key in "[a-e]{1,3}",
            a in "[A-Z]{1,4}",
            b in "[A-Z]{1,4}",
        ) {
            prop_assume!(a != b);
            let conf = Conf::new();
            let first =
                ResolvedConfig::new([(key.clone(), a)].into_iter().collect(), OptionValues::new());
            let second = ResolvedConfig::new([(key, b)].into_iter().collect(), OptionValues::new());
            prop_assert_ne!(
                compute(&first, Vec::new(), &conf, false),
                compute(&second, Vec::new(), &conf, false)
            );
        }

        #[test]
        fn header_only_ignores_everything(settings in pairs(), options in pairs()) {
            let config = ResolvedConfig::new(
                settings.into_iter().collect(),
                options.into_iter().collect(),
            );
            let deps = vec![dependency(DependencyKind::Requires, "zlib/1.3#r1", "z")];
            let id = compute(&config, deps, &Conf::new(), true);
            prop_assert_eq!(id.as_str(), EMPTY_PACKAGE_ID);
        }
    }

    #[test]
    fn test_same_inputs_same_id() {
        let config = ResolvedConfig::new(
            [("os", "Linux"), ("build_type", "Release")].into_iter().collect(),
            [("shared", "True")].into_iter().collect(),
        );
        let deps = || {
            vec![
                dependency(DependencyKind::Requires, "zlib/1.3#r1", "z1"),
                dependency(DependencyKind::BuildRequires, "cmake/3.27.1#r9", "c1"),
            ]
        };
        let conf = Conf::new();
        assert_eq!(
            compute(&config, deps(), &conf, false),
            compute(&config, deps(), &conf, false)
        );
    }

    #[test]
    fn test_undeclared_setting_has_no_effect() {
        // a node only ever sees its declared settings, so dropping a root
        // the recipe did not declare must leave the id alone
        let profile: Settings = [("os", "Linux"), ("compiler", "gcc"), ("compiler.version", "13")]
            .into_iter()
            .collect();
        let other: Settings = [("os", "Linux"), ("compiler", "clang"), ("compiler.version", "17")]
            .into_iter()
            .collect();
        let declared = ["os"];
        let conf = Conf::new();
        let a = ResolvedConfig::new(profile.declared(&declared[..]), OptionValues::new());
        let b = ResolvedConfig::new(other.declared(&declared[..]), OptionValues::new());
        assert_eq!(
            compute(&a, Vec::new(), &conf, false),
            compute(&b, Vec::new(), &conf, false)
        );
    }

    #[test]
    fn test_minor_mode_tracks_minor_only() {
        let config = ResolvedConfig::default();
        let conf = Conf::new();
        let with_tool = |text: &str| {
            let mut dep = dependency(DependencyKind::BuildRequires, text, "t");
            dep.requirement_mode = Some(PackageIdMode::Minor);
            compute(&config, vec![dep], &conf, false)
        };
        let base = with_tool("tool/1.0#a");
        assert_eq!(base, with_tool("tool/1.0.1#b"));
        assert_ne!(base, with_tool("tool/1.1#c"));
    }

    #[test]
    fn test_recipe_revision_mode_tracks_revision() {
        let config = ResolvedConfig::default();
        let conf = Conf::new();
        let with_zlib = |text: &str| {
            compute(
                &config,
                vec![dependency(DependencyKind::Requires, text, "z")],
                &conf,
                false,
            )
        };
        assert_ne!(with_zlib("zlib/1.3#r1"), with_zlib("zlib/1.3#r2"));
    }

    #[test]
    fn test_whitelisted_conf_only() {
        let config = ResolvedConfig::default();
        let mut conf = Conf::new();
        conf.set(
            kiln_types::PACKAGE_ID_CONFS,
            vec!["tools.build:cxxflags".to_string()],
        );
        let base = compute(&config, Vec::new(), &conf, false);

        let mut jobs = conf.clone();
        jobs.set("tools.build:jobs", 16_i64);
        assert_eq!(base, compute(&config, Vec::new(), &jobs, false));

        let mut flags = conf.clone();
        flags.set("tools.build:cxxflags", "-O3");
        assert_ne!(base, compute(&config, Vec::new(), &flags, false));
    }

    #[test]
    fn test_hook_can_drop_entries() {
        let node = reference("app/1.0#r0");
        let config = ResolvedConfig::new(
            [("os", "Linux"), ("compiler", "gcc")].into_iter().collect(),
            OptionValues::new(),
        );
        let conf = Conf::new();
        let input = PackageIdInput {
            reference: &node,
            config: &config,
            dependencies: vec![dependency(DependencyKind::Requires, "zlib/1.3#r1", "z")],
            conf: &conf,
            header_only: false,
        };
        let engine = PackageIdEngine::default();
        let computed = engine
            .compute(&input, |info| {
                info.settings.remove("compiler");
                info.requires.set_mode("zlib", PackageIdMode::Unrelated);
                Ok(())
            })
            .unwrap();

        let expected =
            ResolvedConfig::new([("os", "Linux")].into_iter().collect(), OptionValues::new());
        assert_eq!(
            computed.package_id,
            compute(&expected, Vec::new(), &conf, false)
        );
        // the resolved config itself is untouched
        assert_eq!(config.settings().get("compiler"), Some("gcc"));
    }

    #[test]
    fn test_failing_hook_names_the_node() {
        let node = reference("app/1.0#r0");
        let config = ResolvedConfig::default();
        let conf = Conf::new();
        let input = PackageIdInput {
            reference: &node,
            config: &config,
            dependencies: Vec::new(),
            conf: &conf,
            header_only: false,
        };
        let err = PackageIdEngine::default()
            .compute(&input, |_| Err(Error::internal("boom")))
            .unwrap_err();
        match err {
            PackageIdError::HookFailed { reference, .. } => {
                assert!(reference.starts_with("app/1.0"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_forbidden_access_passes_through() {
        let node = reference("app/1.0#r0");
        let config = ResolvedConfig::default();
        let conf = Conf::new();
        let input = PackageIdInput {
            reference: &node,
            config: &config,
            dependencies: Vec::new(),
            conf: &conf,
            header_only: false,
        };
        let err = PackageIdEngine::default()
            .compute(&input, |_| {
                Err(PackageIdError::ForbiddenAccess {
                    reference: "app/1.0".into(),
                    field: "settings".into(),
                }
                .into())
            })
            .unwrap_err();
        assert!(matches!(err, PackageIdError::ForbiddenAccess { .. }));
    }

    #[test]
    fn test_info_report_serializes() {
        let config =
            ResolvedConfig::new([("os", "Linux")].into_iter().collect(), OptionValues::new());
        let node = reference("app/1.0#r0");
        let conf = Conf::new();
        let input = PackageIdInput {
            reference: &node,
            config: &config,
            dependencies: vec![dependency(DependencyKind::Requires, "zlib/1.3#r1", "z")],
            conf: &conf,
            header_only: false,
        };
        let computed = PackageIdEngine::default().compute(&input, |_| Ok(())).unwrap();
        let json = serde_json::to_value(&computed.info).unwrap();
        assert_eq!(json["settings"]["os"], "Linux");
        assert_eq!(json["requires"]["zlib"]["mode"], "recipe_revision_mode");
    }
}
