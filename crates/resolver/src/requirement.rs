//! Requirements: the edges a recipe declares towards its dependencies

use kiln_errors::VersionError;
use kiln_types::{Context, PackageIdMode, PackageSpec};
use serde::Serialize;
use std::fmt;

/// One dependency request together with its trait flags
///
/// Two requirements name the same dependency when their [`key`](Self::key)
/// matches: a package can be required once as a host dependency and once as
/// a build tool, but not twice in the same context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub spec: PackageSpec,
    pub build: bool,
    pub test: bool,
    pub direct: bool,
    pub visible: bool,
    pub run: Option<bool>,
    pub headers: bool,
    pub libs: bool,
    pub transitive_headers: Option<bool>,
    pub transitive_libs: Option<bool>,
    #[serde(rename = "override")]
    pub is_override: bool,
    pub force: bool,
    pub package_id_mode: Option<PackageIdMode>,
}

fn or_option(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a || b),
        (a, None) => a,
        (None, b) => b,
    }
}

fn mode_rank(mode: PackageIdMode) -> usize {
    PackageIdMode::ALL
        .iter()
        .position(|m| *m == mode)
        .unwrap_or_default()
}

impl Requirement {
    /// A regular, visible host requirement
    #[must_use]
    pub fn new(spec: PackageSpec) -> Self {
        Self {
            spec,
            build: false,
            test: false,
            direct: true,
            visible: true,
            run: None,
            headers: true,
            libs: true,
            transitive_headers: None,
            transitive_libs: None,
            is_override: false,
            force: false,
            package_id_mode: None,
        }
    }

    /// A build tool, resolved in the build context
    #[must_use]
    pub fn tool(spec: PackageSpec) -> Self {
        Self {
            build: true,
            visible: false,
            run: Some(true),
            headers: false,
            libs: false,
            ..Self::new(spec)
        }
    }

    /// A dependency only needed to test the package
    #[must_use]
    pub fn test(spec: PackageSpec) -> Self {
        Self {
            test: true,
            visible: false,
            ..Self::new(spec)
        }
    }

    /// A version declaration that only replaces matching requirements
    /// further up the graph and never creates an edge itself
    #[must_use]
    pub fn overriding(spec: PackageSpec) -> Self {
        Self {
            is_override: true,
            ..Self::new(spec)
        }
    }

    /// Parse a regular requirement from its text form
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if the reference or range is malformed.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        PackageSpec::parse(text).map(Self::new)
    }

    #[must_use]
    pub fn private(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    #[must_use]
    pub fn with_package_id_mode(mut self, mode: PackageIdMode) -> Self {
        self.package_id_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Identity of the dependency: its name and whether it is a build tool
    #[must_use]
    pub fn key(&self) -> (String, bool) {
        (self.spec.name.clone(), self.build)
    }

    /// Context the required package lives in, given the requiring node's
    #[must_use]
    pub fn target_context(&self, from: Context) -> Context {
        if self.build {
            Context::Build
        } else {
            from
        }
    }

    /// Whether entries reached through this requirement are seen by the
    /// requiring node's own dependants
    #[must_use]
    pub fn propagates(&self) -> bool {
        self.visible && !self.build
    }

    /// Aggregate two requests for the same dependency
    ///
    /// The result is visible if either side is, and stays a test
    /// requirement only if both are. Flags combine with OR, the stricter
    /// package id mode wins, and when the specs differ the one with the
    /// smaller text form is kept, so the result never depends on argument
    /// order.
    #[must_use]
    pub fn merge(a: &Self, b: &Self) -> Self {
        let spec = if a.spec == b.spec || a.spec.to_string() <= b.spec.to_string() {
            a.spec.clone()
        } else {
            b.spec.clone()
        };
        let package_id_mode = match (a.package_id_mode, b.package_id_mode) {
            (Some(x), Some(y)) => Some(if mode_rank(x) >= mode_rank(y) { x } else { y }),
            (x, None) => x,
            (None, y) => y,
        };
        Self {
            spec,
            build: a.build || b.build,
            test: a.test && b.test,
            direct: a.direct || b.direct,
            visible: a.visible || b.visible,
            run: or_option(a.run, b.run),
            headers: a.headers || b.headers,
            libs: a.libs || b.libs,
            transitive_headers: or_option(a.transitive_headers, b.transitive_headers),
            transitive_libs: or_option(a.transitive_libs, b.transitive_libs),
            is_override: a.is_override || b.is_override,
            force: a.force || b.force,
            package_id_mode,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec)?;
        if self.build {
            f.write_str(" (build)")?;
        }
        if self.test {
            f.write_str(" (test)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(text: &str) -> Requirement {
        Requirement::parse(text).unwrap()
    }

    #[test]
    fn test_keys_separate_contexts() {
        let host = req("cmake/3.27");
        let tool = Requirement::tool(PackageSpec::parse("cmake/3.27").unwrap());
        assert_ne!(host.key(), tool.key());
        assert_eq!(tool.target_context(Context::Host), Context::Build);
        assert_eq!(host.target_context(Context::Build), Context::Build);
    }

    #[test]
    fn test_merge_ors_visibility() {
        let public = req("zlib/1.3");
        let private = req("zlib/1.3").private();
        assert!(Requirement::merge(&public, &private).visible);
        assert!(Requirement::merge(&private, &public).visible);
        assert!(!Requirement::merge(&private, &private).visible);
    }

    #[test]
    fn test_merge_idempotent_and_commutative() {
        let a = req("zlib/[>=1.2]").with_package_id_mode(PackageIdMode::Minor);
        let mut b = Requirement::test(PackageSpec::parse("zlib/1.3").unwrap());
        b.package_id_mode = Some(PackageIdMode::Full);
        b.transitive_headers = Some(true);

        assert_eq!(Requirement::merge(&a, &a), a);
        let ab = Requirement::merge(&a, &b);
        assert_eq!(ab, Requirement::merge(&b, &a));
        assert_eq!(ab.package_id_mode, Some(PackageIdMode::Full));
        assert!(!ab.test);
        assert_eq!(ab.transitive_headers, Some(true));
    }

    #[test]
    fn test_tool_is_not_propagated() {
        let tool = Requirement::tool(PackageSpec::parse("ninja/1.11").unwrap());
        assert!(!tool.propagates());
        assert!(!req("zlib/1.3").private().propagates());
        assert!(req("zlib/1.3").propagates());
    }
}
