//! Package id computation for one node

use crate::config::ResolvedConfig;
use crate::info::{filter_conf, PackageIdInfo};
use crate::requirements::{DependencyKind, ModeDefaults, RequirementInfo};
use kiln_errors::{Error, PackageIdError};
use kiln_types::{Conf, PackageId, PackageIdMode, RecipeReference};
use tracing::debug;

/// A resolved dependency of the node being hashed
#[derive(Debug, Clone)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub reference: RecipeReference,
    pub package_id: PackageId,
    /// Mode the consumer put on the requirement
    pub requirement_mode: Option<PackageIdMode>,
    /// Mode the dependency's own recipe asks for
    pub declared_mode: Option<PackageIdMode>,
}

/// Everything a node's package id depends on
#[derive(Debug, Clone)]
pub struct PackageIdInput<'a> {
    pub reference: &'a RecipeReference,
    pub config: &'a ResolvedConfig,
    pub dependencies: Vec<Dependency>,
    pub conf: &'a Conf,
    pub header_only: bool,
}

/// Result of one computation
#[derive(Debug, Clone)]
pub struct ComputedPackageId {
    pub package_id: PackageId,
    pub info: PackageIdInfo,
}

/// Turns resolved nodes into package ids
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageIdEngine {
    defaults: ModeDefaults,
}

impl PackageIdEngine {
    #[must_use]
    pub fn new(defaults: ModeDefaults) -> Self {
        Self { defaults }
    }

    #[must_use]
    pub fn defaults(&self) -> &ModeDefaults {
        &self.defaults
    }

    /// Seed the info without running any hook
    #[must_use]
    pub fn seed(&self, input: &PackageIdInput<'_>) -> PackageIdInfo {
        let mut info = PackageIdInfo::from_config(input.config);
        for dependency in &input.dependencies {
            let mode = self.defaults.select(
                dependency.kind,
                dependency.requirement_mode,
                dependency.declared_mode,
            );
            info.add_dependency(
                dependency.kind,
                RequirementInfo::new(
                    dependency.reference.clone(),
                    dependency.package_id.clone(),
                    mode,
                ),
            );
        }
        info.conf = filter_conf(input.conf);
        if input.header_only {
            info.clear();
        }
        info
    }

    /// Compute a package id, letting `hook` edit the info first
    ///
    /// # Errors
    ///
    /// A failing hook aborts with `PackageIdError::HookFailed` carrying the
    /// reference; a forbidden access raised by the hook is passed through
    /// unchanged.
    pub fn compute<F>(
        &self,
        input: &PackageIdInput<'_>,
        hook: F,
    ) -> Result<ComputedPackageId, PackageIdError>
    where
        F: FnOnce(&mut PackageIdInfo) -> Result<(), Error>,
    {
        let mut info = self.seed(input);
        match hook(&mut info) {
            Ok(()) => {}
            Err(Error::PackageId(err @ PackageIdError::ForbiddenAccess { .. })) => return Err(err),
            Err(err) => return Err(PackageIdError::hook_failed(input.reference.to_string(), err)),
        }

        let package_id = info.package_id();
        debug!(reference = %input.reference, package_id = %package_id, "package id computed");
        Ok(ComputedPackageId { package_id, info })
    }
}
