//! Dependency contributions to a package id

use kiln_types::{PackageId, PackageIdMode, RecipeReference};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which list of the info a dependency lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Requires,
    BuildRequires,
    PythonRequires,
}

/// Default modes per dependency kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDefaults {
    pub requires: PackageIdMode,
    pub build_requires: PackageIdMode,
    pub python_requires: PackageIdMode,
}

impl Default for ModeDefaults {
    fn default() -> Self {
        Self {
            requires: PackageIdMode::RecipeRevision,
            build_requires: PackageIdMode::Minor,
            python_requires: PackageIdMode::Minor,
        }
    }
}

impl ModeDefaults {
    #[must_use]
    pub fn for_kind(&self, kind: DependencyKind) -> PackageIdMode {
        match kind {
            DependencyKind::Requires => self.requires,
            DependencyKind::BuildRequires => self.build_requires,
            DependencyKind::PythonRequires => self.python_requires,
        }
    }

    /// Mode before the consumer's hook runs
    ///
    /// A mode on the requirement beats the one the dependency recipe
    /// declares, which beats the default for the kind.
    #[must_use]
    pub fn select(
        &self,
        kind: DependencyKind,
        requirement: Option<PackageIdMode>,
        declared: Option<PackageIdMode>,
    ) -> PackageIdMode {
        requirement
            .or(declared)
            .unwrap_or_else(|| self.for_kind(kind))
    }
}

/// One dependency as seen by a consumer's package id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementInfo {
    reference: RecipeReference,
    package_id: PackageId,
    mode: PackageIdMode,
}

impl RequirementInfo {
    #[must_use]
    pub fn new(reference: RecipeReference, package_id: PackageId, mode: PackageIdMode) -> Self {
        Self {
            reference,
            package_id,
            mode,
        }
    }

    #[must_use]
    pub fn reference(&self) -> &RecipeReference {
        &self.reference
    }

    #[must_use]
    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }

    #[must_use]
    pub fn mode(&self) -> PackageIdMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PackageIdMode) {
        self.mode = mode;
    }

    /// Canonical line for this dependency, `None` in `unrelated_mode`
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let reference = &self.reference;
        let name = &reference.name;
        let version = &reference.version;
        let user_channel = match (&reference.user, &reference.channel) {
            (Some(user), Some(channel)) => format!("@{user}/{channel}"),
            (Some(user), None) => format!("@{user}"),
            _ => String::new(),
        };
        let revision = reference.revision.as_deref().unwrap_or_default();
        let package_id = &self.package_id;

        let line = match self.mode {
            PackageIdMode::Unrelated => return None,
            PackageIdMode::Major => format!("{name}/{}", version.major_mode()),
            PackageIdMode::Minor => format!("{name}/{}", version.minor_mode()),
            PackageIdMode::Patch => format!("{name}/{}", version.patch_mode()),
            PackageIdMode::Semver => format!("{name}/{}", version.semver_mode()),
            PackageIdMode::FullVersion => format!("{name}/{version}"),
            PackageIdMode::FullRecipe => format!("{name}/{version}{user_channel}"),
            PackageIdMode::RecipeRevision => format!("{name}/{version}{user_channel}#{revision}"),
            PackageIdMode::FullPackage => format!("{name}/{version}{user_channel}:{package_id}"),
            PackageIdMode::Full => {
                format!("{name}/{version}{user_channel}#{revision}:{package_id}")
            }
        };
        Some(line)
    }
}

/// Dependencies of one kind, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequirementsInfo(BTreeMap<String, RequirementInfo>);

impl RequirementsInfo {
    pub fn insert(&mut self, info: RequirementInfo) {
        self.0.insert(info.reference.name.clone(), info);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RequirementInfo> {
        self.0.get(name)
    }

    /// Change how one dependency contributes
    ///
    /// Returns `false` when there is no dependency of that name.
    pub fn set_mode(&mut self, name: &str, mode: PackageIdMode) -> bool {
        match self.0.get_mut(name) {
            Some(info) => {
                info.set_mode(mode);
                true
            }
            None => false,
        }
    }

    /// Set the same mode on every dependency
    pub fn set_all_modes(&mut self, mode: PackageIdMode) {
        for info in self.0.values_mut() {
            info.set_mode(mode);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<RequirementInfo> {
        self.0.remove(name)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequirementInfo> {
        self.0.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted canonical lines, unrelated dependencies left out
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.0.values().filter_map(RequirementInfo::render).collect();
        lines.sort();
        lines.dedup();
        lines
    }
}
