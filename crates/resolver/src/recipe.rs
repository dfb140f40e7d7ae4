//! Recipe capability interface and loaders
//!
//! The resolver never parses recipe sources. It asks a [`RecipeLoader`] for
//! an `Arc<dyn Recipe>` and calls the hooks the recipe implements; every
//! hook except [`Recipe::name`] has a no-op default.

use kiln_errors::{Error, GraphError, PackageIdError};
use kiln_events::NodeOutput;
use kiln_package_id::{PackageIdInfo, ResolvedConfig};
use kiln_types::{OptionValues, OptionsSchema, PackageIdMode, RecipeReference, Settings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::requirement::Requirement;

/// Build information consumers read from a resolved node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CppInfo {
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub bin_dirs: Vec<String>,
    pub defines: Vec<String>,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub libs: Vec<String>,
}

/// Which hook a [`RecipeContext`] was handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Requirements,
    Validate,
    PackageId,
}

/// Read access to a node's resolved state during a hook
#[derive(Debug, Clone, Copy)]
pub struct RecipeContext<'a> {
    reference: &'a RecipeReference,
    config: &'a ResolvedConfig,
    phase: HookPhase,
    output: &'a NodeOutput,
}

impl<'a> RecipeContext<'a> {
    #[must_use]
    pub fn new(
        reference: &'a RecipeReference,
        config: &'a ResolvedConfig,
        phase: HookPhase,
        output: &'a NodeOutput,
    ) -> Self {
        Self {
            reference,
            config,
            phase,
            output,
        }
    }

    #[must_use]
    pub fn reference(&self) -> &RecipeReference {
        self.reference
    }

    #[must_use]
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Output scoped to this node
    #[must_use]
    pub fn output(&self) -> &NodeOutput {
        self.output
    }

    fn guard(&self, field: &str) -> Result<(), PackageIdError> {
        if self.phase == HookPhase::PackageId {
            return Err(PackageIdError::ForbiddenAccess {
                reference: self.reference.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// The node's resolved settings
    ///
    /// # Errors
    ///
    /// Returns `PackageIdError::ForbiddenAccess` inside `package_id`, where
    /// only the info snapshot may be read.
    pub fn settings(&self) -> Result<&Settings, PackageIdError> {
        self.guard("settings")?;
        Ok(self.config.settings())
    }

    /// The node's resolved options
    ///
    /// # Errors
    ///
    /// Returns `PackageIdError::ForbiddenAccess` inside `package_id`.
    pub fn options(&self) -> Result<&OptionValues, PackageIdError> {
        self.guard("options")?;
        Ok(self.config.options())
    }
}

/// A loaded recipe
pub trait Recipe: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Root settings the recipe depends on (`os`, `compiler`, ...)
    fn settings(&self) -> Vec<String> {
        Vec::new()
    }

    fn options(&self) -> OptionsSchema {
        OptionsSchema::new()
    }

    fn default_options(&self) -> OptionValues {
        OptionValues::new()
    }

    /// Host requirements, including override declarations
    ///
    /// # Errors
    ///
    /// Any error aborts resolution.
    fn requirements(&self, _ctx: &RecipeContext<'_>) -> Result<Vec<Requirement>, Error> {
        Ok(Vec::new())
    }

    /// Build tools, resolved in the build context
    ///
    /// # Errors
    ///
    /// Any error aborts resolution.
    fn build_requirements(&self, _ctx: &RecipeContext<'_>) -> Result<Vec<Requirement>, Error> {
        Ok(Vec::new())
    }

    /// # Errors
    ///
    /// Any error aborts resolution.
    fn test_requirements(&self, _ctx: &RecipeContext<'_>) -> Result<Vec<Requirement>, Error> {
        Ok(Vec::new())
    }

    /// Shared code recipes whose identity feeds the package id
    fn python_requires(&self) -> Vec<RecipeReference> {
        Vec::new()
    }

    /// Last chance to drop settings or options before they are frozen
    ///
    /// # Errors
    ///
    /// Any error aborts resolution.
    fn configure(
        &self,
        _settings: &mut Settings,
        _options: &mut OptionValues,
        _output: &NodeOutput,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Reject a configuration; the reason marks the binary as invalid
    ///
    /// # Errors
    ///
    /// The error text becomes the invalid reason.
    fn validate(&self, _ctx: &RecipeContext<'_>) -> Result<(), String> {
        Ok(())
    }

    /// Edit the info snapshot before it is hashed
    ///
    /// # Errors
    ///
    /// Any error aborts resolution for this node.
    fn package_id(&self, _info: &mut PackageIdInfo, _ctx: &RecipeContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// How consumers should fold this recipe into their package ids
    fn package_id_mode(&self) -> Option<PackageIdMode> {
        None
    }

    fn header_only(&self) -> bool {
        false
    }

    fn cpp_info(&self) -> CppInfo {
        CppInfo::default()
    }
}

/// Turns references into recipes
pub trait RecipeLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the recipe cannot be found or loaded.
    fn load(&self, reference: &RecipeReference) -> Result<Arc<dyn Recipe>, Error>;
}

/// A recipe described by data instead of code
#[derive(Debug, Clone, Default)]
pub struct RecipeDef {
    pub name: String,
    pub settings: Vec<String>,
    pub options: OptionsSchema,
    pub default_options: OptionValues,
    pub requires: Vec<Requirement>,
    pub tool_requires: Vec<Requirement>,
    pub test_requires: Vec<Requirement>,
    pub python_requires: Vec<RecipeReference>,
    /// Settings removed from the info before hashing
    pub package_id_ignores: Vec<String>,
    pub package_id_mode: Option<PackageIdMode>,
    pub header_only: bool,
    pub cpp_info: CppInfo,
}

impl RecipeDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn setting(mut self, root: impl Into<String>) -> Self {
        self.settings.push(root.into());
        self
    }

    #[must_use]
    pub fn option<I, S>(mut self, name: &str, allowed: I, default: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.with(name, allowed);
        self.default_options.set(name, default);
        self
    }

    #[must_use]
    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    #[must_use]
    pub fn tool_requires(mut self, requirement: Requirement) -> Self {
        self.tool_requires.push(Requirement {
            build: true,
            visible: false,
            ..requirement
        });
        self
    }

    #[must_use]
    pub fn test_requires(mut self, requirement: Requirement) -> Self {
        self.test_requires.push(Requirement {
            test: true,
            visible: false,
            ..requirement
        });
        self
    }

    #[must_use]
    pub fn python_requires(mut self, reference: RecipeReference) -> Self {
        self.python_requires.push(reference);
        self
    }

    #[must_use]
    pub fn ignore_setting(mut self, key: impl Into<String>) -> Self {
        self.package_id_ignores.push(key.into());
        self
    }

    #[must_use]
    pub fn with_package_id_mode(mut self, mode: PackageIdMode) -> Self {
        self.package_id_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn header_only(mut self) -> Self {
        self.header_only = true;
        self
    }

    #[must_use]
    pub fn with_cpp_info(mut self, cpp_info: CppInfo) -> Self {
        self.cpp_info = cpp_info;
        self
    }
}

impl Recipe for RecipeDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> Vec<String> {
        self.settings.clone()
    }

    fn options(&self) -> OptionsSchema {
        self.options.clone()
    }

    fn default_options(&self) -> OptionValues {
        self.default_options.clone()
    }

    fn requirements(&self, _ctx: &RecipeContext<'_>) -> Result<Vec<Requirement>, Error> {
        Ok(self.requires.clone())
    }

    fn build_requirements(&self, _ctx: &RecipeContext<'_>) -> Result<Vec<Requirement>, Error> {
        Ok(self.tool_requires.clone())
    }

    fn test_requirements(&self, _ctx: &RecipeContext<'_>) -> Result<Vec<Requirement>, Error> {
        Ok(self.test_requires.clone())
    }

    fn python_requires(&self) -> Vec<RecipeReference> {
        self.python_requires.clone()
    }

    fn package_id(&self, info: &mut PackageIdInfo, _ctx: &RecipeContext<'_>) -> Result<(), Error> {
        for key in &self.package_id_ignores {
            info.settings.remove(key);
        }
        Ok(())
    }

    fn package_id_mode(&self) -> Option<PackageIdMode> {
        self.package_id_mode
    }

    fn header_only(&self) -> bool {
        self.header_only
    }

    fn cpp_info(&self) -> CppInfo {
        self.cpp_info.clone()
    }
}

/// Loader over recipes registered in memory, keyed by reference
///
/// Lookups ignore the revision, so one registration serves every revision
/// the sources report for that version.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    recipes: HashMap<RecipeReference, Arc<dyn Recipe>>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, reference: RecipeReference, recipe: impl Recipe + 'static) -> Self {
        self.insert(reference, Arc::new(recipe));
        self
    }

    pub fn insert(&mut self, reference: RecipeReference, recipe: Arc<dyn Recipe>) {
        self.recipes.insert(reference.without_revision(), recipe);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl RecipeLoader for MemoryLoader {
    fn load(&self, reference: &RecipeReference) -> Result<Arc<dyn Recipe>, Error> {
        self.recipes
            .get(reference)
            .cloned()
            .ok_or_else(|| {
                GraphError::RecipeLoad {
                    reference: reference.to_string(),
                    message: "recipe not registered".to_string(),
                }
                .into()
            })
    }
}
