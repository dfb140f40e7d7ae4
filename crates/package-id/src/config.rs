use kiln_types::{OptionValues, Settings};
use serde::Serialize;

/// Settings and options a node was resolved with
///
/// Frozen once the recipe's `configure` hook has run. Package id
/// computation only ever reads it; edits go to a
/// [`PackageIdInfo`](crate::PackageIdInfo) cloned from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    settings: Settings,
    options: OptionValues,
}

impl ResolvedConfig {
    #[must_use]
    pub fn new(settings: Settings, options: OptionValues) -> Self {
        Self { settings, options }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn options(&self) -> &OptionValues {
        &self.options
    }
}
