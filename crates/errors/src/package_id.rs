//! Package ID computation error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PackageIdError {
    #[error("package_id() failed for '{reference}': {source}")]
    HookFailed {
        reference: String,
        #[source]
        source: Box<crate::Error>,
    },

    #[error("'{reference}' accessed live {field} during package_id(); use the info snapshot instead")]
    ForbiddenAccess { reference: String, field: String },

    #[error("dependency '{dependency}' of '{reference}' has no package id yet")]
    DependencyNotComputed {
        reference: String,
        dependency: String,
    },
}

impl PackageIdError {
    /// Wrap an error raised by a recipe hook
    #[must_use]
    pub fn hook_failed(reference: impl Into<String>, source: impl Into<crate::Error>) -> Self {
        Self::HookFailed {
            reference: reference.into(),
            source: Box::new(source.into()),
        }
    }
}

impl UserFacingError for PackageIdError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::HookFailed { .. } => Some("Fix the package_id() hook of the named recipe."),
            Self::ForbiddenAccess { .. } => {
                Some("Read and modify `info.settings` / `info.options` inside package_id().")
            }
            Self::DependencyNotComputed { .. } => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::HookFailed { .. } => "package_id.hook_failed",
            Self::ForbiddenAccess { .. } => "package_id.forbidden_access",
            Self::DependencyNotComputed { .. } => "package_id.dependency_not_computed",
        };
        Some(code)
    }
}
