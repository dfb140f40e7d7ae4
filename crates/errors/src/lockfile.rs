//! Lockfile error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum LockfileError {
    #[error("requirement '{requirement}' is not satisfied by locked '{locked}'")]
    Mismatch {
        requirement: String,
        locked: String,
    },

    #[error("requirement '{requirement}' is not present in the strict lockfile")]
    Unlocked { requirement: String },

    #[error("locked reference '{reference}' has no revision")]
    MissingRevision { reference: String },

    #[error("invalid lockfile: {message}")]
    Invalid { message: String },

    #[error("unsupported lockfile version {version}")]
    UnsupportedVersion { version: u32 },
}

impl UserFacingError for LockfileError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Mismatch { .. } | Self::Unlocked { .. } => {
                Some("Update the lockfile or relax the requirement.")
            }
            Self::MissingRevision { .. } | Self::Invalid { .. } => {
                Some("Regenerate the lockfile from a successful resolution.")
            }
            Self::UnsupportedVersion { .. } => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Mismatch { .. } => "lockfile.mismatch",
            Self::Unlocked { .. } => "lockfile.unlocked",
            Self::MissingRevision { .. } => "lockfile.missing_revision",
            Self::Invalid { .. } => "lockfile.invalid",
            Self::UnsupportedVersion { .. } => "lockfile.unsupported_version",
        };
        Some(code)
    }
}
