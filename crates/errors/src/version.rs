//! Version and range parsing error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum VersionError {
    #[error("invalid version range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("invalid reference '{input}': {reason}")]
    InvalidReference { input: String, reason: String },

    #[error("invalid package id mode: {input}")]
    InvalidMode { input: String },
}

impl UserFacingError for VersionError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRange { .. } => Some(
                "Use ranges like [>=1.2 <2.0], [~1.2], [^1.0] or alternatives joined with ||.",
            ),
            Self::InvalidReference { .. } => {
                Some("References look like name/version[@user/channel][#revision].")
            }
            Self::InvalidMode { .. } => {
                Some("Valid modes end in _mode, for example minor_mode or recipe_revision_mode.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidRange { .. } => "version.invalid_range",
            Self::InvalidReference { .. } => "version.invalid_reference",
            Self::InvalidMode { .. } => "version.invalid_mode",
        };
        Some(code)
    }
}
