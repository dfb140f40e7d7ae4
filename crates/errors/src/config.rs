//! Configuration error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("invalid config: {message}")]
    Invalid { message: String },

    #[error("parse error: {message}")]
    ParseError { message: String },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("setting '{key}' is not defined in the settings schema")]
    UndefinedSetting { key: String },

    #[error("invalid value '{value}' for setting '{key}', allowed: {}", .allowed.join(", "))]
    InvalidSetting {
        key: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error(
        "invalid value '{value}' for option '{option}' of '{reference}', allowed: {}",
        .allowed.join(", ")
    )]
    InvalidOption {
        reference: String,
        option: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("failed to write config to {path}: {error}")]
    WriteError { path: String, error: String },
}

impl UserFacingError for ConfigError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("Provide a configuration file or rely on the defaults."),
            Self::InvalidValue { .. } | Self::Invalid { .. } | Self::ParseError { .. } => {
                Some("Fix the configuration value and retry the command.")
            }
            Self::InvalidPattern { .. } => {
                Some("Patterns are glob expressions over name/version, or & for the consumer.")
            }
            Self::UndefinedSetting { .. } | Self::InvalidSetting { .. } => {
                Some("Check the profile settings against the settings schema.")
            }
            Self::InvalidOption { .. } => Some("Use one of the values declared by the recipe."),
            Self::WriteError { .. } => Some("Ensure the path is writable and retry."),
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotFound { .. } => "config.not_found",
            Self::Invalid { .. } => "config.invalid",
            Self::ParseError { .. } => "config.parse_error",
            Self::InvalidValue { .. } => "config.invalid_value",
            Self::InvalidPattern { .. } => "config.invalid_pattern",
            Self::UndefinedSetting { .. } => "config.undefined_setting",
            Self::InvalidSetting { .. } => "config.invalid_setting",
            Self::InvalidOption { .. } => "config.invalid_option",
            Self::WriteError { .. } => "config.write_error",
        };
        Some(code)
    }
}
