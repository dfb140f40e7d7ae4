//! Dependency graph resolution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum GraphError {
    #[error(
        "unable to find '{requirement}' in the cache or any remote (required by {})",
        .chain.join(" -> ")
    )]
    PackageNotFound {
        requirement: String,
        chain: Vec<String>,
    },

    #[error(
        "version conflict for '{name}': {} requires {existing} but {} requires {requested}",
        .existing_path.join(" -> "),
        .requested_path.join(" -> ")
    )]
    Conflict {
        name: String,
        existing: String,
        existing_path: Vec<String>,
        requested: String,
        requested_path: Vec<String>,
    },

    #[error("dependency loop: '{reference}' requires itself ({})", .chain.join(" -> "))]
    Loop {
        reference: String,
        chain: Vec<String>,
    },

    #[error("missing prebuilt package for {}", .packages.join(", "))]
    MissingBinaries { packages: Vec<String> },

    #[error("invalid configuration for '{reference}': {reason}")]
    InvalidConfiguration { reference: String, reason: String },

    #[error("failed to load recipe '{reference}': {message}")]
    RecipeLoad { reference: String, message: String },

    #[error("recipe '{reference}' failed in {hook}(): {message}")]
    RecipeHook {
        reference: String,
        hook: String,
        message: String,
    },

    #[error("graph contains a cycle among {}", .nodes.join(", "))]
    InternalCycle { nodes: Vec<String> },
}

impl UserFacingError for GraphError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PackageNotFound { .. } => {
                Some("Check the requirement spelling, the configured remotes, or relax the range.")
            }
            Self::Conflict { .. } => Some(
                "Align the conflicting requirements or declare an override in the consumer.",
            ),
            Self::MissingBinaries { .. } => Some(
                "Build the missing packages from source with --build=missing or --build=<name>.",
            ),
            Self::InvalidConfiguration { .. } => {
                Some("Change the settings or options so the recipe accepts the configuration.")
            }
            Self::Loop { .. } => Some("Remove the requirement that closes the loop."),
            Self::RecipeLoad { .. } | Self::RecipeHook { .. } => {
                Some("Fix the recipe named in the error and retry.")
            }
            Self::InternalCycle { .. } => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::PackageNotFound { .. } => "graph.package_not_found",
            Self::Conflict { .. } => "graph.conflict",
            Self::Loop { .. } => "graph.loop",
            Self::MissingBinaries { .. } => "graph.missing_binaries",
            Self::InvalidConfiguration { .. } => "graph.invalid_configuration",
            Self::RecipeLoad { .. } => "graph.recipe_load",
            Self::RecipeHook { .. } => "graph.recipe_hook",
            Self::InternalCycle { .. } => "graph.internal_cycle",
        };
        Some(code)
    }
}
