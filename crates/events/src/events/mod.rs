use serde::{Deserialize, Serialize};

use crate::{EventLevel, EventSource};
use kiln_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod download;
pub mod general;
pub mod recipe;
pub mod resolver;

pub use download::*;
pub use general::*;
pub use recipe::*;
pub use resolver::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Warnings, errors and debug messages
    General(GeneralEvent),

    /// Graph expansion, package ids and binary analysis
    Resolver(ResolverEvent),

    /// Artifact downloads
    Download(DownloadEvent),

    /// Output of recipe hooks, scoped per node
    Recipe(RecipeEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Resolver(_) => EventSource::RESOLVER,
            Self::Download(_) => EventSource::DOWNLOAD,
            Self::Recipe(_) => EventSource::RECIPE,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            // Error-level events
            Self::General(GeneralEvent::Error { .. })
            | Self::Resolver(ResolverEvent::ResolutionFailed { .. })
            | Self::Download(DownloadEvent::Failed { .. }) => Level::ERROR,

            // Warning-level events
            Self::General(GeneralEvent::Warning { .. })
            | Self::Resolver(ResolverEvent::ConflictDetected { .. })
            | Self::Download(DownloadEvent::Retrying { .. }) => Level::WARN,

            // Recipe output carries its own level
            Self::Recipe(RecipeEvent::Output { level, .. }) => (*level).into(),

            // Debug-level events (internal progress)
            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Resolver(
                ResolverEvent::RangeResolved { .. }
                | ResolverEvent::PackageIdComputed { .. }
                | ResolverEvent::BinaryAnalyzed { .. },
            )
            | Self::Download(DownloadEvent::Queued { .. })
            | Self::Recipe(RecipeEvent::HookStarted { .. }) => Level::DEBUG,

            // Default to INFO for most events
            _ => Level::INFO,
        }
    }

    /// Event level matching [`AppEvent::log_level`]
    #[must_use]
    pub fn event_level(&self) -> EventLevel {
        EventLevel::from(self.log_level())
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "kiln::events::general",
            Self::Resolver(_) => "kiln::events::resolver",
            Self::Download(_) => "kiln::events::download",
            Self::Recipe(_) => "kiln::events::recipe",
        }
    }
}
