use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Resolver domain events for graph expansion and binary analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResolverEvent {
    /// Graph expansion started
    ResolutionStarted {
        requires: usize,
        tool_requires: usize,
        locked: bool,
    },

    /// A requirement was bound to a new node
    NodeResolved {
        reference: String,
        context: String,
        /// `cache`, `remote:<name>` or `lockfile`
        origin: String,
    },

    /// A version range was narrowed to one candidate
    RangeResolved {
        requirement: String,
        selected: String,
    },

    /// An override replaced a requirement's reference
    Overridden {
        original: String,
        replacement: String,
    },

    /// Two requirements disagree on a version
    ConflictDetected {
        name: String,
        existing: String,
        requested: String,
    },

    /// Package id computed for a node
    PackageIdComputed {
        reference: String,
        package_id: String,
    },

    /// Binary status decided for a node
    BinaryAnalyzed {
        reference: String,
        package_id: String,
        status: String,
    },

    /// Resolution finished
    ResolutionCompleted {
        nodes: usize,
        levels: usize,
        duration_ms: u64,
    },

    /// Resolution aborted
    ResolutionFailed { failure: FailureContext },
}

impl ResolverEvent {
    /// Create a conflict detected event
    #[must_use]
    pub fn conflict_detected(
        name: impl Into<String>,
        existing: impl Into<String>,
        requested: impl Into<String>,
    ) -> Self {
        Self::ConflictDetected {
            name: name.into(),
            existing: existing.into(),
            requested: requested.into(),
        }
    }

    /// Create a binary analysis event
    #[must_use]
    pub fn binary_analyzed(
        reference: impl Into<String>,
        package_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self::BinaryAnalyzed {
            reference: reference.into(),
            package_id: package_id.into(),
            status: status.into(),
        }
    }
}
