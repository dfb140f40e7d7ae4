use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Download-specific events for the event system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// Download queued for processing
    Queued {
        url: String,
        package: String,
        queue_position: usize,
    },

    /// Download started
    Started { url: String, package: String },

    /// A transient failure is being retried
    Retrying {
        url: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: String,
    },

    /// Download completed successfully
    Completed {
        url: String,
        package: String,
        final_size: u64,
        total_time: Duration,
        hash: String,
    },

    /// Download failed
    Failed {
        url: String,
        package: String,
        failure: FailureContext,
    },

    /// Whole batch finished
    BatchCompleted {
        succeeded: usize,
        failed: usize,
        total_time: Duration,
    },
}

impl DownloadEvent {
    /// Create a failed event from a user-facing error
    #[must_use]
    pub fn failed(
        url: impl Into<String>,
        package: impl Into<String>,
        failure: FailureContext,
    ) -> Self {
        Self::Failed {
            url: url.into(),
            package: package.into(),
            failure,
        }
    }
}
