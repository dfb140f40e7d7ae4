use serde::{Deserialize, Serialize};

use crate::EventLevel;

/// Output written by recipe hooks through their node handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecipeEvent {
    /// A line of hook output
    Output {
        scope: String,
        level: EventLevel,
        message: String,
    },

    /// A hook started running
    HookStarted { scope: String, hook: String },
}

impl RecipeEvent {
    #[must_use]
    pub fn output(scope: impl Into<String>, level: EventLevel, message: impl Into<String>) -> Self {
        Self::Output {
            scope: scope.into(),
            level,
            message: message.into(),
        }
    }
}
