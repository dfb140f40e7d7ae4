use serde::{Deserialize, Serialize};

/// One remote package index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RemoteConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    /// URL of the index document for this remote
    #[must_use]
    pub fn index_url(&self) -> String {
        format!("{}/index.json", self.url.trim_end_matches('/'))
    }
}

fn default_enabled() -> bool {
    true
}
