#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for kiln
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/kiln/config.toml)
//! - Environment variables
//! - CLI flags (applied by the caller)
//!
//! Profiles, the settings/options/conf input of a resolution, live in
//! [`profile`].

pub mod pattern;
pub mod profile;
pub mod repository;

pub use pattern::PackagePattern;
pub use profile::{OptionAssignment, PackageSettings, Profile, ProfileStack};
pub use repository::RemoteConfig;

use kiln_errors::{ConfigError, Error};
use kiln_types::PackageIdMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub package_id: PackageIdConfig,

    #[serde(default)]
    pub paths: PathConfig,

    /// Remotes in priority order
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_parallel_downloads")]
    pub parallel_downloads: usize,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

/// Graph resolution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Let ranges select pre-release versions
    #[serde(default)]
    pub resolve_prereleases: bool,
    /// Check tool requires against host requires of the same name
    #[serde(default)]
    pub cross_context_conflicts: bool,
    /// Query every remote for the newest candidate instead of stopping early
    #[serde(default)]
    pub update: bool,
}

/// Default package id modes per dependency kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIdConfig {
    #[serde(default = "default_requires_mode")]
    pub default_requires_mode: PackageIdMode,
    #[serde(default = "default_build_mode")]
    pub default_build_mode: PackageIdMode,
    #[serde(default = "default_python_mode")]
    pub default_python_mode: PackageIdMode,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub cache_path: Option<PathBuf>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            parallel_downloads: 4,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 300, // 5 minutes
            retries: 3,
            retry_delay: 1, // 1 second
        }
    }
}

impl Default for PackageIdConfig {
    fn default() -> Self {
        Self {
            default_requires_mode: PackageIdMode::RecipeRevision,
            default_build_mode: PackageIdMode::Minor,
            default_python_mode: PackageIdMode::Minor,
        }
    }
}

// Default value functions for serde
fn default_parallel_downloads() -> usize {
    4
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

fn default_requires_mode() -> PackageIdMode {
    PackageIdMode::RecipeRevision
}

fn default_build_mode() -> PackageIdMode {
    PackageIdMode::Minor
}

fn default_python_mode() -> PackageIdMode {
    PackageIdMode::Minor
}

fn parse_bool(field: &str, value: String) -> Result<bool, ConfigError> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    })
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("kiln").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(downloads) = std::env::var("KILN_PARALLEL_DOWNLOADS") {
            self.general.parallel_downloads = parse_number("KILN_PARALLEL_DOWNLOADS", downloads)?;
        }

        if let Ok(timeout) = std::env::var("KILN_TIMEOUT") {
            self.network.timeout = parse_number("KILN_TIMEOUT", timeout)?;
        }

        if let Ok(retries) = std::env::var("KILN_RETRIES") {
            self.network.retries = parse_number("KILN_RETRIES", retries)?;
        }

        if let Ok(delay) = std::env::var("KILN_RETRY_DELAY") {
            self.network.retry_delay = parse_number("KILN_RETRY_DELAY", delay)?;
        }

        if let Ok(update) = std::env::var("KILN_UPDATE") {
            self.resolver.update = parse_bool("KILN_UPDATE", update)?;
        }

        if let Ok(path) = std::env::var("KILN_CACHE_PATH") {
            if path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "KILN_CACHE_PATH".to_string(),
                    value: path,
                }
                .into());
            }
            self.paths.cache_path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Get the cache path (with default)
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.paths.cache_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiln")
        })
    }

    /// Remotes that are enabled, in priority order
    pub fn enabled_remotes(&self) -> impl Iterator<Item = &RemoteConfig> {
        self.remotes.iter().filter(|r| r.enabled)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate remote names or a zero download pool.
    pub fn validate(&self) -> Result<(), Error> {
        if self.general.parallel_downloads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "general.parallel_downloads".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        let mut seen = std::collections::HashSet::new();
        for remote in &self.remotes {
            if !seen.insert(remote.name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate remote name '{}'", remote.name),
                }
                .into());
            }
        }
        Ok(())
    }
}
