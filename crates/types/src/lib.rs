#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the kiln package manager
//!
//! This crate provides the value types shared by the resolver, the package
//! id engine and the cache: versions and ranges, recipe references,
//! settings, options and conf values.

pub mod conf;
pub mod mode;
pub mod options;
pub mod range;
pub mod reference;
pub mod settings;
pub mod version;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use conf::{Conf, ConfValue, PACKAGE_ID_CONFS};
pub use mode::{Context, PackageId, PackageIdMode};
pub use options::{OptionValues, OptionsSchema};
pub use range::{Condition, VersionRange};
pub use reference::{PackageSpec, RecipeReference, VersionSpec};
pub use settings::{Settings, SettingsSchema, ANY_VALUE};
pub use version::{Version, VersionItem};
