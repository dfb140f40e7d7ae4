#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Binary compatibility engine for kiln
//!
//! A package id is the BLAKE3 digest of a canonical text built from a
//! node's declared settings and options, its dependencies (each reduced
//! according to a [`PackageIdMode`](kiln_types::PackageIdMode)) and the
//! whitelisted conf entries. Two nodes with the same id are treated as
//! binary interchangeable.

mod config;
mod engine;
mod info;
mod requirements;

pub use config::ResolvedConfig;
pub use engine::{ComputedPackageId, Dependency, PackageIdEngine, PackageIdInput};
pub use info::{conf_key_matches, filter_conf, PackageIdInfo, EMPTY_PACKAGE_ID};
pub use requirements::{DependencyKind, ModeDefaults, RequirementInfo, RequirementsInfo};
