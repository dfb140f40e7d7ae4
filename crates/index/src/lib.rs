#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package sources for kiln
//!
//! This crate defines the [`PackageBackend`] contract shared by the local
//! cache and remote indexes, the JSON index snapshot a remote serves, the
//! on-disk copy of those snapshots, and [`Sources`], which applies the
//! cache/remote tie-break rules when a requirement is resolved.

mod backend;
mod cache;
mod models;
mod sources;

pub use backend::{BinaryCandidate, IndexBackend, PackageBackend, RecipeCandidate, SourceId};
pub use cache::IndexCache;
pub use models::{BinaryEntry, Index, IndexMetadata, PackageEntry, RecipeEntry};
pub use sources::Sources;

/// Supported index format version
pub const SUPPORTED_INDEX_VERSION: u32 = 1;
