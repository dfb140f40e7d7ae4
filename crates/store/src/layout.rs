//! Directory layout of the local cache
//!
//! ```text
//! <root>/recipes/<name>/<version>/<user>/<channel>/<rrev>/
//!     manifest.json
//!     files/...
//! <root>/packages/<name>/<version>/<user>/<channel>/<rrev>/<package id>/<prev>/
//!     manifest.json
//!     files/...
//! <root>/tmp/<uuid>/
//! ```
//!
//! A missing user or channel is stored as `_`.

use kiln_errors::Error;
use kiln_types::{PackageId, RecipeReference, Version};
use std::path::{Path, PathBuf};

pub(crate) const RECIPES_DIR: &str = "recipes";
pub(crate) const PACKAGES_DIR: &str = "packages";
pub(crate) const TEMP_DIR: &str = "tmp";
pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const FILES_DIR: &str = "files";

/// Depth of a recipe entry below `recipes/`
pub(crate) const RECIPE_DEPTH: usize = 5;
/// Depth of a package entry below `packages/`
pub(crate) const PACKAGE_DEPTH: usize = 7;

const NONE_SEGMENT: &str = "_";

fn revision_of(reference: &RecipeReference) -> Result<&str, Error> {
    reference
        .revision
        .as_deref()
        .ok_or_else(|| Error::internal(format!("cache entries need a revision: {reference}")))
}

fn recipe_segments(base: &Path, reference: &RecipeReference) -> Result<PathBuf, Error> {
    Ok(base
        .join(&reference.name)
        .join(reference.version.as_str())
        .join(reference.user.as_deref().unwrap_or(NONE_SEGMENT))
        .join(reference.channel.as_deref().unwrap_or(NONE_SEGMENT))
        .join(revision_of(reference)?))
}

pub(crate) fn recipe_dir(root: &Path, reference: &RecipeReference) -> Result<PathBuf, Error> {
    recipe_segments(&root.join(RECIPES_DIR), reference)
}

/// Every binary built from one recipe revision
pub(crate) fn recipe_packages_dir(
    root: &Path,
    reference: &RecipeReference,
) -> Result<PathBuf, Error> {
    recipe_segments(&root.join(PACKAGES_DIR), reference)
}

/// Every binary revision of one package id
pub(crate) fn package_id_dir(
    root: &Path,
    reference: &RecipeReference,
    package_id: &PackageId,
) -> Result<PathBuf, Error> {
    Ok(recipe_packages_dir(root, reference)?.join(package_id.as_str()))
}

pub(crate) fn package_dir(
    root: &Path,
    reference: &RecipeReference,
    package_id: &PackageId,
    package_revision: &str,
) -> Result<PathBuf, Error> {
    Ok(package_id_dir(root, reference, package_id)?.join(package_revision))
}

/// Rebuild a reference from the first five segments of an entry path
pub(crate) fn reference_from_segments(segments: &[String]) -> Option<RecipeReference> {
    let [name, version, user, channel, revision, ..] = segments else {
        return None;
    };
    let optional = |s: &String| (s != NONE_SEGMENT).then(|| s.clone());
    Some(RecipeReference {
        name: name.clone(),
        version: Version::parse(version),
        user: optional(user),
        channel: optional(channel),
        revision: Some(revision.clone()),
        timestamp: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_roundtrip() {
        let reference = RecipeReference::parse("zlib/1.3@acme#r1").unwrap();
        let dir = recipe_dir(Path::new("/cache"), &reference).unwrap();
        assert_eq!(dir, Path::new("/cache/recipes/zlib/1.3/acme/_/r1"));

        let segments: Vec<String> = ["zlib", "1.3", "acme", "_", "r1"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let rebuilt = reference_from_segments(&segments).unwrap();
        assert!(rebuilt.eq_with_revision(&reference));
    }

    #[test]
    fn test_revision_required() {
        let reference = RecipeReference::parse("zlib/1.3").unwrap();
        assert!(recipe_dir(Path::new("/cache"), &reference).is_err());
    }
}
