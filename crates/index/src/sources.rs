//! Candidate selection across the cache and the configured remotes
//!
//! Backends are kept in priority order: the cache first, then remotes in
//! configured order.
//!
//! Without `update`, the first backend holding any satisfying candidate
//! answers and later backends are never consulted. With `update`, every
//! backend is queried and the highest version wins, then the newest
//! revision timestamp; on a full tie the earlier backend is kept, so the
//! cache beats remotes and remotes keep their configured order.

use kiln_errors::Error;
use kiln_types::{PackageId, PackageSpec, RecipeReference};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{BinaryCandidate, PackageBackend, RecipeCandidate};

/// Ordered set of package sources
#[derive(Clone, Default)]
pub struct Sources {
    backends: Vec<Arc<dyn PackageBackend>>,
}

fn newer(a: &RecipeCandidate, b: &RecipeCandidate) -> Ordering {
    a.reference
        .version
        .cmp(&b.reference.version)
        .then_with(|| a.reference.timestamp.cmp(&b.reference.timestamp))
}

fn keep_best(best: &mut Option<RecipeCandidate>, candidate: RecipeCandidate) {
    let replace = best
        .as_ref()
        .is_none_or(|current| newer(&candidate, current) == Ordering::Greater);
    if replace {
        *best = Some(candidate);
    }
}

impl Sources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend with lower priority than the existing ones
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn PackageBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn push(&mut self, backend: Arc<dyn PackageBackend>) {
        self.backends.push(backend);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    fn best_in(
        backend: &dyn PackageBackend,
        spec: &PackageSpec,
        resolve_prereleases: bool,
    ) -> Result<Option<RecipeCandidate>, Error> {
        let mut best = None;
        for candidate in
            backend.recipe_candidates(&spec.name, spec.user.as_deref(), spec.channel.as_deref())?
        {
            if spec.matches(&candidate.reference, resolve_prereleases) {
                keep_best(&mut best, candidate);
            }
        }
        Ok(best)
    }

    /// Pick the recipe revision a requirement resolves to
    ///
    /// # Errors
    ///
    /// Returns the first error a backend reports.
    pub fn select(
        &self,
        spec: &PackageSpec,
        update: bool,
        resolve_prereleases: bool,
    ) -> Result<Option<RecipeCandidate>, Error> {
        let mut best = None;
        for backend in &self.backends {
            let Some(candidate) = Self::best_in(backend.as_ref(), spec, resolve_prereleases)? else {
                continue;
            };
            if !update {
                debug!(
                    spec = %spec,
                    reference = %candidate.reference,
                    source = %candidate.source,
                    "selected first satisfying source"
                );
                return Ok(Some(candidate));
            }
            keep_best(&mut best, candidate);
        }
        if let Some(candidate) = &best {
            debug!(
                spec = %spec,
                reference = %candidate.reference,
                source = %candidate.source,
                "selected newest across sources"
            );
        }
        Ok(best)
    }

    /// Find a binary for one recipe revision
    ///
    /// The cache always answers first. Among remotes the first one in order
    /// wins, or the newest binary with `update`.
    ///
    /// # Errors
    ///
    /// Returns the first error a backend reports.
    pub fn find_binary(
        &self,
        reference: &RecipeReference,
        package_id: &PackageId,
        update: bool,
    ) -> Result<Option<BinaryCandidate>, Error> {
        let mut best: Option<BinaryCandidate> = None;
        for backend in &self.backends {
            let Some(binary) = backend.binary(reference, package_id)? else {
                continue;
            };
            if binary.source.is_cache() || !update {
                return Ok(Some(binary));
            }
            if best.as_ref().is_none_or(|b| binary.timestamp > b.timestamp) {
                best = Some(binary);
            }
        }
        Ok(best)
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.source()))
            .finish()
    }
}
