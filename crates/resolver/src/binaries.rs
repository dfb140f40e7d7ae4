//! Binary analysis: decide, per node, where its binary comes from

use kiln_config::PackagePattern;
use kiln_errors::{ConfigError, Error, GraphError};
use kiln_events::{EventEmitter, ResolverEvent};
use kiln_index::Sources;
use kiln_types::RecipeReference;
use std::collections::VecDeque;
use tracing::debug;

use crate::graph::{BinaryStatus, Graph, NodeId};
use crate::Emitter;

/// Which packages may be built from source
///
/// Parsed from `--build` style entries: `missing` builds anything without
/// a binary, `missing:<pattern>` only matching packages without one,
/// `<pattern>` (or `*`) always builds matching packages, and `never`
/// forbids building. No entries means nothing is built.
#[derive(Debug, Clone, Default)]
pub struct BuildPolicy {
    never: bool,
    missing_all: bool,
    missing: Vec<PackagePattern>,
    forced: Vec<PackagePattern>,
}

impl BuildPolicy {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `never` is combined with
    /// other entries, or `ConfigError::InvalidPattern` for a bad pattern.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ConfigError> {
        let mut policy = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            match entry {
                "never" => policy.never = true,
                "missing" => policy.missing_all = true,
                _ => {
                    if let Some(pattern) = entry.strip_prefix("missing:") {
                        policy.missing.push(PackagePattern::parse(pattern)?);
                    } else {
                        policy.forced.push(PackagePattern::parse(entry)?);
                    }
                }
            }
        }
        if policy.never && entries.len() > 1 {
            return Err(ConfigError::InvalidValue {
                field: "build".to_string(),
                value: entries
                    .iter()
                    .map(|e| e.as_ref().to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            });
        }
        Ok(policy)
    }

    /// Build everything that has no binary
    #[must_use]
    pub fn missing() -> Self {
        Self {
            missing_all: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn never() -> Self {
        Self {
            never: true,
            ..Self::default()
        }
    }

    /// Whether the package is built even when a binary exists
    #[must_use]
    pub fn forces(&self, reference: &RecipeReference, is_consumer: bool) -> bool {
        !self.never
            && self
                .forced
                .iter()
                .any(|pattern| pattern.matches(reference, is_consumer))
    }

    /// Whether the package may be built when no binary exists
    #[must_use]
    pub fn builds_missing(&self, reference: &RecipeReference, is_consumer: bool) -> bool {
        !self.never
            && (self.missing_all
                || self
                    .missing
                    .iter()
                    .any(|pattern| pattern.matches(reference, is_consumer))
                || self.forces(reference, is_consumer))
    }
}

/// Assign a binary status to every package node
///
/// # Errors
///
/// Returns the first error a package source reports.
pub(crate) fn analyze(
    graph: &mut Graph,
    sources: &Sources,
    policy: &BuildPolicy,
    update: bool,
    emitter: &Emitter<'_>,
) -> Result<(), Error> {
    let ids: Vec<NodeId> = graph.nodes().map(|node| node.id()).collect();
    for id in ids {
        let node = graph.node(id);
        let (Some(reference), Some(package_id)) = (node.reference(), node.package_id()) else {
            continue;
        };
        let consumer = node.is_consumer();
        let invalid = node.info().and_then(|info| info.invalid_reason()).is_some();

        let (status, candidate) = if invalid {
            (BinaryStatus::Invalid, None)
        } else if policy.forces(reference, consumer) {
            (BinaryStatus::Build, None)
        } else {
            match sources.find_binary(reference, package_id, update)? {
                Some(candidate) if candidate.source.is_cache() => {
                    (BinaryStatus::Cache, Some(candidate))
                }
                Some(candidate) => (BinaryStatus::Download, Some(candidate)),
                None if policy.builds_missing(reference, consumer) => (BinaryStatus::Build, None),
                None => (BinaryStatus::Missing, None),
            }
        };
        debug!(
            reference = %reference,
            package_id = %package_id,
            status = %status,
            "binary analyzed"
        );
        emitter.emit_resolver(ResolverEvent::binary_analyzed(
            reference.to_string(),
            package_id.to_string(),
            status.as_str(),
        ));

        let node = graph.node_mut(id);
        node.binary = status;
        node.binary_candidate = candidate;
    }
    mark_skipped(graph);
    Ok(())
}

/// Mark nodes nothing needs as `Skip`
///
/// Everything the consumer requires is needed. A node that will be built
/// needs all its dependencies; any other node only needs its regular host
/// dependencies, never its build tools or test requirements.
fn mark_skipped(graph: &mut Graph) {
    let mut needed = vec![false; graph.len() + 1];
    let mut queue = VecDeque::from([Graph::ROOT]);
    needed[Graph::ROOT.index()] = true;

    while let Some(id) = queue.pop_front() {
        let node = graph.node(id);
        let builds = node.is_root() || node.binary() == BinaryStatus::Build;
        for edge in node.edges() {
            let runtime = !edge.requirement.build && !edge.requirement.test;
            if (builds || runtime) && !needed[edge.target.index()] {
                needed[edge.target.index()] = true;
                queue.push_back(edge.target);
            }
        }
    }

    let unneeded: Vec<NodeId> = graph
        .nodes()
        .map(crate::graph::Node::id)
        .filter(|id| !needed[id.index()])
        .collect();
    for id in unneeded {
        graph.node_mut(id).binary = BinaryStatus::Skip;
    }
}

/// Fail on binaries that cannot be obtained
///
/// # Errors
///
/// Returns `GraphError::InvalidConfiguration` for the first invalid node,
/// otherwise `GraphError::MissingBinaries` listing every missing one.
pub(crate) fn check(graph: &Graph) -> Result<(), GraphError> {
    if let Some(node) = graph.nodes().find(|n| n.binary() == BinaryStatus::Invalid) {
        let reason = node
            .info()
            .and_then(|info| info.invalid_reason())
            .unwrap_or_default()
            .to_string();
        return Err(GraphError::InvalidConfiguration {
            reference: node.label(),
            reason,
        });
    }

    let mut packages: Vec<String> = graph
        .nodes()
        .filter(|node| node.binary() == BinaryStatus::Missing)
        .map(|node| {
            let reference = node.reference().map(ToString::to_string).unwrap_or_default();
            let package_id = node.package_id().map(ToString::to_string).unwrap_or_default();
            format!("{reference}:{package_id}")
        })
        .collect();
    if packages.is_empty() {
        return Ok(());
    }
    packages.sort();
    packages.dedup();
    Err(GraphError::MissingBinaries { packages })
}
