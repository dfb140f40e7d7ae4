//! Level-by-level build order over a resolved graph

use kiln_errors::GraphError;
use kiln_types::{Context, PackageId, RecipeReference};
use serde::Serialize;
use std::collections::HashSet;

use crate::graph::{BinaryStatus, Graph, NodeId};

/// Which nodes a build order report lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildScope {
    /// Only nodes that have to be built
    #[default]
    OnlyMissing,
    /// Every node, whatever its binary status
    All,
}

/// One package in a build order report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOrderItem {
    pub reference: RecipeReference,
    pub package_id: Option<PackageId>,
    pub context: Context,
    pub binary: BinaryStatus,
    /// `name/*:option=value` assignments that reproduce this binary
    pub options_needed_to_rebuild: Vec<String>,
}

/// Dependencies before dependants, split into levels
///
/// Every package node appears in exactly one level and only depends on
/// nodes of earlier levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOrder {
    levels: Vec<Vec<NodeId>>,
}

impl BuildOrder {
    /// Peel off nodes whose dependencies are all placed
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InternalCycle` naming the nodes left over when
    /// no node can be placed.
    pub fn compute(graph: &Graph) -> Result<Self, GraphError> {
        let mut pending: Vec<(NodeId, HashSet<NodeId>)> = graph
            .nodes()
            .map(|node| {
                let deps = node
                    .edges()
                    .iter()
                    .map(|edge| edge.target)
                    .filter(|target| *target != Graph::ROOT)
                    .collect();
                (node.id(), deps)
            })
            .collect();

        let mut levels = Vec::new();
        let mut placed = HashSet::new();
        while !pending.is_empty() {
            let (ready, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|(_, deps)| deps.iter().all(|dep| placed.contains(dep)));

            if ready.is_empty() {
                let mut nodes: Vec<String> =
                    rest.iter().map(|(id, _)| graph.node(*id).label()).collect();
                nodes.sort();
                return Err(GraphError::InternalCycle { nodes });
            }

            let mut level: Vec<NodeId> = ready.into_iter().map(|(id, _)| id).collect();
            level.sort();
            placed.extend(level.iter().copied());
            levels.push(level);
            pending = rest;
        }

        Ok(Self { levels })
    }

    #[must_use]
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    /// Nodes in dependency order
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.levels.iter().flatten().copied()
    }

    /// Level a node was placed in
    #[must_use]
    pub fn level_of(&self, id: NodeId) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(&id))
    }

    /// Actionable levels for reporting
    ///
    /// Nodes reached more than once as private copies of the same binary
    /// are listed once. Items within a level are sorted and empty levels
    /// are dropped.
    #[must_use]
    pub fn report(&self, graph: &Graph, scope: BuildScope) -> Vec<Vec<BuildOrderItem>> {
        let mut seen = HashSet::new();
        let mut report = Vec::new();
        for level in &self.levels {
            let mut items = Vec::new();
            for id in level {
                let node = graph.node(*id);
                let Some(reference) = node.reference() else {
                    continue;
                };
                let wanted = match scope {
                    BuildScope::All => true,
                    BuildScope::OnlyMissing => {
                        matches!(node.binary(), BinaryStatus::Build | BinaryStatus::Missing)
                    }
                };
                if !wanted {
                    continue;
                }
                let key = (reference.to_string(), node.package_id().cloned());
                if !seen.insert(key) {
                    continue;
                }
                items.push(BuildOrderItem {
                    reference: reference.clone(),
                    package_id: node.package_id().cloned(),
                    context: node.context(),
                    binary: node.binary(),
                    options_needed_to_rebuild: node
                        .config()
                        .options()
                        .as_assignments(&reference.name),
                });
            }
            if !items.is_empty() {
                items.sort_by(|a, b| {
                    (a.reference.to_string(), &a.package_id, a.context)
                        .cmp(&(b.reference.to_string(), &b.package_id, b.context))
                });
                report.push(items);
            }
        }
        report
    }
}
