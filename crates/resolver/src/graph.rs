//! Resolved dependency graph
//!
//! Nodes live in an arena addressed by [`NodeId`]; index 0 is the synthetic
//! consumer the root requirements hang off.

use kiln_index::BinaryCandidate;
use kiln_package_id::{PackageIdInfo, ResolvedConfig};
use kiln_types::{Context, PackageId, RecipeReference};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::recipe::{CppInfo, Recipe};
use crate::requirement::Requirement;

/// Label of the synthetic consumer in paths and reports
pub const CONSUMER_LABEL: &str = "consumer";

/// Node handle, valid for the graph that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What has to happen to get a node's binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryStatus {
    /// Not analyzed yet
    Unknown,
    /// Already in the local cache
    Cache,
    /// Offered by a remote
    Download,
    /// Must be built from source
    Build,
    /// Nowhere to be found and not allowed to build
    Missing,
    /// The recipe rejects this configuration
    Invalid,
    /// Not needed by anything that will be built or consumed
    Skip,
}

impl BinaryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Cache => "cache",
            Self::Download => "download",
            Self::Build => "build",
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for BinaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing edge of a node
#[derive(Debug, Clone)]
pub struct Edge {
    pub target: NodeId,
    pub requirement: Requirement,
}

/// A requirement as seen from one node while the graph grows
///
/// `target` is `None` for override declarations nobody has resolved yet.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub requirement: Requirement,
    pub target: Option<NodeId>,
    pub declarer: NodeId,
}

/// A resolved package
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) reference: Option<RecipeReference>,
    pub(crate) recipe: Option<Arc<dyn Recipe>>,
    pub(crate) context: Context,
    pub(crate) config: ResolvedConfig,
    pub(crate) edges: Vec<Edge>,
    /// Node and edge index that created this node
    pub(crate) parent: Option<(NodeId, usize)>,
    pub(crate) downstream: BTreeMap<(String, bool), Entry>,
    pub(crate) origin: String,
    pub(crate) consumer: bool,
    pub(crate) test: bool,
    pub(crate) python_requires: Vec<RecipeReference>,
    pub(crate) package_id: Option<PackageId>,
    pub(crate) info: Option<PackageIdInfo>,
    pub(crate) binary: BinaryStatus,
    pub(crate) binary_candidate: Option<BinaryCandidate>,
}

impl Node {
    fn root() -> Self {
        Self {
            id: Graph::ROOT,
            reference: None,
            recipe: None,
            context: Context::Host,
            config: ResolvedConfig::default(),
            edges: Vec::new(),
            parent: None,
            downstream: BTreeMap::new(),
            origin: String::new(),
            consumer: false,
            test: false,
            python_requires: Vec::new(),
            package_id: None,
            info: None,
            binary: BinaryStatus::Unknown,
            binary_candidate: None,
        }
    }

    pub(crate) fn package(
        reference: RecipeReference,
        recipe: Arc<dyn Recipe>,
        context: Context,
        config: ResolvedConfig,
    ) -> Self {
        Self {
            reference: Some(reference),
            recipe: Some(recipe),
            context,
            config,
            ..Self::root()
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.reference.is_none()
    }

    /// Resolved reference with revision, `None` for the consumer
    #[must_use]
    pub fn reference(&self) -> Option<&RecipeReference> {
        self.reference.as_ref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.reference
            .as_ref()
            .map_or(CONSUMER_LABEL, |reference| reference.name.as_str())
    }

    /// Short text used in paths and reports
    #[must_use]
    pub fn label(&self) -> String {
        self.reference
            .as_ref()
            .map_or_else(|| CONSUMER_LABEL.to_string(), RecipeReference::display_without_revision)
    }

    #[must_use]
    pub fn recipe(&self) -> Option<&Arc<dyn Recipe>> {
        self.recipe.as_ref()
    }

    #[must_use]
    pub fn context(&self) -> Context {
        self.context
    }

    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Where the node was resolved from: `cache`, a remote, or `lockfile`
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether profile patterns written as `&` apply to this node
    #[must_use]
    pub fn is_consumer(&self) -> bool {
        self.consumer
    }

    /// Only reachable through test requirements
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.test
    }

    #[must_use]
    pub fn python_requires(&self) -> &[RecipeReference] {
        &self.python_requires
    }

    #[must_use]
    pub fn package_id(&self) -> Option<&PackageId> {
        self.package_id.as_ref()
    }

    /// Info snapshot the package id was computed from
    #[must_use]
    pub fn info(&self) -> Option<&PackageIdInfo> {
        self.info.as_ref()
    }

    #[must_use]
    pub fn binary(&self) -> BinaryStatus {
        self.binary
    }

    /// Where a `Download` binary comes from
    #[must_use]
    pub fn binary_candidate(&self) -> Option<&BinaryCandidate> {
        self.binary_candidate.as_ref()
    }

    #[must_use]
    pub fn binary_remote(&self) -> Option<&str> {
        self.binary_candidate
            .as_ref()
            .and_then(|candidate| candidate.source.remote())
    }

    #[must_use]
    pub fn cpp_info(&self) -> CppInfo {
        self.recipe
            .as_ref()
            .map(|recipe| recipe.cpp_info())
            .unwrap_or_default()
    }
}

/// Arena of resolved nodes
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub const ROOT: NodeId = NodeId(0);

    /// Graph holding only the consumer
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::root()],
        }
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Every package node, consumer excluded, in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().skip(1)
    }

    /// Package nodes with the given name
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes().filter(move |node| node.name() == name)
    }

    /// Number of package nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Connect two nodes, folding a repeated edge into the existing one
    ///
    /// Returns the index of the edge in `from`'s edge list.
    pub(crate) fn add_edge(&mut self, from: NodeId, to: NodeId, requirement: Requirement) -> usize {
        let edges = &mut self.node_mut(from).edges;
        if let Some(index) = edges.iter().position(|edge| {
            edge.target == to && edge.requirement.key() == requirement.key()
        }) {
            let merged = Requirement::merge(&edges[index].requirement, &requirement);
            edges[index].requirement = merged;
            return index;
        }
        edges.push(Edge {
            target: to,
            requirement,
        });
        edges.len() - 1
    }

    /// Nodes with an edge into `id`
    #[must_use]
    pub fn dependants(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.edges.iter().any(|edge| edge.target == id))
            .map(|node| node.id)
            .collect()
    }

    /// Labels from the consumer down to `id` along creating edges
    #[must_use]
    pub fn path_to(&self, id: NodeId) -> Vec<String> {
        let mut path = vec![self.node(id).label()];
        let mut current = id;
        while let Some((parent, _)) = self.node(current).parent {
            path.push(self.node(parent).label());
            current = parent;
        }
        path.reverse();
        path
    }

    /// Whether `to` is reachable from `from` along any edges
    #[must_use]
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if std::mem::replace(&mut visited[current.0], true) {
                continue;
            }
            stack.extend(self.node(current).edges.iter().map(|edge| edge.target));
        }
        false
    }

    /// Check for cycles using DFS
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut on_stack = vec![false; self.nodes.len()];

        (0..self.nodes.len())
            .any(|i| !visited[i] && self.has_cycle_util(NodeId(i), &mut visited, &mut on_stack))
    }

    fn has_cycle_util(&self, id: NodeId, visited: &mut [bool], on_stack: &mut [bool]) -> bool {
        visited[id.0] = true;
        on_stack[id.0] = true;

        for edge in &self.node(id).edges {
            let next = edge.target.0;
            if on_stack[next] {
                return true;
            }
            if !visited[next] && self.has_cycle_util(edge.target, visited, on_stack) {
                return true;
            }
        }

        on_stack[id.0] = false;
        false
    }
}
