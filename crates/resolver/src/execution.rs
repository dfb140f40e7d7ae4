//! Execution plan for acting on a build order in parallel

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::build_order::BuildOrder;
use crate::graph::{BinaryStatus, Graph, NodeId};

/// Metadata for parallel execution
#[derive(Debug)]
pub struct NodeMeta {
    /// Binary status the node was planned with
    pub binary: BinaryStatus,
    /// Number of unfinished dependencies
    pub in_degree: AtomicUsize,
    /// Nodes that depend on this one
    pub parents: Vec<NodeId>,
}

impl NodeMeta {
    #[must_use]
    pub fn new(binary: BinaryStatus, in_degree: usize) -> Self {
        Self {
            binary,
            in_degree: AtomicUsize::new(in_degree),
            parents: Vec::new(),
        }
    }

    /// Decrement in-degree and return new value
    pub fn decrement_in_degree(&self) -> usize {
        self.in_degree
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1)
    }

    #[must_use]
    pub fn in_degree(&self) -> usize {
        self.in_degree.load(Ordering::SeqCst)
    }
}

/// Build order levels plus atomic readiness tracking
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    /// Execution batches (can run in parallel within each batch)
    batches: Vec<Vec<NodeId>>,
    metadata: HashMap<NodeId, Arc<NodeMeta>>,
}

impl ExecutionPlan {
    #[must_use]
    pub fn new(order: &BuildOrder, graph: &Graph) -> Self {
        let mut metas: HashMap<NodeId, NodeMeta> = HashMap::new();
        for id in order.iter() {
            let node = graph.node(id);
            let mut deps: Vec<NodeId> = node
                .edges()
                .iter()
                .map(|edge| edge.target)
                .filter(|target| *target != Graph::ROOT)
                .collect();
            deps.sort();
            deps.dedup();
            metas.insert(id, NodeMeta::new(node.binary(), deps.len()));
        }

        for id in order.iter() {
            let mut targets: Vec<NodeId> =
                graph.node(id).edges().iter().map(|edge| edge.target).collect();
            targets.sort();
            targets.dedup();
            for target in targets {
                if let Some(meta) = metas.get_mut(&target) {
                    meta.parents.push(id);
                }
            }
        }

        Self {
            batches: order.levels().to_vec(),
            metadata: metas
                .into_iter()
                .map(|(id, meta)| (id, Arc::new(meta)))
                .collect(),
        }
    }

    #[must_use]
    pub fn batches(&self) -> &[Vec<NodeId>] {
        &self.batches
    }

    #[must_use]
    pub fn metadata(&self, id: NodeId) -> Option<&Arc<NodeMeta>> {
        self.metadata.get(&id)
    }

    /// Nodes with no unfinished dependency
    #[must_use]
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        let mut ready: Vec<NodeId> = self
            .metadata
            .iter()
            .filter(|(_, meta)| meta.in_degree() == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort();
        ready
    }

    /// Mark a node finished and get the nodes it unblocked
    #[must_use]
    pub fn complete_node(&self, id: NodeId) -> Vec<NodeId> {
        let Some(meta) = self.metadata.get(&id) else {
            return Vec::new();
        };

        let mut newly_ready = Vec::new();
        for parent in &meta.parents {
            if let Some(parent_meta) = self.metadata.get(parent) {
                if parent_meta.decrement_in_degree() == 0 {
                    newly_ready.push(*parent);
                }
            }
        }
        newly_ready
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.metadata.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.metadata.values().all(|meta| meta.in_degree() == 0)
    }
}

/// Execution statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub total_nodes: usize,
    pub to_build: usize,
    pub to_download: usize,
    pub cached: usize,
    pub skipped: usize,
    pub batch_count: usize,
    pub max_batch_size: usize,
}

impl ExecutionStats {
    #[must_use]
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        let mut stats = Self {
            total_nodes: plan.node_count(),
            batch_count: plan.batches().len(),
            max_batch_size: plan.batches().iter().map(Vec::len).max().unwrap_or(0),
            ..Default::default()
        };

        for meta in plan.metadata.values() {
            match meta.binary {
                BinaryStatus::Build => stats.to_build += 1,
                BinaryStatus::Download => stats.to_download += 1,
                BinaryStatus::Cache => stats.cached += 1,
                BinaryStatus::Skip => stats.skipped += 1,
                BinaryStatus::Unknown | BinaryStatus::Missing | BinaryStatus::Invalid => {}
            }
        }

        stats
    }
}
