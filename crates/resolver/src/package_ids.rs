//! Package id computation over a built graph

use kiln_errors::PackageIdError;
use kiln_events::{EventEmitter, NodeOutput, ResolverEvent};
use kiln_package_id::{
    Dependency, DependencyKind, PackageIdEngine, PackageIdInput, EMPTY_PACKAGE_ID,
};
use kiln_types::{Conf, Context, PackageId};
use std::collections::HashSet;

use crate::build_order::BuildOrder;
use crate::graph::{Graph, NodeId};
use crate::recipe::{HookPhase, RecipeContext};
use crate::Emitter;

/// Host dependencies reached through visible regular edges below `id`
fn transitive_host(graph: &Graph, id: NodeId, into: &mut Vec<NodeId>) {
    let mut stack = vec![id];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        for edge in graph.node(current).edges() {
            let requirement = &edge.requirement;
            if requirement.propagates() && !requirement.test {
                into.push(edge.target);
                stack.push(edge.target);
            }
        }
    }
}

fn dependency(
    graph: &Graph,
    owner: NodeId,
    target: NodeId,
    kind: DependencyKind,
    requirement_mode: Option<kiln_types::PackageIdMode>,
) -> Result<Dependency, PackageIdError> {
    let node = graph.node(target);
    let (Some(reference), Some(package_id)) = (node.reference(), node.package_id()) else {
        return Err(PackageIdError::DependencyNotComputed {
            reference: graph.node(owner).label(),
            dependency: node.label(),
        });
    };
    Ok(Dependency {
        kind,
        reference: reference.clone(),
        package_id: package_id.clone(),
        requirement_mode,
        declared_mode: node.recipe().and_then(|recipe| recipe.package_id_mode()),
    })
}

/// Everything the node's id depends on, direct requirements first
fn dependencies(graph: &Graph, id: NodeId) -> Result<Vec<Dependency>, PackageIdError> {
    let node = graph.node(id);
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut indirect = Vec::new();

    for edge in node.edges() {
        let requirement = &edge.requirement;
        if requirement.test {
            continue;
        }
        let kind = if requirement.build {
            DependencyKind::BuildRequires
        } else {
            DependencyKind::Requires
        };
        if seen.insert((kind, graph.node(edge.target).name().to_string())) {
            found.push(dependency(
                graph,
                id,
                edge.target,
                kind,
                requirement.package_id_mode,
            )?);
        }
        if !requirement.build {
            transitive_host(graph, edge.target, &mut indirect);
        }
    }

    for target in indirect {
        let key = (DependencyKind::Requires, graph.node(target).name().to_string());
        if seen.insert(key) {
            found.push(dependency(graph, id, target, DependencyKind::Requires, None)?);
        }
    }

    for reference in node.python_requires() {
        found.push(Dependency {
            kind: DependencyKind::PythonRequires,
            reference: reference.clone(),
            package_id: PackageId::new(EMPTY_PACKAGE_ID),
            requirement_mode: None,
            declared_mode: None,
        });
    }
    Ok(found)
}

/// Compute and store a package id for every node, dependencies first
///
/// `validate` runs after the id is known; a rejection marks the info
/// invalid without changing the id.
///
/// # Errors
///
/// Returns the first hook failure, or `DependencyNotComputed` if the order
/// places a node before one of its dependencies.
pub(crate) fn compute(
    graph: &mut Graph,
    order: &BuildOrder,
    engine: &PackageIdEngine,
    host_conf: &Conf,
    build_conf: &Conf,
    emitter: &Emitter<'_>,
) -> Result<(), PackageIdError> {
    for id in order.iter() {
        let dependencies = dependencies(graph, id)?;
        let node = graph.node(id);
        let (Some(reference), Some(recipe)) = (node.reference(), node.recipe()) else {
            continue;
        };
        let conf = match node.context() {
            Context::Host => host_conf,
            Context::Build => build_conf,
        };
        let output = NodeOutput::new(node.label(), emitter.event_sender().cloned());
        let input = PackageIdInput {
            reference,
            config: node.config(),
            dependencies,
            conf,
            header_only: recipe.header_only(),
        };

        let ctx = RecipeContext::new(reference, node.config(), HookPhase::PackageId, &output);
        let mut computed = engine.compute(&input, |info| recipe.package_id(info, &ctx))?;

        let ctx = RecipeContext::new(reference, node.config(), HookPhase::Validate, &output);
        if let Err(reason) = recipe.validate(&ctx) {
            output.warn(format!("invalid configuration: {reason}"));
            computed.info.invalidate(reason);
        }

        emitter.emit_resolver(ResolverEvent::PackageIdComputed {
            reference: reference.to_string(),
            package_id: computed.package_id.to_string(),
        });

        let node = graph.node_mut(id);
        node.package_id = Some(computed.package_id);
        node.info = Some(computed.info);
    }
    Ok(())
}
