//! Breadth-first graph expansion
//!
//! Every node keeps a table of the dependencies visible from it, keyed by
//! `(name, build)`. A new requirement first looks for an existing entry,
//! starting at the requiring node and walking towards the consumer along
//! visible host edges; the entry closest to the consumer wins. Only when
//! nothing is found is a new node resolved and created.

use kiln_config::ProfileStack;
use kiln_errors::{ConfigError, Error, GraphError};
use kiln_events::{EventEmitter, NodeOutput, ResolverEvent};
use kiln_index::{SourceId, Sources};
use kiln_package_id::ResolvedConfig;
use kiln_types::{Context, PackageSpec, RecipeReference};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::graph::{Entry, Graph, Node, NodeId};
use crate::lockfile::Lockfile;
use crate::recipe::{HookPhase, Recipe, RecipeContext, RecipeLoader};
use crate::requirement::Requirement;
use crate::Emitter;

/// Requirements whose version was replaced by an override or a forced
/// requirement, keyed by the original spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OverridesReport(BTreeMap<String, BTreeSet<String>>);

impl OverridesReport {
    pub(crate) fn record(&mut self, original: &PackageSpec, replacement: &PackageSpec) {
        self.0
            .entry(original.to_string())
            .or_default()
            .insert(replacement.to_string());
    }

    /// Replacements recorded for an original spec such as `zlib/1.2`
    #[must_use]
    pub fn get(&self, original: &str) -> Option<&BTreeSet<String>> {
        self.0.get(original)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn hook_error(reference: &RecipeReference, hook: &str, err: &Error) -> Error {
    GraphError::RecipeHook {
        reference: reference.display_without_revision(),
        hook: hook.to_string(),
        message: err.to_string(),
    }
    .into()
}

fn origin_of(source: &SourceId) -> String {
    match source {
        SourceId::Cache => "cache".to_string(),
        SourceId::Remote(name) => format!("remote:{name}"),
    }
}

/// Expands root requirements into a graph
pub(crate) struct GraphBuilder<'a> {
    pub sources: &'a Sources,
    pub loader: &'a dyn RecipeLoader,
    pub host: &'a ProfileStack,
    pub build: &'a ProfileStack,
    pub lockfile: Option<&'a Lockfile>,
    pub update: bool,
    pub resolve_prereleases: bool,
    pub cross_context_conflicts: bool,
    pub emitter: &'a Emitter<'a>,
}

type Queue = VecDeque<(NodeId, Requirement)>;

impl GraphBuilder<'_> {
    /// # Errors
    ///
    /// Returns the first resolution failure; no partial graph is kept.
    pub fn build(
        &self,
        requires: &[Requirement],
        tool_requires: &[Requirement],
    ) -> Result<(Graph, OverridesReport), Error> {
        let mut graph = Graph::new();
        let mut overrides = OverridesReport::default();
        let mut queue = Queue::new();

        let tools = tool_requires.iter().cloned().map(|mut requirement| {
            requirement.build = true;
            requirement.visible = false;
            requirement
        });
        Self::enqueue(
            &mut graph,
            &mut queue,
            Graph::ROOT,
            requires.iter().cloned().chain(tools),
        );

        while let Some((parent, requirement)) = queue.pop_front() {
            self.expand(&mut graph, &mut queue, &mut overrides, parent, requirement)?;
        }
        Ok((graph, overrides))
    }

    /// Queue a node's requirements; override declarations go straight into
    /// its table and never become edges
    fn enqueue(
        graph: &mut Graph,
        queue: &mut Queue,
        owner: NodeId,
        requirements: impl IntoIterator<Item = Requirement>,
    ) {
        for mut requirement in requirements {
            requirement.direct = owner == Graph::ROOT;
            if requirement.is_override {
                graph.node_mut(owner).downstream.insert(
                    requirement.key(),
                    Entry {
                        requirement,
                        target: None,
                        declarer: owner,
                    },
                );
            } else {
                queue.push_back((owner, requirement));
            }
        }
    }

    fn expand(
        &self,
        graph: &mut Graph,
        queue: &mut Queue,
        overrides: &mut OverridesReport,
        parent: NodeId,
        mut requirement: Requirement,
    ) -> Result<(), Error> {
        let context = requirement.target_context(graph.node(parent).context());
        Self::check_loop(graph, parent, &requirement, context)?;

        if let Some(found) = Self::lookup(graph, parent, &requirement) {
            let replaces = found.requirement.is_override || found.requirement.force;
            if replaces && found.requirement.spec != requirement.spec {
                debug!(
                    original = %requirement.spec,
                    replacement = %found.requirement.spec,
                    "requirement overridden"
                );
                overrides.record(&requirement.spec, &found.requirement.spec);
                self.emitter.emit_resolver(ResolverEvent::Overridden {
                    original: requirement.spec.to_string(),
                    replacement: found.requirement.spec.to_string(),
                });
                requirement.spec = found.requirement.spec.clone();
            }
            if let Some(target) = found.target {
                return self.link(graph, parent, target, found.declarer, requirement);
            }
        }

        if self.cross_context_conflicts {
            self.check_cross_context(graph, parent, &requirement)?;
        }
        let id = self.create(graph, parent, requirement, context)?;
        self.expand_node(graph, queue, id)
    }

    fn check_loop(
        graph: &Graph,
        parent: NodeId,
        requirement: &Requirement,
        context: Context,
    ) -> Result<(), GraphError> {
        let mut current = Some(parent);
        while let Some(id) = current {
            let node = graph.node(id);
            if !node.is_root() && node.name() == requirement.name() && node.context() == context {
                let mut chain = graph.path_to(parent);
                chain.push(requirement.spec.to_string());
                return Err(GraphError::Loop {
                    reference: requirement.spec.to_string(),
                    chain,
                });
            }
            current = node.parent.map(|(down, _)| down);
        }
        Ok(())
    }

    /// Entry for the requirement closest to the consumer
    fn lookup(graph: &Graph, parent: NodeId, requirement: &Requirement) -> Option<Entry> {
        let key = requirement.key();
        let mut found = None;
        let mut current = parent;
        loop {
            let node = graph.node(current);
            if let Some(entry) = node.downstream.get(&key) {
                found = Some(entry.clone());
            }
            if !requirement.propagates() {
                break;
            }
            let Some((down, edge)) = node.parent else {
                break;
            };
            if !graph.node(down).edges()[edge].requirement.propagates() {
                break;
            }
            current = down;
        }
        found
    }

    fn conflict(
        &self,
        graph: &Graph,
        parent: NodeId,
        existing: NodeId,
        declarer: NodeId,
        requirement: &Requirement,
    ) -> GraphError {
        let existing = graph.node(existing).label();
        self.emitter.emit_resolver(ResolverEvent::conflict_detected(
            requirement.name(),
            existing.clone(),
            requirement.spec.to_string(),
        ));
        GraphError::Conflict {
            name: requirement.name().to_string(),
            existing,
            existing_path: graph.path_to(declarer),
            requested: requirement.spec.to_string(),
            requested_path: graph.path_to(parent),
        }
    }

    /// Turn the requirement into an edge to an existing node
    fn link(
        &self,
        graph: &mut Graph,
        parent: NodeId,
        target: NodeId,
        declarer: NodeId,
        requirement: Requirement,
    ) -> Result<(), Error> {
        let compatible = graph
            .node(target)
            .reference()
            .is_some_and(|reference| requirement.spec.matches(reference, self.resolve_prereleases));
        if !compatible {
            return Err(self.conflict(graph, parent, target, declarer, &requirement).into());
        }
        if graph.reaches(target, parent) {
            let mut chain = graph.path_to(parent);
            chain.push(graph.node(target).label());
            return Err(GraphError::Loop {
                reference: graph.node(target).label(),
                chain,
            }
            .into());
        }

        let test = requirement.test || graph.node(parent).is_test();
        let node = graph.node_mut(target);
        node.test = node.test && test;
        graph.add_edge(parent, target, requirement.clone());
        self.propagate(graph, parent, &requirement, target)?;
        Ok(())
    }

    fn check_cross_context(
        &self,
        graph: &Graph,
        parent: NodeId,
        requirement: &Requirement,
    ) -> Result<(), GraphError> {
        let (name, build) = requirement.key();
        let Some(entry) = graph.node(parent).downstream.get(&(name, !build)) else {
            return Ok(());
        };
        let Some(target) = entry.target else {
            return Ok(());
        };
        let compatible = graph
            .node(target)
            .reference()
            .is_some_and(|reference| requirement.spec.matches(reference, self.resolve_prereleases));
        if compatible {
            return Ok(());
        }
        Err(self.conflict(graph, parent, target, entry.declarer, requirement))
    }

    /// Record the edge in the requiring node's table and, while the
    /// requirement stays visible, in the tables towards the consumer
    fn propagate(
        &self,
        graph: &mut Graph,
        from: NodeId,
        requirement: &Requirement,
        target: NodeId,
    ) -> Result<(), GraphError> {
        let key = requirement.key();
        let mut current = from;
        loop {
            let table = &mut graph.node_mut(current).downstream;
            let clash = match table.get_mut(&key) {
                None => {
                    table.insert(
                        key.clone(),
                        Entry {
                            requirement: requirement.clone(),
                            target: Some(target),
                            declarer: from,
                        },
                    );
                    None
                }
                Some(entry) => match entry.target {
                    None => {
                        entry.target = Some(target);
                        None
                    }
                    Some(existing) if existing == target => {
                        if !entry.requirement.is_override {
                            entry.requirement = Requirement::merge(&entry.requirement, requirement);
                        }
                        None
                    }
                    Some(existing) => Some((existing, entry.declarer)),
                },
            };
            if let Some((existing, declarer)) = clash {
                return Err(self.conflict(graph, from, existing, declarer, requirement));
            }

            if !requirement.propagates() {
                break;
            }
            let Some((down, edge)) = graph.node(current).parent else {
                break;
            };
            if !graph.node(down).edges()[edge].requirement.propagates() {
                break;
            }
            current = down;
        }
        Ok(())
    }

    /// Lockfile first, then the configured sources
    fn pick(
        &self,
        graph: &Graph,
        parent: NodeId,
        requirement: &Requirement,
        context: Context,
    ) -> Result<(RecipeReference, String), Error> {
        if let Some(lockfile) = self.lockfile {
            if let Some(reference) =
                lockfile.locked(requirement, context, self.resolve_prereleases)?
            {
                return Ok((reference.clone(), "lockfile".to_string()));
            }
        }

        match self
            .sources
            .select(&requirement.spec, self.update, self.resolve_prereleases)?
        {
            Some(candidate) => Ok((candidate.reference, origin_of(&candidate.source))),
            None => Err(GraphError::PackageNotFound {
                requirement: requirement.spec.to_string(),
                chain: graph.path_to(parent),
            }
            .into()),
        }
    }

    /// Bind profile settings and options, then let `configure` trim them
    fn configure(
        reference: &RecipeReference,
        recipe: &dyn Recipe,
        stack: &ProfileStack,
        consumer: bool,
        output: &NodeOutput,
    ) -> Result<ResolvedConfig, Error> {
        let mut settings = stack
            .settings_for(reference, consumer)
            .declared(&recipe.settings()[..]);

        let schema = recipe.options();
        let mut options = recipe.default_options();
        let assigned = stack.options_for(reference, consumer);
        for (name, value) in assigned.iter() {
            if !schema.declares(name) {
                debug!(reference = %reference, option = name, "ignoring undeclared option");
                output.emit_debug(format!("option '{name}' is not declared, ignored"));
                continue;
            }
            if !schema.accepts(name, value) {
                return Err(ConfigError::InvalidOption {
                    reference: reference.display_without_revision(),
                    option: name.to_string(),
                    value: value.to_string(),
                    allowed: schema.allowed(name).to_vec(),
                }
                .into());
            }
            options.set(name, value);
        }

        output.hook_started("configure");
        recipe
            .configure(&mut settings, &mut options, output)
            .map_err(|err| hook_error(reference, "configure", &err))?;
        Ok(ResolvedConfig::new(settings, options))
    }

    fn create(
        &self,
        graph: &mut Graph,
        parent: NodeId,
        requirement: Requirement,
        context: Context,
    ) -> Result<NodeId, Error> {
        let (reference, origin) = self.pick(graph, parent, &requirement, context)?;
        let recipe = self.loader.load(&reference)?;
        let consumer = parent == Graph::ROOT && !requirement.build;
        let stack = match context {
            Context::Host => self.host,
            Context::Build => self.build,
        };
        let output = NodeOutput::new(
            reference.display_without_revision(),
            self.emitter.event_sender().cloned(),
        );
        let config = Self::configure(&reference, recipe.as_ref(), stack, consumer, &output)?;

        debug!(reference = %reference, context = %context, origin = %origin, "node resolved");
        self.emitter.emit_resolver(ResolverEvent::NodeResolved {
            reference: reference.to_string(),
            context: context.to_string(),
            origin: origin.clone(),
        });
        if requirement.spec.version.is_range() {
            self.emitter.emit_resolver(ResolverEvent::RangeResolved {
                requirement: requirement.spec.to_string(),
                selected: reference.to_string(),
            });
        }

        let mut node = Node::package(reference, recipe.clone(), context, config);
        node.origin = origin;
        node.consumer = consumer;
        node.test = requirement.test || graph.node(parent).is_test();
        node.python_requires = recipe.python_requires();

        let id = graph.add_node(node);
        let edge = graph.add_edge(parent, id, requirement.clone());
        graph.node_mut(id).parent = Some((parent, edge));
        self.propagate(graph, parent, &requirement, id)?;
        Ok(id)
    }

    /// Ask the recipe for its requirements and queue them
    fn expand_node(&self, graph: &mut Graph, queue: &mut Queue, id: NodeId) -> Result<(), Error> {
        let node = graph.node(id);
        let (Some(reference), Some(recipe)) = (node.reference().cloned(), node.recipe().cloned())
        else {
            return Ok(());
        };
        let config = node.config().clone();
        let output = NodeOutput::new(node.label(), self.emitter.event_sender().cloned());
        let ctx = RecipeContext::new(&reference, &config, HookPhase::Requirements, &output);

        let requires = recipe
            .requirements(&ctx)
            .map_err(|err| hook_error(&reference, "requirements", &err))?;
        let tools = recipe
            .build_requirements(&ctx)
            .map_err(|err| hook_error(&reference, "build_requirements", &err))?
            .into_iter()
            .map(|mut requirement| {
                requirement.build = true;
                requirement.visible = false;
                requirement
            });
        let tests = recipe
            .test_requirements(&ctx)
            .map_err(|err| hook_error(&reference, "test_requirements", &err))?
            .into_iter()
            .map(|mut requirement| {
                requirement.test = true;
                requirement.visible = false;
                requirement
            });

        Self::enqueue(graph, queue, id, requires.into_iter().chain(tools).chain(tests));
        Ok(())
    }
}
