#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency graph resolution for kiln
//!
//! [`Resolver::resolve`] turns root requirements and profiles into a
//! [`ResolvedGraph`]: the graph is expanded breadth first, package ids are
//! computed in dependency order, and every node gets a binary status.
//! Resolution is synchronous and single threaded; recipes are reached
//! through the [`RecipeLoader`] and [`Recipe`] traits and packages through
//! [`kiln_index::Sources`].

mod binaries;
mod build_order;
mod builder;
mod execution;
mod graph;
mod lockfile;
mod package_ids;
mod recipe;
mod requirement;

pub use binaries::BuildPolicy;
pub use build_order::{BuildOrder, BuildOrderItem, BuildScope};
pub use builder::OverridesReport;
pub use execution::{ExecutionPlan, ExecutionStats, NodeMeta};
pub use graph::{BinaryStatus, Edge, Graph, Node, NodeId, CONSUMER_LABEL};
pub use lockfile::{LockEntry, Lockfile, LOCKFILE_VERSION};
pub use recipe::{
    CppInfo, HookPhase, MemoryLoader, Recipe, RecipeContext, RecipeDef, RecipeLoader,
};
pub use requirement::Requirement;

use kiln_config::{Config, ProfileStack};
use kiln_errors::{Error, GraphError};
use kiln_events::{EventEmitter, EventSender, FailureContext, ResolverEvent};
use kiln_index::Sources;
use kiln_package_id::{ModeDefaults, PackageIdEngine};
use kiln_types::{PackageId, SettingsSchema};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use builder::GraphBuilder;

/// Event emitter borrowed by the resolution passes
pub(crate) struct Emitter<'a>(Option<&'a EventSender>);

impl EventEmitter for Emitter<'_> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.0
    }
}

/// Input of one resolution
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub requires: Vec<Requirement>,
    pub tool_requires: Vec<Requirement>,
    pub profile_host: ProfileStack,
    pub profile_build: ProfileStack,
    pub lockfile: Option<Lockfile>,
    /// Query every source for newer candidates instead of stopping at the
    /// first one that satisfies a requirement
    pub update: bool,
    /// Falls back to the host profile's build policy when unset
    pub build_policy: Option<BuildPolicy>,
    pub settings_schema: Option<SettingsSchema>,
}

impl ResolveRequest {
    /// Request using the same profile for the host and build contexts
    #[must_use]
    pub fn new(profile_host: ProfileStack) -> Self {
        Self {
            requires: Vec::new(),
            tool_requires: Vec::new(),
            profile_build: profile_host.clone(),
            profile_host,
            lockfile: None,
            update: false,
            build_policy: None,
            settings_schema: None,
        }
    }

    #[must_use]
    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    /// Build tool of the consumer, resolved in the build context
    #[must_use]
    pub fn tool_require(mut self, requirement: Requirement) -> Self {
        self.tool_requires.push(requirement);
        self
    }

    #[must_use]
    pub fn with_profile_build(mut self, profile: ProfileStack) -> Self {
        self.profile_build = profile;
        self
    }

    #[must_use]
    pub fn with_lockfile(mut self, lockfile: Lockfile) -> Self {
        self.lockfile = Some(lockfile);
        self
    }

    #[must_use]
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    #[must_use]
    pub fn with_build_policy(mut self, policy: BuildPolicy) -> Self {
        self.build_policy = Some(policy);
        self
    }

    /// Validate both profiles against a settings schema before resolving
    #[must_use]
    pub fn with_settings_schema(mut self, schema: SettingsSchema) -> Self {
        self.settings_schema = Some(schema);
        self
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: Graph,
    overrides: OverridesReport,
    order: BuildOrder,
}

impl ResolvedGraph {
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Package nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.nodes()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.node(id)
    }

    /// Package nodes with the given name
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.graph.find(name)
    }

    #[must_use]
    pub fn overrides(&self) -> &OverridesReport {
        &self.overrides
    }

    #[must_use]
    pub fn build_order(&self) -> &BuildOrder {
        &self.order
    }

    #[must_use]
    pub fn report(&self, scope: BuildScope) -> Vec<Vec<BuildOrderItem>> {
        self.order.report(&self.graph, scope)
    }

    /// # Errors
    ///
    /// Returns `GraphError::InvalidConfiguration` or
    /// `GraphError::MissingBinaries` when some binary cannot be obtained.
    pub fn check_binaries(&self) -> Result<(), GraphError> {
        binaries::check(&self.graph)
    }

    #[must_use]
    pub fn cpp_info(&self, id: NodeId) -> CppInfo {
        self.graph.node(id).cpp_info()
    }

    #[must_use]
    pub fn package_id(&self, id: NodeId) -> Option<&PackageId> {
        self.graph.node(id).package_id()
    }

    #[must_use]
    pub fn binary(&self, id: NodeId) -> BinaryStatus {
        self.graph.node(id).binary()
    }

    #[must_use]
    pub fn execution_plan(&self) -> ExecutionPlan {
        ExecutionPlan::new(&self.order, &self.graph)
    }

    /// Lockfile pinning every resolved recipe revision
    #[must_use]
    pub fn lockfile(&self) -> Lockfile {
        Lockfile::from_graph(&self.graph)
    }
}

/// Dependency resolver
#[derive(Clone)]
pub struct Resolver {
    sources: Sources,
    loader: Arc<dyn RecipeLoader>,
    update: bool,
    resolve_prereleases: bool,
    cross_context_conflicts: bool,
    mode_defaults: ModeDefaults,
    event_sender: Option<EventSender>,
}

impl Resolver {
    #[must_use]
    pub fn new(sources: Sources, loader: Arc<dyn RecipeLoader>) -> Self {
        Self {
            sources,
            loader,
            update: false,
            resolve_prereleases: false,
            cross_context_conflicts: false,
            mode_defaults: ModeDefaults::default(),
            event_sender: None,
        }
    }

    /// Apply the `[resolver]` and `[package_id]` configuration sections
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.update = config.resolver.update;
        self.resolve_prereleases = config.resolver.resolve_prereleases;
        self.cross_context_conflicts = config.resolver.cross_context_conflicts;
        self.mode_defaults = ModeDefaults {
            requires: config.package_id.default_requires_mode,
            build_requires: config.package_id.default_build_mode,
            python_requires: config.package_id.default_python_mode,
        };
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Resolve a request into a graph with package ids and binary statuses
    ///
    /// # Errors
    ///
    /// Returns the first failure: an invalid profile, an unresolvable or
    /// conflicting requirement, a lockfile mismatch, a loop, or a failing
    /// recipe hook. No partial graph is returned.
    pub fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedGraph, Error> {
        let started = Instant::now();
        let emitter = Emitter(self.event_sender.as_ref());
        emitter.emit_resolver(ResolverEvent::ResolutionStarted {
            requires: request.requires.len(),
            tool_requires: request.tool_requires.len(),
            locked: request.lockfile.is_some(),
        });

        match self.run(request, &emitter) {
            Ok(resolved) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    nodes = resolved.graph.len(),
                    levels = resolved.order.levels().len(),
                    duration_ms,
                    "resolution completed"
                );
                emitter.emit_resolver(ResolverEvent::ResolutionCompleted {
                    nodes: resolved.graph.len(),
                    levels: resolved.order.levels().len(),
                    duration_ms,
                });
                Ok(resolved)
            }
            Err(err) => {
                emitter.emit_resolver(ResolverEvent::ResolutionFailed {
                    failure: FailureContext::from_error(&err),
                });
                Err(err)
            }
        }
    }

    fn run(&self, request: &ResolveRequest, emitter: &Emitter<'_>) -> Result<ResolvedGraph, Error> {
        if let Some(schema) = &request.settings_schema {
            request.profile_host.validate(schema)?;
            request.profile_build.validate(schema)?;
        }
        let policy = match &request.build_policy {
            Some(policy) => policy.clone(),
            None => BuildPolicy::parse(request.profile_host.build_policy())?,
        };
        let update = request.update || self.update;

        let builder = GraphBuilder {
            sources: &self.sources,
            loader: self.loader.as_ref(),
            host: &request.profile_host,
            build: &request.profile_build,
            lockfile: request.lockfile.as_ref(),
            update,
            resolve_prereleases: self.resolve_prereleases,
            cross_context_conflicts: self.cross_context_conflicts,
            emitter,
        };
        let (mut graph, overrides) = builder.build(&request.requires, &request.tool_requires)?;
        debug!(nodes = graph.len(), overrides = overrides.len(), "graph expanded");

        let order = BuildOrder::compute(&graph)?;
        let engine = PackageIdEngine::new(self.mode_defaults);
        package_ids::compute(
            &mut graph,
            &order,
            &engine,
            &request.profile_host.conf(),
            &request.profile_build.conf(),
            emitter,
        )?;
        binaries::analyze(&mut graph, &self.sources, &policy, update, emitter)?;

        Ok(ResolvedGraph {
            graph,
            overrides,
            order,
        })
    }
}

impl EventEmitter for Resolver {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}
