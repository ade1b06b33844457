//! Shared state of one optimizer run.
//!
//! The [`CompilationContext`] owns everything that outlives a single pass: the
//! graphs being optimized, the structure registry, the profiling oracle, the
//! process-wide watchpoint table and the event log. It is `Send + Sync`; passes
//! receive it by shared reference while they own the graph they work on.

use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::{
        structure::{PropertyOffset, StructureAbstractValue},
        FrozenValue, Value,
    },
    compiler::{
        events::{EventKind, EventLog, PipelineStats},
        oracle::{ProfilingOracle, StructureOracle},
        registry::{Registrar, StructureRegistry},
        watchpoints::{DesiredWatchpoints, Watchpoint, WatchpointTable, WatchpointToken},
        OptimizerConfig,
    },
    graph::Graph,
};

/// Handle of a graph registered with a [`CompilationContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub usize);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// State shared by every pass of an optimizer run.
///
/// All collections are concurrent so that independent graphs can be optimized on
/// different threads.
pub struct CompilationContext {
    /// Graphs being optimized. The scheduler removes a graph while a pass runs on
    /// it and reinserts it afterwards.
    pub graphs: DashMap<GraphId, Graph>,

    /// Structures, their property tables, transitions and known cells.
    pub registry: StructureRegistry,

    /// The process-wide watchpoint table.
    pub watchpoint_table: WatchpointTable,

    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Switches consulted by the passes.
    pub config: OptimizerConfig,

    /// Graphs whose watchpoints were registered.
    pub finished_graphs: DashSet<GraphId>,

    oracle: Box<dyn ProfilingOracle>,
    next_graph: AtomicUsize,
    start_time: Instant,
}

impl CompilationContext {
    /// Creates a context answering property-access queries from its own registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_oracle(Box::new(StructureOracle))
    }

    /// Creates a context with a custom profiling oracle.
    #[must_use]
    pub fn with_oracle(oracle: Box<dyn ProfilingOracle>) -> Self {
        Self {
            graphs: DashMap::new(),
            registry: StructureRegistry::new(),
            watchpoint_table: WatchpointTable::new(),
            events: EventLog::new(),
            config: OptimizerConfig::default(),
            finished_graphs: DashSet::new(),
            oracle,
            next_graph: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Replaces the pass configuration.
    #[must_use]
    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    // ── Graphs ──────────────────────────────────────────────────────────

    /// Registers a graph for optimization.
    pub fn add_graph(&self, graph: Graph) -> GraphId {
        let id = GraphId(self.next_graph.fetch_add(1, Ordering::Relaxed));
        self.graphs.insert(id, graph);
        id
    }

    /// Removes a graph from the context and returns it.
    pub fn take_graph(&self, id: GraphId) -> Option<Graph> {
        self.graphs.remove(&id).map(|(_, graph)| graph)
    }

    /// Runs `f` on a registered graph.
    pub fn with_graph<R>(&self, id: GraphId, f: impl FnOnce(&Graph) -> R) -> Option<R> {
        self.graphs.get(&id).map(|graph| f(&graph))
    }

    /// Ids of all registered graphs, sorted.
    #[must_use]
    pub fn graph_ids(&self) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self.graphs.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Totals of everything recorded so far, for a pipeline that ran `iterations`
    /// times.
    #[must_use]
    pub fn stats(&self, iterations: usize) -> PipelineStats {
        PipelineStats::from_log(&self.events)
            .with_iterations(iterations)
            .with_elapsed(self.elapsed())
    }

    // ── Structures and profiling ────────────────────────────────────────

    /// The profiling oracle.
    #[must_use]
    pub fn oracle(&self) -> &dyn ProfilingOracle {
        self.oracle.as_ref()
    }

    /// A registrar that records watchpoints into `watchpoints`.
    #[must_use]
    pub fn registrar<'a>(&'a self, watchpoints: &'a DesiredWatchpoints) -> Registrar<'a> {
        Registrar::new(&self.registry, watchpoints)
    }

    /// Freezes a value for use as a constant; cells carry their current structure.
    #[must_use]
    pub fn freeze(&self, value: Value) -> FrozenValue {
        match value {
            Value::Cell(cell) => FrozenValue {
                value,
                structure: self.registry.cell_structure(cell),
            },
            _ => FrozenValue::primitive(value),
        }
    }

    /// The value of the property at `offset` of `base`, if it can be treated as a
    /// compile-time constant.
    ///
    /// Every structure the base may have must be watchable for replacement of that
    /// property; the dependency is recorded in `watchpoints`.
    pub fn try_get_constant_property(
        &self,
        watchpoints: &DesiredWatchpoints,
        base: Option<Value>,
        structures: &StructureAbstractValue,
        offset: PropertyOffset,
    ) -> Option<Value> {
        let cell = base?.as_cell()?;
        if !structures.is_finite() || structures.is_empty() {
            return None;
        }
        for structure in structures.iter() {
            let watchpoint = Watchpoint::PropertyReplacement(structure.id, offset);
            if !self.registry.is_property_replacement_watchable(structure, offset)
                || !self.watchpoint_table.is_valid(watchpoint)
            {
                return None;
            }
        }
        let current = self.registry.cell_structure(cell)?;
        if !structures.contains(current) {
            return None;
        }
        let value = self.registry.get_direct(cell, offset)?;
        for structure in structures.iter() {
            watchpoints.add_lazily(Watchpoint::PropertyReplacement(structure.id, offset));
        }
        Some(value)
    }

    // ── Watchpoints ─────────────────────────────────────────────────────

    /// Hands the graph's desired watchpoints to the shared table.
    ///
    /// Returns `None` if one of them already fired, in which case the compilation
    /// must be discarded.
    pub fn register_watchpoints(&self, graph: &Graph) -> Option<Vec<WatchpointToken>> {
        let tokens = self.watchpoint_table.register(&graph.watchpoints);
        match &tokens {
            Some(tokens) => {
                self.events
                    .record(EventKind::WatchpointRegistered)
                    .graph(graph)
                    .message(format!("{} watchpoints", tokens.len()));
            }
            None => {
                self.events
                    .record(EventKind::Warning)
                    .graph(graph)
                    .message("a desired watchpoint already fired");
            }
        }
        tokens
    }

    /// Registers the watchpoints of every graph still in the context.
    ///
    /// Returns the ids of graphs that were invalidated.
    pub fn finish(&self) -> Vec<GraphId> {
        let mut invalidated = Vec::new();
        for id in self.graph_ids() {
            let registered = self
                .with_graph(id, |graph| self.register_watchpoints(graph).is_some())
                .unwrap_or(false);
            if registered {
                self.finished_graphs.insert(id);
            } else {
                invalidated.push(id);
            }
        }
        invalidated
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompilationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationContext")
            .field("graphs", &self.graphs.len())
            .field("structures", &self.registry.structure_count())
            .field("events", &self.events.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{structure::PropertyId, CellKind},
        graph::{IndexingShape, IndexingType},
    };

    #[test]
    fn test_graphs_round_trip_through_context() {
        let ctx = CompilationContext::new();
        let mut graph = Graph::new(1, 0);
        graph.name = "f".into();
        let id = ctx.add_graph(graph);

        assert_eq!(ctx.graph_ids(), vec![id]);
        assert_eq!(ctx.with_graph(id, |g| g.name.clone()).as_deref(), Some("f"));
        assert!(ctx.take_graph(id).is_some());
        assert!(ctx.graphs.is_empty());
    }

    #[test]
    fn test_constant_property_needs_watchable_structure() {
        let ctx = CompilationContext::new();
        let structure = ctx
            .registry
            .create_structure(CellKind::FinalObject, IndexingType::non_array(IndexingShape::None));
        ctx.registry.add_property(structure, PropertyId(1), 0);
        let cell = ctx.registry.create_object(structure);
        ctx.registry.put_direct(cell, 0, Value::Int32(42));

        let watchpoints = DesiredWatchpoints::new();
        let structures = StructureAbstractValue::from(structure);
        let value =
            ctx.try_get_constant_property(&watchpoints, Some(Value::Cell(cell)), &structures, 0);
        assert_eq!(value, Some(Value::Int32(42)));
        assert!(watchpoints.contains(Watchpoint::PropertyReplacement(structure.id, 0)));

        ctx.registry.mark_property_replaced(structure, 0);
        let value =
            ctx.try_get_constant_property(&watchpoints, Some(Value::Cell(cell)), &structures, 0);
        assert_eq!(value, None);
    }

    #[test]
    fn test_register_watchpoints_fails_after_fire() {
        let ctx = CompilationContext::new();
        let graph = Graph::new(1, 0);
        graph
            .watchpoints
            .add_lazily(Watchpoint::StructureStable(crate::analysis::structure::StructureId(3)));
        ctx.watchpoint_table
            .fire(Watchpoint::StructureStable(crate::analysis::structure::StructureId(3)));

        assert!(ctx.register_watchpoints(&graph).is_none());
        assert!(ctx.events.has(EventKind::Warning));
    }
}
