//! The optimizer's transformation log.
//!
//! Passes never print. What they change, what they decline to change and why, and
//! what they fail at all end up as [`Event`]s in the [`EventLog`] owned by the
//! [`CompilationContext`](crate::compiler::CompilationContext). Tests and callers
//! query the log after the pipeline ran; nothing reads it during optimization.
//!
//! Rejection events (`CandidateEscaped`, `HoistRejected`, ...) are only recorded
//! when [`OptimizerConfig::verbose_events`](crate::compiler::OptimizerConfig) is
//! set, since a single LICM run rejects far more nodes than it hoists.
//!
//! # Example
//!
//! ```rust
//! use dfgopt::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .pass("constant-folding")
//!     .message("@3 -> Int32: 9");
//! log.record(EventKind::NodeHoisted).pass("licm");
//!
//! assert_eq!(log.count_kind(EventKind::ConstantFolded), 1);
//! assert_eq!(log.count_pass("licm"), 1);
//! assert_eq!(log.summary(), "1 constant folded, 1 node hoisted");
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    time::Duration,
};

use strum::EnumIter;

use crate::graph::{Graph, NodeId};

/// What an event is about, for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventCategory {
    /// The graph changed.
    Transformation,
    /// A pass considered a change and declined it.
    Rejection,
    /// A dependency on the runtime was recorded.
    Dependency,
    /// The scheduler's own bookkeeping.
    Scheduling,
    /// Free-form info, warnings and errors.
    Diagnostic,
}

/// Kinds of recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
pub enum EventKind {
    /// A node was replaced by a constant.
    ConstantFolded,
    /// A speculation check was proven redundant and removed.
    CheckRemoved,
    /// A property access was reduced to a direct offset access.
    AccessStrengthReduced,
    /// Cases of a multi-structure access were pruned.
    MultiAccessPruned,
    /// A phi input was rewritten after its phi became constant.
    PhiInputRewritten,
    /// A block was cut short after a proven contradiction.
    BlockClipped,
    /// An unreachable block was removed.
    BlockRemoved,
    /// An arguments allocation was eliminated.
    AllocationEliminated,
    /// A node was hoisted out of a loop.
    NodeHoisted,

    /// An arguments allocation escaped and was kept.
    CandidateEscaped,
    /// An arguments allocation's slots were overwritten while it was live.
    CandidateInterfered,
    /// A node stayed in its loop.
    HoistRejected,

    /// A structure was registered with the compilation.
    StructureRegistered,
    /// The compilation's watchpoints were handed to the runtime.
    WatchpointRegistered,

    /// A pass started over all graphs.
    PassStarted,
    /// A pass finished over all graphs.
    PassCompleted,

    /// Informational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// A pass failed; its graph was abandoned.
    Error,
}

impl EventKind {
    /// The group this kind belongs to.
    #[must_use]
    pub fn category(self) -> EventCategory {
        match self {
            Self::ConstantFolded
            | Self::CheckRemoved
            | Self::AccessStrengthReduced
            | Self::MultiAccessPruned
            | Self::PhiInputRewritten
            | Self::BlockClipped
            | Self::BlockRemoved
            | Self::AllocationEliminated
            | Self::NodeHoisted => EventCategory::Transformation,
            Self::CandidateEscaped | Self::CandidateInterfered | Self::HoistRejected => {
                EventCategory::Rejection
            }
            Self::StructureRegistered | Self::WatchpointRegistered => EventCategory::Dependency,
            Self::PassStarted | Self::PassCompleted => EventCategory::Scheduling,
            Self::Info | Self::Warning | Self::Error => EventCategory::Diagnostic,
        }
    }

    /// Lower-case text used in messages and summaries.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::ConstantFolded => "constant folded",
            Self::CheckRemoved => "check removed",
            Self::AccessStrengthReduced => "access strength reduced",
            Self::MultiAccessPruned => "multi access pruned",
            Self::PhiInputRewritten => "phi input rewritten",
            Self::BlockClipped => "block clipped",
            Self::BlockRemoved => "block removed",
            Self::AllocationEliminated => "allocation eliminated",
            Self::NodeHoisted => "node hoisted",
            Self::CandidateEscaped => "candidate escaped",
            Self::CandidateInterfered => "candidate interfered",
            Self::HoistRejected => "hoist rejected",
            Self::StructureRegistered => "structure registered",
            Self::WatchpointRegistered => "watchpoints registered",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// `true` if the graph changed.
    #[must_use]
    pub fn is_transformation(self) -> bool {
        self.category() == EventCategory::Transformation
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Name of the graph it happened in.
    pub graph: Option<String>,
    /// The node it is about.
    pub node: Option<NodeId>,
    /// Details; the kind's description when none were given.
    pub message: String,
    /// The pass that recorded it.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            graph: None,
            node: None,
            message: String::new(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(graph) = &self.graph {
            write!(f, " {graph}")?;
        }
        if let Some(node) = self.node {
            write!(f, " {node}")?;
        }
        write!(f, " {}", self.message)
    }
}

/// An event under construction, appended to its log on drop.
///
/// Obtained from [`EventLog::record`].
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Event,
    has_message: bool,
}

impl EventBuilder<'_> {
    /// Attaches the graph and the node.
    pub fn at(mut self, graph: &Graph, node: NodeId) -> Self {
        self.event.graph = Some(graph.name.clone());
        self.event.node = Some(node);
        self
    }

    /// Attaches the graph only.
    pub fn graph(mut self, graph: &Graph) -> Self {
        self.event.graph = Some(graph.name.clone());
        self
    }

    /// Sets the details.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.event.message = message.into();
        self.has_message = true;
        self
    }

    /// Attributes the event to a pass.
    pub fn pass(mut self, name: impl Into<String>) -> Self {
        self.event.pass = Some(name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if !self.has_message {
            self.event.message = self.event.kind.description().to_string();
        }
        let kind = self.event.kind;
        let event = std::mem::replace(&mut self.event, Event::new(kind));
        self.log.events.push(event);
    }
}

/// Append-only event log shared by every pass of a compilation.
///
/// Appending takes `&self`, so passes running on different graphs in parallel
/// record into the same log without locking.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Event::new(kind),
            has_message: false,
        }
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every event, in recording order per thread.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, event)| event)
    }

    /// `true` if some event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|event| event.kind == kind)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// Number of events recorded by the pass called `name`.
    #[must_use]
    pub fn count_pass(&self, name: &str) -> usize {
        self.iter()
            .filter(|event| event.pass.as_deref() == Some(name))
            .count()
    }

    /// Events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |event| event.kind == kind)
    }

    /// Events about the graph called `name`.
    pub fn filter_graph<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter()
            .filter(move |event| event.graph.as_deref() == Some(name))
    }

    /// Events about one node of one graph, such as every rejection LICM recorded
    /// for it.
    pub fn for_node<'a>(
        &'a self,
        graph: &'a str,
        node: NodeId,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.filter_graph(graph)
            .filter(move |event| event.node == Some(node))
    }

    /// Error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Event counts per kind, ordered by kind.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Number of distinct graphs that were transformed.
    #[must_use]
    pub fn graphs_affected(&self) -> usize {
        self.iter()
            .filter(|event| event.kind.is_transformation())
            .filter_map(|event| event.graph.as_deref())
            .collect::<HashSet<_>>()
            .len()
    }

    /// One line listing the transformations, e.g. `"2 constant folded, 1 node hoisted"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }
        let parts: Vec<String> = self
            .counts()
            .into_iter()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        if parts.is_empty() {
            format!("{} events, no transformations", self.len())
        } else {
            parts.join(", ")
        }
    }
}

/// Totals over one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Graphs with at least one transformation.
    pub graphs_transformed: usize,
    /// Nodes replaced by constants.
    pub constants_folded: usize,
    /// Checks removed, including structure checks.
    pub checks_removed: usize,
    /// Property accesses strength-reduced or pruned.
    pub accesses_reduced: usize,
    /// Blocks clipped or removed.
    pub blocks_changed: usize,
    /// Arguments allocations eliminated.
    pub allocations_eliminated: usize,
    /// Nodes hoisted out of loops.
    pub nodes_hoisted: usize,
    /// Graphs abandoned after an error.
    pub errors: usize,
    /// Scheduler iterations.
    pub iterations: usize,
    /// Wall time.
    pub elapsed: Duration,
}

impl PipelineStats {
    /// Totals the transformations in `log`.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.counts();
        let count = |kind| counts.get(&kind).copied().unwrap_or(0);
        Self {
            graphs_transformed: log.graphs_affected(),
            constants_folded: count(EventKind::ConstantFolded),
            checks_removed: count(EventKind::CheckRemoved),
            accesses_reduced: count(EventKind::AccessStrengthReduced)
                + count(EventKind::MultiAccessPruned),
            blocks_changed: count(EventKind::BlockClipped) + count(EventKind::BlockRemoved),
            allocations_eliminated: count(EventKind::AllocationEliminated),
            nodes_hoisted: count(EventKind::NodeHoisted),
            errors: count(EventKind::Error),
            iterations: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Sets the iteration count reported by the scheduler.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the wall time.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let totals = [
            (self.constants_folded, "folded"),
            (self.checks_removed, "checks removed"),
            (self.accesses_reduced, "accesses reduced"),
            (self.blocks_changed, "blocks changed"),
            (self.allocations_eliminated, "allocations eliminated"),
            (self.nodes_hoisted, "hoisted"),
            (self.errors, "errors"),
        ];
        write!(f, "{} graphs:", self.graphs_transformed)?;
        let mut any = false;
        for (count, what) in totals.into_iter().filter(|(count, _)| *count > 0) {
            write!(f, "{} {count} {what}", if any { "," } else { "" })?;
            any = true;
        }
        if !any {
            f.write_str(" unchanged")?;
        }
        write!(f, " after {} iterations in {:?}", self.iterations, self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn named_graph(name: &str) -> Graph {
        let mut graph = Graph::new(1, 0);
        graph.name = name.to_string();
        graph
    }

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert!(!log.has(EventKind::ConstantFolded));
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_event_at_node() {
        let log = EventLog::new();
        let graph = named_graph("f");

        log.record(EventKind::CheckRemoved)
            .at(&graph, NodeId(4))
            .message("CheckStructure on @2");

        let event = log.iter().next().unwrap();
        assert_eq!(event.graph.as_deref(), Some("f"));
        assert_eq!(event.node, Some(NodeId(4)));
        assert_eq!(event.to_string(), "[check removed] f @4 CheckStructure on @2");
        assert_eq!(log.for_node("f", NodeId(4)).count(), 1);
        assert_eq!(log.for_node("f", NodeId(5)).count(), 0);
    }

    #[test]
    fn test_default_message_and_pass() {
        let log = EventLog::new();
        log.record(EventKind::NodeHoisted).pass("licm");

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "node hoisted");
        assert_eq!(event.pass.as_deref(), Some("licm"));
        assert_eq!(log.count_pass("licm"), 1);
    }

    #[test]
    fn test_summary_lists_transformations_only() {
        let log = EventLog::new();
        let f = named_graph("f");
        let g = named_graph("g");

        log.record(EventKind::ConstantFolded).at(&f, NodeId(1));
        log.record(EventKind::ConstantFolded).at(&g, NodeId(2));
        log.record(EventKind::HoistRejected).at(&f, NodeId(3));
        log.record(EventKind::Warning).message("odd");

        assert_eq!(log.filter_graph("f").count(), 2);
        assert_eq!(log.graphs_affected(), 2);
        assert_eq!(log.summary(), "2 constant folded");

        let quiet = EventLog::new();
        quiet.record(EventKind::PassStarted);
        assert_eq!(quiet.summary(), "1 events, no transformations");
    }

    #[test]
    fn test_pipeline_stats() {
        let log = EventLog::new();
        let f = named_graph("f");
        log.record(EventKind::ConstantFolded).at(&f, NodeId(1));
        log.record(EventKind::BlockClipped).at(&f, NodeId(2));
        log.record(EventKind::BlockRemoved).graph(&f);

        let stats = PipelineStats::from_log(&log).with_iterations(3);
        assert_eq!(stats.graphs_transformed, 1);
        assert_eq!(stats.blocks_changed, 2);
        assert_eq!(
            stats.to_string(),
            "1 graphs: 1 folded, 2 blocks changed after 3 iterations in 0ns"
        );
        assert_eq!(
            PipelineStats::default().to_string(),
            "0 graphs: unchanged after 0 iterations in 0ns"
        );
    }

    #[test]
    fn test_every_kind_has_one_category() {
        for kind in EventKind::iter() {
            assert!(!kind.description().is_empty());
            assert_eq!(
                kind.is_transformation(),
                kind.category() == EventCategory::Transformation,
                "{kind}"
            );
        }
    }

    #[test]
    fn test_parallel_recording() {
        use std::{sync::Arc, thread};

        let log = Arc::new(EventLog::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for j in 0..100 {
                        log.record(EventKind::ConstantFolded)
                            .message(format!("thread {i} event {j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 400);
    }
}
