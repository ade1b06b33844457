//! Pass scheduler: runs an ordered pass list over every graph until nothing changes.
//!
//! Passes never iterate to a fixpoint internally; they report whether they changed
//! the graph and the scheduler re-runs the whole list until an iteration changes
//! nothing, or the iteration limits are reached.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::{
    compiler::{
        context::{CompilationContext, GraphId},
        events::EventKind,
        pass::GraphPass,
        passes::{
            ArgumentsEliminationPass, CfaPass, ConstantFoldingPass, LicmPass,
            StructureRegistrationPass,
        },
        OptimizerConfig,
    },
    graph::{liveness::compute_liveness, Graph},
    Result,
};

/// Runs passes over the graphs of a [`CompilationContext`].
///
/// Within one iteration the passes run in order. Each pass is applied to every
/// graph before the next pass starts; independent graphs are processed in parallel.
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Number of stable iterations before stopping.
    stable_iterations: usize,
    /// The passes, in execution order.
    pub passes: Vec<Box<dyn GraphPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(5, 2)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits and no passes.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    /// * `stable_iterations` - Stop early if no changes for this many iterations.
    ///
    /// # Returns
    ///
    /// A new `PassScheduler`.
    #[must_use]
    pub fn new(max_iterations: usize, stable_iterations: usize) -> Self {
        Self {
            max_iterations,
            stable_iterations,
            passes: Vec::new(),
        }
    }

    /// Creates a scheduler running the standard pipeline.
    ///
    /// The pipeline is structure registration, control-flow analysis, constant
    /// folding, arguments elimination, control-flow analysis again and LICM. Passes
    /// disabled in `config` are left out; the analyses always run.
    ///
    /// # Arguments
    ///
    /// * `config` - Limits and switches.
    ///
    /// # Returns
    ///
    /// A new `PassScheduler` with the standard passes registered.
    #[must_use]
    pub fn with_default_pipeline(config: &OptimizerConfig) -> Self {
        let mut scheduler = Self::new(config.max_iterations, config.stable_iterations);
        scheduler.add(StructureRegistrationPass::new());
        scheduler.add(CfaPass::new());
        if config.constant_folding_enabled {
            scheduler.add(ConstantFoldingPass::new());
        }
        if config.arguments_elimination_enabled {
            scheduler.add(ArgumentsEliminationPass::new());
        }
        if config.licm_enabled {
            scheduler.add(CfaPass::new());
            scheduler.add(LicmPass::new());
        }
        scheduler
    }

    /// Appends a pass.
    pub fn add(&mut self, pass: impl GraphPass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Names of the registered passes, in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Restores the per-graph facts every pass relies on after a pass changed the
    /// graph: reference counts and SSA liveness.
    fn normalize(graph: &mut Graph) -> Result<()> {
        graph.compute_predecessors();
        graph.initialize_node_owners();
        graph.compute_ref_counts();
        compute_liveness(graph)
    }

    /// Runs one pass over every graph.
    ///
    /// Returns the number of graphs the pass changed.
    fn run_pass(pass: &dyn GraphPass, ctx: &CompilationContext, graphs: &[GraphId]) -> Result<usize> {
        let changed = AtomicUsize::new(0);

        graphs.par_iter().try_for_each(|&id| -> Result<()> {
            // Remove the graph (brief lock, then released)
            let Some(mut graph) = ctx.take_graph(id) else {
                return Ok(());
            };
            if !pass.should_run(&graph, ctx) {
                ctx.graphs.insert(id, graph);
                return Ok(());
            }

            // Run the pass with no locks held
            let result = pass.run(&mut graph, ctx).and_then(|did_change| {
                if did_change {
                    Self::normalize(&mut graph)?;
                }
                Ok(did_change)
            });

            match result {
                Ok(did_change) => {
                    if did_change {
                        changed.fetch_add(1, Ordering::Relaxed);
                    }
                    ctx.graphs.insert(id, graph);
                    Ok(())
                }
                Err(error) => {
                    // The graph is abandoned: it is not reinserted.
                    ctx.events
                        .record(EventKind::Error)
                        .graph(&graph)
                        .pass(pass.name())
                        .message(error.to_string());
                    Err(error)
                }
            }
        })?;

        Ok(changed.load(Ordering::Relaxed))
    }

    /// Runs all passes once over all graphs.
    ///
    /// Returns `true` if any pass made changes, `false` otherwise.
    fn run_passes_once(&mut self, ctx: &CompilationContext) -> Result<bool> {
        let graphs = ctx.graph_ids();
        let mut any_changed = false;

        for pass in &mut self.passes {
            pass.initialize(ctx)?;
        }

        for pass in &self.passes {
            ctx.events.record(EventKind::PassStarted).pass(pass.name());
            let changed = Self::run_pass(pass.as_ref(), ctx, &graphs)?;
            ctx.events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(format!("{changed} of {} graphs changed", graphs.len()));
            any_changed |= changed > 0;
        }

        for pass in &mut self.passes {
            pass.finalize(ctx)?;
        }

        Ok(any_changed)
    }

    /// Runs the pipeline until no pass reports a change for `stable_iterations`
    /// consecutive iterations, or `max_iterations` is reached.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The compilation context holding the graphs.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns the first error a pass reported. The failing graph is removed from
    /// the context.
    pub fn run_pipeline(&mut self, ctx: &CompilationContext) -> Result<usize> {
        let mut stable_count = 0;
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;

            if self.run_passes_once(ctx)? {
                stable_count = 0;
            } else {
                stable_count += 1;
                if stable_count >= self.stable_iterations {
                    break;
                }
            }
        }

        Ok(iterations)
    }
}
