//! The interface every optimization pass implements.

use crate::{compiler::CompilationContext, graph::Graph, Result};

/// A transformation or analysis over one graph.
///
/// Passes are shared across the worker threads that process independent graphs,
/// so `run` takes `&self`; per-run state lives on the stack of `run`. The graph is
/// owned exclusively by the calling thread for the duration of the call.
pub trait GraphPass: Send + Sync {
    /// Unique name of this pass, used in events.
    fn name(&self) -> &'static str;

    /// Returns `true` if the pass should run on `graph`.
    fn should_run(&self, _graph: &Graph, _ctx: &CompilationContext) -> bool {
        true
    }

    /// Runs the pass. Returns `true` if the graph changed.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph violates an invariant the pass relies on;
    /// the compilation of that graph must be abandoned.
    fn run(&self, graph: &mut Graph, ctx: &CompilationContext) -> Result<bool>;

    /// Called once before the pipeline starts.
    fn initialize(&mut self, _ctx: &CompilationContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pipeline finished.
    fn finalize(&mut self, _ctx: &CompilationContext) -> Result<()> {
        Ok(())
    }

    /// A short description of what the pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
