//! Control-flow abstract interpretation.
//!
//! Runs the abstract interpreter over every block until the block head states stop
//! changing. The results stay on the blocks: head and tail values, whether the
//! block was reached (`cfa_has_visited`), whether its replay finished
//! (`cfa_did_finish`), whether it found constants, the proved branch direction and
//! the structure clobber state at both ends.
//!
//! # Algorithm
//!
//! ```text
//! initialize: root arguments from their flush formats, every other block clear
//! repeat
//!     for block in pre-order
//!         if block.cfa_should_revisit
//!             begin_basic_block(block)
//!             execute nodes until one proves the rest unreachable
//!             end_basic_block(block), merging the tail into successors
//! until no block needs revisiting
//! ```
//!
//! Merging into a successor sets its `cfa_should_revisit` when its head state
//! grows, so the loop ends once every head is stable.

use crate::{
    analysis::{AbstractInterpreter, InPlaceAbstractState},
    compiler::{CompilationContext, EventKind, GraphPass},
    graph::{BlockIndex, Graph},
    Result,
};

/// Control-flow analysis driver.
pub struct CfaPass;

impl Default for CfaPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CfaPass {
    /// Creates a new CFA pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the analysis to a fixpoint, leaving its results on the blocks.
    ///
    /// Returns the number of block visits.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is not in SSA form or refers to missing blocks.
    pub fn analyze(graph: &mut Graph, ctx: &CompilationContext) -> Result<usize> {
        graph.ensure_ssa("cfa")?;

        let mut state = InPlaceAbstractState::new(graph);
        state.initialize(graph)?;
        let mut interpreter = AbstractInterpreter::new(ctx, state);

        let order = graph.blocks_in_pre_order();
        let mut visits = 0;
        while Self::any_needs_revisit(graph, &order)? {
            for &index in &order {
                if !graph.try_block(index)?.cfa_should_revisit {
                    continue;
                }
                visits += 1;
                Self::perform_block_cfa(graph, &mut interpreter, index)?;
            }
        }
        Ok(visits)
    }

    fn perform_block_cfa(
        graph: &mut Graph,
        interpreter: &mut AbstractInterpreter<'_, InPlaceAbstractState>,
        index: BlockIndex,
    ) -> Result<bool> {
        interpreter.state_mut().begin_basic_block(graph, index)?;
        let len = graph.try_block(index)?.len();
        for node_index in 0..len {
            if !interpreter.execute(graph, node_index)? {
                break;
            }
        }
        interpreter.state_mut().end_basic_block(graph, true)
    }

    fn any_needs_revisit(graph: &Graph, order: &[BlockIndex]) -> Result<bool> {
        for &index in order {
            if graph.try_block(index)?.cfa_should_revisit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl GraphPass for CfaPass {
    fn name(&self) -> &'static str {
        "cfa"
    }

    fn description(&self) -> &'static str {
        "Propagates abstract values over the control flow graph to a fixpoint"
    }

    fn run(&self, graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
        let visits = Self::analyze(graph, ctx)?;
        if ctx.config.verbose_events {
            ctx.events
                .record(EventKind::Info)
                .graph(graph)
                .pass(self.name())
                .message(format!("fixpoint after {visits} block visits"));
        }
        // The analysis annotates blocks but leaves the code as it was.
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{SpeculatedType, Value},
        graph::{ArithMode, BranchDirection, Edge, GraphBuilder, Op, UseKind},
    };

    #[test]
    fn test_loop_reaches_fixpoint() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let header = builder.block();
        let body = builder.block();
        let exit = builder.block();

        let zero = builder.int32(0);
        let phi = builder.graph_mut().add_node(Op::Phi, vec![], Default::default());
        builder.add(Op::Upsilon { phi }, [Edge::untyped(zero)]);
        builder.jump(header);

        builder.switch_to(header);
        builder.graph_mut().append(header, phi).unwrap();
        let ten = builder.int32(10);
        let less = builder.add(
            Op::CompareLess,
            [Edge::new(phi, UseKind::Int32), Edge::new(ten, UseKind::Int32)],
        );
        builder.branch(Edge::new(less, UseKind::Boolean), body, exit);

        builder.switch_to(body);
        let one = builder.int32(1);
        let next = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(phi, UseKind::Int32), Edge::new(one, UseKind::Int32)],
        );
        builder.add(Op::Upsilon { phi }, [Edge::untyped(next)]);
        builder.jump(header);

        builder.switch_to(exit);
        builder.ret(Edge::untyped(phi));
        let mut graph = builder.finish().unwrap();

        let visits = CfaPass::analyze(&mut graph, &ctx).unwrap();
        assert!(visits >= 4);

        let header_block = graph.block(header).unwrap();
        assert!(header_block.cfa_has_visited && header_block.cfa_did_finish);
        assert_eq!(header_block.cfa_branch_direction, BranchDirection::TakeBoth);
        let phi_value = &header_block.ssa.values_at_head[&phi];
        assert!(phi_value.is_type(SpeculatedType::INT32));
        assert_eq!(phi_value.value, None);
        assert!(graph.block(exit).unwrap().cfa_has_visited);
    }

    #[test]
    fn test_dead_branch_is_not_visited() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let taken = builder.block();
        let not_taken = builder.block();
        let flag = builder.constant(Value::Boolean(true));
        builder.branch(Edge::new(flag, UseKind::Boolean), taken, not_taken);
        for block in [taken, not_taken] {
            builder.switch_to(block);
            let zero = builder.int32(0);
            builder.ret(Edge::untyped(zero));
        }
        let mut graph = builder.finish().unwrap();

        CfaPass::analyze(&mut graph, &ctx).unwrap();
        assert!(graph.block(taken).unwrap().cfa_has_visited);
        assert!(!graph.block(not_taken).unwrap().cfa_has_visited);
    }
}
