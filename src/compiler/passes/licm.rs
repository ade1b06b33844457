//! Loop Invariant Code Motion (LICM) Pass.
//!
//! Moves nodes whose result cannot change between iterations into the loop's
//! pre-header, the unique block outside the loop that jumps to its header.
//!
//! # Algorithm
//!
//! A node is hoisted into the pre-header of a loop containing it if:
//! 1. It writes nothing.
//! 2. Every child is owned by a block dominating the pre-header.
//! 3. It reads nothing any block of the loop writes.
//! 4. The abstract state at the end of the pre-header makes it safe to execute.
//! 5. The analysis finished the pre-header, so that state is meaningful.
//!
//! Blocks are walked in pre-order and each node tries its enclosing loops from
//! the outermost in. A hoisted node leaves a `Check` of its original children
//! behind and is re-executed on the tail states of the pre-headers of every loop
//! nested in the target, so later candidates see its type checks.
//!
//! Hoisting does not test control flow equivalence: a check guarded by a condition
//! inside the loop can be hoisted out of that condition and exit where the loop
//! never would have.
//!
//! # Example
//!
//! ```text
//! // Before LICM
//! pre-header:
//!     a = 5
//!     b = 10
//!     jump header
//!
//! header:
//!     i = phi
//!     x = a + b        // loop invariant
//!     i' = i + 1
//!     branch (i' < 10), header, exit
//!
//! // After LICM
//! pre-header:
//!     a = 5
//!     b = 10
//!     x = a + b
//!     jump header
//!
//! header:
//!     i = phi
//!     check(a, b)
//!     i' = i + 1
//!     branch (i' < 10), header, exit
//! ```

use crate::{
    analysis::{
        clobber_set::add_writes, does_writes, reads_overlap, safe_to_execute, AbstractInterpreter,
        AtTailAbstractState, ClobberSet,
    },
    compiler::{CompilationContext, EventKind, GraphPass},
    error::invariant_error,
    graph::{BlockIndex, Dominators, Graph, NaturalLoop, NaturalLoops, NodeId, Op},
    Result,
};

const PASS: &str = "licm";

/// Loop Invariant Code Motion Pass.
///
/// Moves loop-invariant nodes to the loop pre-header.
pub struct LicmPass;

impl Default for LicmPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LicmPass {
    /// Creates a new LICM pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Default)]
struct LoopData {
    writes: ClobberSet,
    pre_header: Option<BlockIndex>,
}

struct Hoister<'a> {
    ctx: &'a CompilationContext,
    dominators: Dominators,
    loops: NaturalLoops,
    data: Vec<LoopData>,
    interpreter: AbstractInterpreter<'a, AtTailAbstractState>,
}

impl<'a> Hoister<'a> {
    fn new(graph: &Graph, ctx: &'a CompilationContext) -> Result<Self> {
        let dominators = Dominators::compute(graph);
        let loops = NaturalLoops::compute(graph, &dominators);
        let mut data: Vec<LoopData> = (0..loops.num_loops()).map(|_| LoopData::default()).collect();

        // Writes of each loop, not yet including its inner loops.
        for block in graph.blocks() {
            if !block.cfa_has_visited {
                continue;
            }
            let Some(natural_loop) = loops.innermost_loop_of(block.index) else {
                continue;
            };
            let Some(loop_data) = data.get_mut(natural_loop.index()) else {
                continue;
            };
            for &id in &block.nodes {
                if matches!(graph.node(id).op, Op::ForceOSRExit) {
                    break;
                }
                add_writes(graph, id, &mut loop_data.writes);
            }
        }

        for natural_loop in loops.iter() {
            let writes = data
                .get(natural_loop.index())
                .map(|loop_data| loop_data.writes.clone())
                .unwrap_or_default();
            let mut outer = loops.innermost_outer_loop(natural_loop);
            while let Some(outer_loop) = outer {
                if let Some(outer_data) = data.get_mut(outer_loop.index()) {
                    outer_data.writes.add_all(&writes);
                }
                outer = loops.innermost_outer_loop(outer_loop);
            }

            let pre_header = Self::find_pre_header(graph, &dominators, natural_loop)?;
            if let Some(loop_data) = data.get_mut(natural_loop.index()) {
                loop_data.pre_header = pre_header;
            }
        }

        Ok(Self {
            ctx,
            dominators,
            loops,
            data,
            interpreter: AbstractInterpreter::new(ctx, AtTailAbstractState::new()),
        })
    }

    fn find_pre_header(
        graph: &Graph,
        dominators: &Dominators,
        natural_loop: &NaturalLoop,
    ) -> Result<Option<BlockIndex>> {
        let header = natural_loop.header();
        let mut pre_header = None;
        for &predecessor in &graph.try_block(header)?.predecessors {
            if dominators.dominates(header, predecessor) {
                continue;
            }
            if pre_header.is_some_and(|existing| existing != predecessor) {
                return Err(invariant_error!("loop at {} has several pre-headers", header));
            }
            pre_header = Some(predecessor);
        }

        if let Some(pre_header) = pre_header {
            let jumps = graph
                .terminal(pre_header)
                .is_some_and(|terminal| matches!(graph.node(terminal).op, Op::Jump(_)));
            if !jumps {
                return Err(invariant_error!(
                    "pre-header {} of loop at {} does not end in a jump",
                    pre_header,
                    header
                ));
            }
        }
        Ok(pre_header)
    }

    fn reject(&self, graph: &Graph, node: NodeId, why: &str) -> bool {
        if self.ctx.config.verbose_events {
            self.ctx
                .events
                .record(EventKind::HoistRejected)
                .at(graph, node)
                .pass(PASS)
                .message(format!("not hoisting {node}: {why}"));
        }
        false
    }

    fn edges_dominate(&self, graph: &Graph, node: NodeId, block: BlockIndex) -> bool {
        graph.node(node).children.iter().all(|edge| {
            graph
                .node(edge.node)
                .owner
                .is_some_and(|owner| self.dominators.dominates(owner, block))
        })
    }

    fn run(&mut self, graph: &mut Graph) -> Result<bool> {
        graph.initialize_node_owners();

        let mut changed = false;
        for block in graph.blocks_in_pre_order() {
            // Outermost first.
            let loop_stack: Vec<usize> = self
                .loops
                .loops_of(block)
                .iter()
                .rev()
                .map(|natural_loop| natural_loop.index())
                .collect();
            if loop_stack.is_empty() {
                continue;
            }

            let mut index = 0;
            while index < graph.try_block(block)?.len() {
                let node = graph.try_block(block)?.nodes[index];
                if does_writes(graph, node) {
                    index += 1;
                    continue;
                }
                for &loop_index in &loop_stack {
                    if self.attempt_hoist(graph, block, index, node, loop_index)? {
                        changed = true;
                        break;
                    }
                }
                index += 1;
            }
        }
        Ok(changed)
    }

    fn attempt_hoist(
        &mut self,
        graph: &mut Graph,
        from: BlockIndex,
        index: usize,
        node: NodeId,
        loop_index: usize,
    ) -> Result<bool> {
        let Some(loop_data) = self.data.get(loop_index) else {
            return Ok(false);
        };
        let Some(pre_header) = loop_data.pre_header else {
            return Ok(self.reject(graph, node, "loop has no pre-header"));
        };

        if !graph.try_block(pre_header)?.cfa_did_finish {
            return Ok(self.reject(graph, node, "analysis did not finish the pre-header"));
        }
        if !self.edges_dominate(graph, node, pre_header) {
            return Ok(self.reject(graph, node, "not loop invariant"));
        }
        if reads_overlap(graph, node, &loop_data.writes) {
            return Ok(self.reject(graph, node, "reads what the loop writes"));
        }

        self.interpreter
            .state_mut()
            .initialize_to(graph, pre_header)?;
        if !safe_to_execute(self.interpreter.state_mut(), graph, &self.ctx.registry, node) {
            return Ok(self.reject(graph, node, "not safe to execute in the pre-header"));
        }

        let original = graph.node(node).clone();
        let Some(terminal) = graph.terminal(pre_header) else {
            return Err(invariant_error!("pre-header {} has no terminal", pre_header));
        };
        let for_exit = graph.node(terminal).origin.for_exit;
        {
            let target = graph.try_block_mut(pre_header)?;
            let position = target.nodes.len().saturating_sub(1);
            target.nodes.insert(position, node);
        }
        let moved = graph.node_mut(node);
        moved.owner = Some(pre_header);
        moved.origin.for_exit = for_exit;

        self.update_pre_header_states(graph, node, loop_index, pre_header)?;

        let check = graph.add_node(Op::Check, original.children, original.origin);
        graph.node_mut(check).owner = Some(from);
        graph.try_block_mut(from)?.nodes[index] = check;

        self.ctx
            .events
            .record(EventKind::NodeHoisted)
            .at(graph, node)
            .pass(PASS)
            .message(format!("hoisted {} from {} to {}", original.op, from, pre_header));
        Ok(true)
    }

    /// Executes the hoisted node at the tail of the pre-header of every loop
    /// inside the target loop, ending with the target pre-header itself so that
    /// the node's edge proofs describe its new position.
    fn update_pre_header_states(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        loop_index: usize,
        pre_header: BlockIndex,
    ) -> Result<()> {
        let Some(natural_loop) = self.loops.loop_at(loop_index) else {
            return Ok(());
        };
        let mut targets: Vec<BlockIndex> = natural_loop
            .blocks()
            .filter_map(|block| self.loops.header_of(block))
            .filter_map(|sub_loop| self.data.get(sub_loop.index()))
            .filter_map(|sub_data| sub_data.pre_header)
            .filter(|&sub_pre_header| sub_pre_header != pre_header)
            .collect();
        targets.push(pre_header);

        for target in targets {
            if !graph.try_block(target)?.cfa_did_finish {
                continue;
            }
            self.interpreter.state_mut().initialize_to(graph, target)?;
            self.interpreter.execute_node(graph, node)?;
            self.interpreter.state().write_back(graph)?;
        }
        Ok(())
    }
}

impl GraphPass for LicmPass {
    fn name(&self) -> &'static str {
        PASS
    }

    fn description(&self) -> &'static str {
        "Hoists loop-invariant nodes into loop pre-headers"
    }

    fn should_run(&self, _graph: &Graph, ctx: &CompilationContext) -> bool {
        ctx.config.licm_enabled
    }

    fn run(&self, graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
        graph.ensure_ssa(PASS)?;
        let mut hoister = Hoister::new(graph, ctx)?;
        if hoister.loops.num_loops() == 0 {
            return Ok(false);
        }
        hoister.run(graph)
    }
}
