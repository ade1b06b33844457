//! The data-flow graph: a node arena plus a list of basic blocks.

use std::fmt;

use crate::{
    compiler::DesiredWatchpoints,
    error::malformed_error,
    graph::{
        BasicBlock, BlockIndex, Edge, FlushFormat, InlineCallFrame, Node, NodeId, NodeOrigin, Op,
        CodeOrigin,
    },
    utils::graph::{post_order, pre_order, reverse_post_order, Successors},
    Error, Result,
};

/// The form the graph is in. The passes in this crate require [`GraphForm::Ssa`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphForm {
    /// Values flow through stack slots.
    LoadStore,
    /// Stack slots are threaded through blocks.
    ThreadedCps,
    /// Values flow through nodes; merges use `Phi`/`Upsilon`.
    Ssa,
}

/// Whether every structure the graph mentions has been registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructureRegistrationState {
    /// Registration has not run yet.
    #[default]
    HaveNotStartedRegistering,
    /// Every structure is registered; new ones must be registered as they appear.
    AllStructuresAreRegistered,
}

/// A compilation unit: one machine frame, possibly with inlined callees.
///
/// Nodes live in an arena and are never freed; a node that no block lists is dead.
/// Blocks are stored as slots so that killing a block keeps the other indices stable.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    blocks: Vec<Option<BasicBlock>>,
    num_arguments: usize,
    num_locals: usize,
    /// Name used in events and dumps.
    pub name: String,
    /// The graph's form.
    pub form: GraphForm,
    /// Representation of each argument of the machine frame on entry.
    pub argument_formats: Vec<FlushFormat>,
    /// Inlined callees.
    pub inline_call_frames: Vec<InlineCallFrame>,
    /// Watchpoints this compilation relies on.
    pub watchpoints: DesiredWatchpoints,
    /// Structure registration progress.
    pub structure_registration_state: StructureRegistrationState,
}

impl Graph {
    /// Creates an empty SSA graph for a frame with `num_arguments` arguments
    /// (including `this`) and `num_locals` locals.
    #[must_use]
    pub fn new(num_arguments: usize, num_locals: usize) -> Self {
        Self {
            nodes: Vec::new(),
            blocks: Vec::new(),
            num_arguments,
            num_locals,
            name: String::new(),
            form: GraphForm::Ssa,
            argument_formats: vec![FlushFormat::JSValue; num_arguments],
            inline_call_frames: Vec::new(),
            watchpoints: DesiredWatchpoints::default(),
            structure_registration_state: StructureRegistrationState::default(),
        }
    }

    /// Number of arguments of the machine frame, including `this`.
    #[must_use]
    pub fn num_arguments(&self) -> usize {
        self.num_arguments
    }

    /// Number of locals of the machine frame.
    #[must_use]
    pub fn num_locals(&self) -> usize {
        self.num_locals
    }

    /// Fails with [`Error::NotSsa`] unless the graph is in SSA form.
    pub fn ensure_ssa(&self, pass: &'static str) -> Result<()> {
        if self.form == GraphForm::Ssa {
            Ok(())
        } else {
            Err(Error::NotSsa(pass))
        }
    }

    /// Adds a node to the arena without placing it in a block.
    pub fn add_node(&mut self, op: Op, children: Vec<Edge>, origin: NodeOrigin) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(op, children, origin));
        id
    }

    /// Number of node slots in the arena.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The node `id`. Ids are only ever minted by this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable access to node `id`.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// The node `id`, or [`Error::UnknownNode`].
    pub fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id))
    }

    /// Appends a new empty block.
    pub fn add_block(&mut self) -> BlockIndex {
        let index = BlockIndex(self.blocks.len());
        self.blocks.push(Some(BasicBlock::new(
            index,
            self.num_arguments,
            self.num_locals,
        )));
        index
    }

    /// Number of block slots, including killed ones.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The block at `index`, if it is live.
    #[must_use]
    pub fn block(&self, index: BlockIndex) -> Option<&BasicBlock> {
        self.blocks.get(index.0).and_then(Option::as_ref)
    }

    /// Mutable access to a live block.
    pub fn block_mut(&mut self, index: BlockIndex) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(index.0).and_then(Option::as_mut)
    }

    /// The block at `index`, or [`Error::UnknownBlock`].
    pub fn try_block(&self, index: BlockIndex) -> Result<&BasicBlock> {
        self.block(index).ok_or(Error::UnknownBlock(index))
    }

    /// Mutable access to a live block, or [`Error::UnknownBlock`].
    pub fn try_block_mut(&mut self, index: BlockIndex) -> Result<&mut BasicBlock> {
        self.block_mut(index).ok_or(Error::UnknownBlock(index))
    }

    /// Indices of the live blocks, in index order.
    #[must_use]
    pub fn block_indices(&self) -> Vec<BlockIndex> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_some())
            .map(|(i, _)| BlockIndex(i))
            .collect()
    }

    /// Iterates over the live blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().flatten()
    }

    /// Iterates mutably over the live blocks.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.blocks.iter_mut().flatten()
    }

    /// Appends `node` to `block`.
    pub fn append(&mut self, block: BlockIndex, node: NodeId) -> Result<()> {
        self.try_block_mut(block)?.nodes.push(node);
        self.node_mut(node).owner = Some(block);
        Ok(())
    }

    /// The block's terminal node.
    #[must_use]
    pub fn terminal(&self, block: BlockIndex) -> Option<NodeId> {
        let last = self.block(block)?.last()?;
        self.node(last).is_terminal().then_some(last)
    }

    /// The block's successors, read from its terminal.
    #[must_use]
    pub fn successors_of(&self, block: BlockIndex) -> Vec<BlockIndex> {
        self.terminal(block)
            .map(|terminal| self.node(terminal).op.successors())
            .unwrap_or_default()
    }

    /// Recomputes every block's predecessor list from the terminals.
    pub fn compute_predecessors(&mut self) {
        for block in self.blocks_mut() {
            block.predecessors.clear();
        }
        for index in self.block_indices() {
            for successor in self.successors_of(index) {
                if let Some(block) = self.block_mut(successor) {
                    if !block.predecessors.contains(&index) {
                        block.predecessors.push(index);
                    }
                }
            }
        }
    }

    /// Blocks reachable from the root in depth-first pre-order.
    #[must_use]
    pub fn blocks_in_pre_order(&self) -> Vec<BlockIndex> {
        pre_order(self, 0).into_iter().map(BlockIndex).collect()
    }

    /// Blocks reachable from the root in depth-first post-order.
    #[must_use]
    pub fn blocks_in_post_order(&self) -> Vec<BlockIndex> {
        post_order(self, 0).into_iter().map(BlockIndex).collect()
    }

    /// Blocks reachable from the root in reverse post-order.
    #[must_use]
    pub fn blocks_in_reverse_post_order(&self) -> Vec<BlockIndex> {
        reverse_post_order(self, 0).into_iter().map(BlockIndex).collect()
    }

    /// Records in every node which block lists it.
    pub fn initialize_node_owners(&mut self) {
        for node in &mut self.nodes {
            node.owner = None;
        }
        for index in 0..self.blocks.len() {
            let Some(block) = self.blocks[index].as_ref() else {
                continue;
            };
            let listed = block.nodes.clone();
            for id in listed {
                self.nodes[id.0].owner = Some(BlockIndex(index));
            }
        }
    }

    /// Recomputes reference counts: must-generate nodes and everything they
    /// transitively use are referenced.
    pub fn compute_ref_counts(&mut self) {
        for node in &mut self.nodes {
            node.set_ref_count(0);
        }

        let mut worklist = Vec::new();
        for block in self.blocks.iter().flatten() {
            for &id in &block.nodes {
                let node = &mut self.nodes[id.0];
                if node.node_type().must_generate() {
                    let count = node.ref_count();
                    node.set_ref_count(count + 1);
                    if count == 0 {
                        worklist.push(id);
                    }
                }
            }
        }

        while let Some(id) = worklist.pop() {
            let mut uses: Vec<NodeId> = self.nodes[id.0].children.iter().map(|e| e.node).collect();
            if let Op::Upsilon { phi } = self.nodes[id.0].op {
                uses.push(phi);
            }
            for used in uses {
                let node = &mut self.nodes[used.0];
                let count = node.ref_count();
                node.set_ref_count(count + 1);
                if count == 0 {
                    worklist.push(used);
                }
            }
        }
    }

    /// Removes blocks not reachable from the root. Returns how many were removed.
    pub fn kill_unreachable_blocks(&mut self) -> usize {
        let reachable = self.blocks_in_pre_order();
        for block in self.blocks_mut() {
            block.is_reachable = false;
        }
        for index in &reachable {
            if let Some(block) = self.block_mut(*index) {
                block.is_reachable = true;
            }
        }

        let mut killed = 0;
        for slot in &mut self.blocks {
            if slot.as_ref().is_some_and(|b| !b.is_reachable) {
                *slot = None;
                killed += 1;
            }
        }
        if killed > 0 {
            self.compute_predecessors();
            self.initialize_node_owners();
        }
        killed
    }

    /// The inline frame a code origin belongs to.
    #[must_use]
    pub fn inline_call_frame(&self, origin: CodeOrigin) -> Option<&InlineCallFrame> {
        origin
            .inline_call_frame
            .and_then(|id| self.inline_call_frames.get(id.0))
    }

    /// Offset of the frame of `origin` within the machine frame.
    #[must_use]
    pub fn stack_offset(&self, origin: CodeOrigin) -> i32 {
        self.inline_call_frame(origin)
            .map_or(0, |frame| frame.stack_offset)
    }

    /// Checks the block shape rules every pass relies on: each live block ends in
    /// exactly one terminal, and every successor is a live block.
    pub fn validate(&self) -> Result<()> {
        if self.block(BlockIndex::ROOT).is_none() {
            return Err(malformed_error!("graph has no root block"));
        }
        for block in self.blocks() {
            let Some(last) = block.last() else {
                return Err(malformed_error!("block {} is empty", block.index));
            };
            for &id in &block.nodes {
                let node = self.try_node(id)?;
                if node.is_terminal() != (id == last) {
                    return Err(malformed_error!(
                        "block {} has misplaced terminal {} ({})",
                        block.index,
                        id,
                        node.op
                    ));
                }
                for edge in &node.children {
                    self.try_node(edge.node)?;
                }
            }
            for successor in self.successors_of(block.index) {
                self.try_block(successor)?;
            }
        }
        Ok(())
    }
}

impl Successors for Graph {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors_of(BlockIndex(node))
            .into_iter()
            .map(|b| b.0)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.blocks() {
            write!(f, "Block {}", block.index)?;
            if !block.predecessors.is_empty() {
                f.write_str(" (preds:")?;
                for pred in &block.predecessors {
                    write!(f, " {pred}")?;
                }
                f.write_str(")")?;
            }
            writeln!(f, ":")?;
            for &id in &block.nodes {
                writeln!(f, "  {}: {}", id, self.node(id))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BranchData;

    fn diamond() -> Graph {
        let mut graph = Graph::new(1, 0);
        let blocks: Vec<BlockIndex> = (0..4).map(|_| graph.add_block()).collect();
        let origin = NodeOrigin::default();
        let cond = graph.add_node(Op::GetArgumentCount, vec![], origin);
        let branch = graph.add_node(
            Op::Branch(BranchData {
                taken: blocks[1],
                not_taken: blocks[2],
            }),
            vec![Edge::untyped(cond)],
            origin,
        );
        graph.append(blocks[0], cond).unwrap();
        graph.append(blocks[0], branch).unwrap();
        for &side in &blocks[1..3] {
            let jump = graph.add_node(Op::Jump(blocks[3]), vec![], origin);
            graph.append(side, jump).unwrap();
        }
        let ret = graph.add_node(Op::Return, vec![], origin);
        graph.append(blocks[3], ret).unwrap();
        graph.compute_predecessors();
        graph
    }

    #[test]
    fn test_predecessors_and_orders() {
        let graph = diamond();
        assert_eq!(
            graph.block(BlockIndex(3)).unwrap().predecessors,
            vec![BlockIndex(1), BlockIndex(2)]
        );
        assert_eq!(graph.blocks_in_pre_order().len(), 4);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_kill_unreachable() {
        let mut graph = diamond();
        let orphan = graph.add_block();
        let ret = graph.add_node(Op::Return, vec![], NodeOrigin::default());
        graph.append(orphan, ret).unwrap();
        assert_eq!(graph.kill_unreachable_blocks(), 1);
        assert!(graph.block(orphan).is_none());
    }

    #[test]
    fn test_ref_counts_follow_uses() {
        let mut graph = diamond();
        let dead = graph.add_node(Op::GetCallee, vec![], NodeOrigin::default());
        graph.append(BlockIndex(1), dead).unwrap();
        // Keep the terminal last.
        let block = graph.block_mut(BlockIndex(1)).unwrap();
        block.nodes.swap(0, 1);
        graph.compute_ref_counts();
        assert!(!graph.node(dead).should_generate());
        assert!(graph.node(NodeId(0)).should_generate());
    }

    #[test]
    fn test_validate_rejects_missing_terminal() {
        let mut graph = Graph::new(1, 0);
        let block = graph.add_block();
        let node = graph.add_node(Op::GetCallee, vec![], NodeOrigin::default());
        graph.append(block, node).unwrap();
        assert!(matches!(graph.validate(), Err(Error::Malformed { .. })));
    }
}
