//! Basic blocks and the per-block analysis results stored on them.

use std::collections::{BTreeSet, HashMap};

use crate::{
    analysis::{AbstractValue, StructureClobberState},
    graph::{BlockIndex, BranchDirection, NodeId, Operands},
};

/// SSA-form data of a block: live nodes at the boundaries and their abstract values.
#[derive(Debug, Clone, Default)]
pub struct SsaData {
    /// Nodes live on entry.
    pub live_at_head: BTreeSet<NodeId>,
    /// Nodes live on exit.
    pub live_at_tail: BTreeSet<NodeId>,
    /// Abstract values of the live-at-head nodes.
    pub values_at_head: HashMap<NodeId, AbstractValue>,
    /// Abstract values of the live-at-tail nodes.
    pub values_at_tail: HashMap<NodeId, AbstractValue>,
}

/// A straight-line sequence of nodes ending in a terminal.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// This block's index.
    pub index: BlockIndex,
    /// Nodes in execution order; the last one is the terminal.
    pub nodes: Vec<NodeId>,
    /// Blocks that branch here.
    pub predecessors: Vec<BlockIndex>,
    /// Set by reachability analysis.
    pub is_reachable: bool,

    /// The abstract interpreter reached this block.
    pub cfa_has_visited: bool,
    /// The block's head state changed and it must be interpreted again.
    pub cfa_should_revisit: bool,
    /// Interpreting the block found something to constant-fold.
    pub cfa_found_constants: bool,
    /// Interpretation reached the end of the block without a contradiction.
    pub cfa_did_finish: bool,
    /// The direction of the block's branch, if it ends in one.
    pub cfa_branch_direction: BranchDirection,
    /// Structure clobbering state on entry.
    pub cfa_structure_clobber_state_at_head: StructureClobberState,
    /// Structure clobbering state on exit.
    pub cfa_structure_clobber_state_at_tail: StructureClobberState,
    /// Stack slot values on entry.
    pub values_at_head: Operands<AbstractValue>,
    /// Stack slot values on exit.
    pub values_at_tail: Operands<AbstractValue>,

    /// SSA liveness and values.
    pub ssa: SsaData,
}

impl BasicBlock {
    /// Creates an empty block for a frame with the given shape.
    #[must_use]
    pub fn new(index: BlockIndex, num_arguments: usize, num_locals: usize) -> Self {
        Self {
            index,
            nodes: Vec::new(),
            predecessors: Vec::new(),
            is_reachable: false,
            cfa_has_visited: false,
            cfa_should_revisit: false,
            cfa_found_constants: false,
            cfa_did_finish: false,
            cfa_branch_direction: BranchDirection::InvalidBranchDirection,
            cfa_structure_clobber_state_at_head: StructureClobberState::StructuresAreWatched,
            cfa_structure_clobber_state_at_tail: StructureClobberState::StructuresAreWatched,
            values_at_head: Operands::new(num_arguments, num_locals, AbstractValue::default()),
            values_at_tail: Operands::new(num_arguments, num_locals, AbstractValue::default()),
            ssa: SsaData::default(),
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the block has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node at `index`.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    /// The last node, which is the terminal in a well-formed block.
    #[must_use]
    pub fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Index of `node` within this block.
    #[must_use]
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }

    /// Clears all analysis results.
    pub fn reset_cfa(&mut self) {
        self.cfa_has_visited = false;
        self.cfa_should_revisit = false;
        self.cfa_found_constants = false;
        self.cfa_did_finish = false;
        self.cfa_branch_direction = BranchDirection::InvalidBranchDirection;
        self.values_at_head.fill(AbstractValue::default());
        self.values_at_tail.fill(AbstractValue::default());
        self.ssa.values_at_head.clear();
        self.ssa.values_at_tail.clear();
    }
}
