//! Block dominance over a [`Graph`].

use crate::{
    graph::{BlockIndex, Graph},
    utils::DominatorTree,
};

/// The dominator tree of a graph's blocks, rooted at the root block.
#[derive(Debug, Clone)]
pub struct Dominators {
    tree: DominatorTree,
}

impl Dominators {
    /// Computes dominance for the current control flow of `graph`.
    #[must_use]
    pub fn compute(graph: &Graph) -> Self {
        Self {
            tree: DominatorTree::compute(graph, BlockIndex::ROOT.0),
        }
    }

    /// `true` if `a` dominates `b`.
    #[must_use]
    pub fn dominates(&self, a: BlockIndex, b: BlockIndex) -> bool {
        self.tree.dominates(a.0, b.0)
    }

    /// `true` if `a` dominates `b` and they differ.
    #[must_use]
    pub fn strictly_dominates(&self, a: BlockIndex, b: BlockIndex) -> bool {
        self.tree.strictly_dominates(a.0, b.0)
    }

    /// The immediate dominator of `block`.
    #[must_use]
    pub fn immediate_dominator(&self, block: BlockIndex) -> Option<BlockIndex> {
        self.tree.immediate_dominator(block.0).map(BlockIndex)
    }
}
