//! Small generic building blocks shared by the graph model and the passes.

mod bitset;
mod dominators;
pub mod graph;

pub use bitset::{BitSet, BitSetIter};
pub use dominators::DominatorTree;
