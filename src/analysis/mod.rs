//! Analyses over the data flow graph.
//!
//! This module holds everything the optimization passes ask questions of: the
//! abstract values the interpreter computes, the heap model that says what each
//! node reads and writes, and the interpreter itself.
//!
//! # Architecture
//!
//! - [`value`] / [`speculation`] - Runtime values and the type lattice over them
//! - [`structure`] - Object shapes, structure sets and their abstract value
//! - [`lattice`] - [`AbstractValue`], the per-node abstract value
//! - [`heap`] / [`clobberize`] - The abstract heap hierarchy and per-node effects
//! - [`clobber_set`] - Heap sets for fast overlap queries
//! - [`state`] - Where the interpreter keeps values: in place or at a block tail
//! - [`interpreter`] - Transfer functions
//! - [`safe_to_execute`] / [`does_gc`] - Per-node safety questions
//!
//! # Usage
//!
//! ```rust,ignore
//! use dfgopt::analysis::{AbstractInterpreter, AbstractState, InPlaceAbstractState};
//!
//! let mut state = InPlaceAbstractState::new(&graph);
//! state.initialize(&mut graph)?;
//! state.begin_basic_block(&mut graph, BlockIndex::ROOT)?;
//! let mut interpreter = AbstractInterpreter::new(&ctx, state);
//! for index in 0..graph.block(BlockIndex::ROOT).map_or(0, |b| b.len()) {
//!     if !interpreter.execute(&mut graph, index)? {
//!         break;
//!     }
//! }
//! ```

pub mod clobber_set;
pub mod clobberize;
pub mod does_gc;
pub mod heap;
pub mod interpreter;
pub mod lattice;
pub mod safe_to_execute;
pub mod speculation;
pub mod state;
pub mod structure;
pub mod value;

pub use clobber_set::{reads_overlap, reads_set, writes_overlap, writes_set, ClobberSet};
pub use clobberize::{
    clobberize, clobbers_heap, converts_untyped_operands, does_writes, effects_of,
    writes_overlap_heap, ClobberizeVisitor, Effects,
};
pub use does_gc::does_gc;
pub use heap::{AbstractHeap, AbstractHeapKind, HeapLocation, LocationKind, PureValue};
pub use interpreter::{boolean_result, AbstractInterpreter};
pub use lattice::{AbstractValue, FiltrationResult, StructureClobberState};
pub use safe_to_execute::safe_to_execute;
pub use speculation::SpeculatedType;
pub use state::{AbstractState, AtTailAbstractState, InPlaceAbstractState};
pub use value::{CellId, CellKind, CellRef, FrozenValue, Value};
