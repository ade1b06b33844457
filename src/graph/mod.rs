//! The data-flow graph the optimizer works on.
//!
//! A [`Graph`] owns a node arena and a list of [`BasicBlock`]s. Each block lists the
//! nodes it executes in order and ends with a terminal (`Jump`, `Branch`, `Return`,
//! `Unreachable` or a tail call). Nodes refer to their operands through [`Edge`]s,
//! which also record the speculation check each use performs.
//!
//! Supporting analyses live next to the graph:
//!
//! - [`Dominators`] - block dominance
//! - [`NaturalLoops`] - loop bodies and nesting
//! - [`liveness`] - SSA liveness and kill points
//! - [`InsertionSet`] - deferred node insertion while walking a block
//! - [`GraphBuilder`] - convenient graph construction

mod array_mode;
mod block;
mod builder;
mod dfg;
mod dominators;
mod edge;
mod ids;
mod insertion;
pub mod liveness;
mod loops;
mod node;
mod op;
mod stack;

pub use array_mode::{ArrayClass, ArrayMode, ArrayModes, ArraySpeculation, ArrayType, IndexingShape, IndexingType};
pub use block::{BasicBlock, SsaData};
pub use builder::GraphBuilder;
pub use dfg::{Graph, GraphForm, StructureRegistrationState};
pub use dominators::Dominators;
pub use edge::{Edge, ProofStatus, UseKind};
pub use ids::{BlockIndex, InlineFrameId, NodeId};
pub use insertion::InsertionSet;
pub use loops::{NaturalLoop, NaturalLoops};
pub use node::Node;
pub use op::{
    ArithMode, CallVarargsData, GetByOffsetMethod, LoadVarargsData, MultiGetByOffsetCase,
    MultiGetByOffsetData, MultiPutByOffsetData, NodeType, Op, PutByIdVariant, PutByIdVariantKind,
    RoundingMode, StorageAccessData,
};
pub use stack::{
    BranchData, BranchDirection, CodeOrigin, FlushFormat, InlineCallFrame, NodeOrigin, Operands,
    StackAccessData, VirtualRegister, ARGUMENT_COUNT_SLOT, CALLEE_SLOT, CALL_FRAME_HEADER_SIZE,
};
