//! # dfgopt Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dfgopt library. Import this module to get quick access to the essential
//! types for building graphs and running the optimizer over them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dfgopt operations
pub use crate::Error;

/// The result type used throughout dfgopt
pub use crate::Result;

// ================================================================================================
// Graph Representation
// ================================================================================================

/// The graph, its blocks and nodes
pub use crate::graph::{BasicBlock, BlockIndex, Graph, GraphBuilder, Node, NodeId};

/// Operations and their payloads
pub use crate::graph::{
    ArithMode, ArrayMode, ArrayType, CallVarargsData, LoadVarargsData, NodeType, Op,
    StorageAccessData,
};

/// Edges and the checks they carry
pub use crate::graph::{Edge, UseKind};

/// Frames, stack slots and code origins
pub use crate::graph::{
    CodeOrigin, FlushFormat, InlineCallFrame, NodeOrigin, StackAccessData, VirtualRegister,
};

// ================================================================================================
// Analysis
// ================================================================================================

/// Abstract values and the types they range over
pub use crate::analysis::{AbstractValue, FrozenValue, SpeculatedType, Value};

/// Object shapes
pub use crate::analysis::structure::{PropertyId, Structure, StructureSet};

// ================================================================================================
// Compiler
// ================================================================================================

/// Compilation state shared by every pass
pub use crate::compiler::{CompilationContext, OptimizerConfig};

/// Passes and the scheduler running them
pub use crate::compiler::{
    ArgumentsEliminationPass, CfaPass, ConstantFoldingPass, GraphPass, LicmPass, PassScheduler,
    StructureRegistrationPass,
};

/// The transformation log
pub use crate::compiler::{Event, EventKind, EventLog};
