//! Built-in optimizer passes.
//!
//! Each pass operates on a graph in SSA form and reports whether it changed it.
//! The [`PassScheduler`](crate::compiler::PassScheduler) runs them in order and
//! re-runs the list until nothing changes.
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`StructureRegistrationPass`] | Registers every structure the graph mentions |
//! | [`CfaPass`] | Control-flow abstract interpretation to a fixpoint |
//! | [`ConstantFoldingPass`] | Folds constants, removes proved checks, strength-reduces accesses |
//! | [`ArgumentsEliminationPass`] | Replaces non-escaping arguments objects with stack reads |
//! | [`LicmPass`] | Hoists loop-invariant nodes into pre-headers |
//!
//! Constant folding and LICM read the per-block abstract states that [`CfaPass`]
//! leaves behind, so the analysis must run before each of them.

mod arguments_elimination;
mod cfa;
mod constant_folding;
mod licm;
mod structure_registration;

pub use arguments_elimination::ArgumentsEliminationPass;
pub use cfa::CfaPass;
pub use constant_folding::ConstantFoldingPass;
pub use licm::LicmPass;
pub use structure_registration::StructureRegistrationPass;
