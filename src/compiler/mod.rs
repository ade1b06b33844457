//! Compiler infrastructure: the shared context, the passes and their scheduler.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Optimizer Pipeline                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilationContext          Shared, thread-safe state           │
//! │    ├─ graphs                  (GraphId -> Graph)                 │
//! │    ├─ StructureRegistry       (structures, properties, cells)    │
//! │    ├─ ProfilingOracle         (property access classification)   │
//! │    ├─ WatchpointTable         (register-and-get-a-token)         │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint over the pass list         │
//! │                                                                  │
//! │  GraphPass trait             Interface for all passes            │
//! │                                                                  │
//! │  Passes                                                          │
//! │    ├─ StructureRegistrationPass                                  │
//! │    ├─ CfaPass                 (abstract interpretation)          │
//! │    ├─ ConstantFoldingPass                                        │
//! │    ├─ ArgumentsEliminationPass                                   │
//! │    └─ LicmPass                                                   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod oracle;
mod pass;
mod passes;
mod registry;
mod scheduler;
mod watchpoints;

pub use config::OptimizerConfig;
pub use context::{CompilationContext, GraphId};
pub use events::{Event, EventBuilder, EventCategory, EventKind, EventLog, PipelineStats};
pub use oracle::{GetByIdStatus, GetByIdVariant, ProfilingOracle, PutByIdStatus, StructureOracle};
pub use pass::GraphPass;
pub use passes::{
    ArgumentsEliminationPass, CfaPass, ConstantFoldingPass, LicmPass, StructureRegistrationPass,
};
pub use registry::{Registrar, StructureRegistry, TransitionInfo};
pub use scheduler::PassScheduler;
pub use watchpoints::{DesiredWatchpoints, Watchpoint, WatchpointTable, WatchpointToken};
