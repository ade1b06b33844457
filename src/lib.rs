// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # dfgopt
//!
//! The optimizing core of a speculative JIT's middle tier. Graphs of typed nodes in
//! SSA form go in; the same graphs come out with constants folded, proved checks
//! removed, property accesses strength-reduced, arguments objects replaced by stack
//! reads and loop-invariant work hoisted into loop pre-headers.
//!
//! ## Features
//!
//! - **Abstract interpretation** - A lattice of types, constants, structure sets and
//!   array modes, propagated to a fixpoint over the control flow graph
//! - **Heap effect model** - Every node's reads and writes over a hierarchy of
//!   abstract heaps, shared by every pass that moves or deletes code
//! - **Constant folding** - Folding, check elimination, access strength reduction and
//!   block clipping from the analysis results
//! - **Arguments elimination** - Escape analysis for arguments objects
//! - **LICM** - Hoisting guarded by dominance, effects and the abstract state
//! - **Event log** - Every transformation recorded for inspection and testing
//!
//! ## Quick Start
//!
//! ```rust
//! use dfgopt::prelude::*;
//!
//! let mut builder = GraphBuilder::new(1, 0);
//! let x = builder.int32(4);
//! let y = builder.int32(5);
//! let sum = builder.add(
//!     Op::ArithAdd(ArithMode::CheckOverflow),
//!     [Edge::new(x, UseKind::Int32), Edge::new(y, UseKind::Int32)],
//! );
//! builder.ret(Edge::untyped(sum));
//!
//! let ctx = CompilationContext::new();
//! let id = ctx.add_graph(builder.finish()?);
//! let mut scheduler = PassScheduler::with_default_pipeline(&ctx.config);
//! scheduler.run_pipeline(&ctx)?;
//!
//! let graph = ctx.take_graph(id).expect("graph was added");
//! assert!(graph.node(sum).has_constant());
//! assert!(ctx.events.has(EventKind::ConstantFolded));
//! # Ok::<(), dfgopt::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`graph`] - Nodes, edges, blocks, inline frames and the graph itself
//! - [`analysis`] - Abstract values, the heap model and the abstract interpreter
//! - [`compiler`] - The passes, the scheduler and the shared compilation context
//! - [`utils`] - Bit sets, traversals and the dominator tree
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Analysis outcomes are values, not errors. The [`Error`] variants report broken
//! input graphs and violated internal invariants, either of which aborts the
//! compilation of the graph that raised it:
//!
//! ```rust
//! use dfgopt::{prelude::*, Error};
//!
//! let mut builder = GraphBuilder::new(1, 0);
//! builder.int32(1);
//! match builder.finish() {
//!     Err(Error::Malformed { message, .. }) => assert!(message.contains("terminal")),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod compiler;
pub mod graph;
pub mod utils;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use dfgopt::prelude::*;
///
/// let ctx = CompilationContext::new().with_config(OptimizerConfig::fold_only());
/// assert!(!ctx.config.licm_enabled);
/// ```
pub mod prelude;

/// `dfgopt` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dfgopt` Error type
///
/// The main error type for all operations in this crate. Every variant aborts the
/// compilation of the graph that raised it.
pub use error::Error;
