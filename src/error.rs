use thiserror::Error;

use crate::graph::{BlockIndex, NodeId};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use invariant_error;
pub(crate) use malformed_error;

/// The generic Error type, which covers every failure the optimizer can report.
///
/// Ordinary analysis outcomes are *not* errors: a filter that empties a value's
/// type set reports [`crate::analysis::FiltrationResult::Contradiction`], and an
/// optimization that cannot prove safety simply does not fire. The variants below
/// are reserved for broken input graphs and for bugs in the compiler itself. Any of
/// them aborts the compilation of the graph that raised it; the surrounding driver
/// decides what to fall back to.
///
/// # Error Categories
///
/// ## Graph Shape Errors
/// - [`Error::Malformed`] - The graph violates a structural rule (bad terminal, edge arity)
/// - [`Error::UnknownNode`] - A node id does not name a node of this graph
/// - [`Error::UnknownBlock`] - A block index does not name a live block
/// - [`Error::NotSsa`] - An SSA-only pass was handed a graph in another form
///
/// ## Compiler Bugs
/// - [`Error::InvariantViolation`] - A fatal internal invariant did not hold
///
/// # Examples
///
/// ```rust
/// use dfgopt::Error;
///
/// fn report(err: &Error) -> String {
///     match err {
///         Error::InvariantViolation { message, file, line } => {
///             format!("compiler bug at {}:{}: {}", file, line, message)
///         }
///         other => other.to_string(),
///     }
/// }
/// # let _ = report;
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The graph is structurally damaged.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A fatal compiler invariant was violated.
    ///
    /// Raised when, for example, a loop header has more than one predecessor that it
    /// does not dominate, or a pre-header does not end in a `Jump`. These indicate a
    /// bug in an earlier phase and must never be papered over.
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// Description of the violated invariant
        message: String,
        /// The source file in which the violation was detected
        file: &'static str,
        /// The source line in which the violation was detected
        line: u32,
    },

    /// A node id was used that does not belong to the graph.
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// A block index was used that does not name a live block.
    #[error("Unknown block {0}")]
    UnknownBlock(BlockIndex),

    /// The pass requires the graph to be in SSA form.
    #[error("Pass '{0}' requires a graph in SSA form")]
    NotSsa(&'static str),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
