//! Frame layout: virtual registers, per-operand tables, inline call frames and
//! code origins.
//!
//! A frame is addressed through [`VirtualRegister`]s. Non-negative registers below
//! [`CALL_FRAME_HEADER_SIZE`] are header slots, registers at or above it are
//! arguments (argument 0 is `this`), and negative registers are locals. Inlined
//! callees live inside the caller's locals at a fixed, negative `stack_offset`, so
//! their header and argument registers are caller locals.

use std::fmt;

use crate::{
    analysis::SpeculatedType,
    graph::{BlockIndex, InlineFrameId},
};

/// Number of header slots preceding the arguments.
pub const CALL_FRAME_HEADER_SIZE: i32 = 5;

/// Header slot holding the callee.
pub const CALLEE_SLOT: i32 = 3;

/// Header slot holding the argument count (including `this`).
pub const ARGUMENT_COUNT_SLOT: i32 = 4;

/// A slot in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualRegister(pub i32);

impl VirtualRegister {
    /// Register of argument `index` (0 is `this`).
    #[must_use]
    pub fn argument(index: usize) -> Self {
        Self(CALL_FRAME_HEADER_SIZE + index as i32)
    }

    /// Register of local `index`.
    #[must_use]
    pub fn local(index: usize) -> Self {
        Self(-1 - index as i32)
    }

    /// The callee header slot.
    #[must_use]
    pub fn callee() -> Self {
        Self(CALLEE_SLOT)
    }

    /// The argument-count header slot.
    #[must_use]
    pub fn argument_count() -> Self {
        Self(ARGUMENT_COUNT_SLOT)
    }

    /// `true` for local slots.
    #[must_use]
    pub fn is_local(self) -> bool {
        self.0 < 0
    }

    /// `true` for argument slots.
    #[must_use]
    pub fn is_argument(self) -> bool {
        self.0 >= CALL_FRAME_HEADER_SIZE
    }

    /// `true` for header slots.
    #[must_use]
    pub fn is_header(self) -> bool {
        (0..CALL_FRAME_HEADER_SIZE).contains(&self.0)
    }

    /// The local index, for local slots.
    #[must_use]
    pub fn to_local(self) -> Option<usize> {
        self.is_local().then(|| (-1 - self.0) as usize)
    }

    /// The argument index, for argument slots.
    #[must_use]
    pub fn to_argument(self) -> Option<usize> {
        self.is_argument()
            .then(|| (self.0 - CALL_FRAME_HEADER_SIZE) as usize)
    }

    /// This register shifted by a frame offset.
    #[must_use]
    pub fn offset(self, by: i32) -> Self {
        Self(self.0 + by)
    }
}

impl fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(local) = self.to_local() {
            write!(f, "loc{local}")
        } else if let Some(argument) = self.to_argument() {
            write!(f, "arg{argument}")
        } else {
            write!(f, "hdr{}", self.0)
        }
    }
}

/// A table with one entry per argument and per local of a frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operands<T> {
    arguments: Vec<T>,
    locals: Vec<T>,
}

impl<T: Clone> Operands<T> {
    /// A table of `num_arguments` arguments and `num_locals` locals, all `fill`.
    #[must_use]
    pub fn new(num_arguments: usize, num_locals: usize, fill: T) -> Self {
        Self {
            arguments: vec![fill.clone(); num_arguments],
            locals: vec![fill; num_locals],
        }
    }

    /// Overwrites every entry with `value`.
    pub fn fill(&mut self, value: T) {
        for slot in self.arguments.iter_mut().chain(self.locals.iter_mut()) {
            *slot = value.clone();
        }
    }
}

impl<T> Operands<T> {
    /// Number of argument entries.
    #[must_use]
    pub fn num_arguments(&self) -> usize {
        self.arguments.len()
    }

    /// Number of local entries.
    #[must_use]
    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arguments.len() + self.locals.len()
    }

    /// `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry for argument `index`.
    #[must_use]
    pub fn argument(&self, index: usize) -> Option<&T> {
        self.arguments.get(index)
    }

    /// Mutable entry for argument `index`.
    pub fn argument_mut(&mut self, index: usize) -> Option<&mut T> {
        self.arguments.get_mut(index)
    }

    /// Entry for local `index`.
    #[must_use]
    pub fn local(&self, index: usize) -> Option<&T> {
        self.locals.get(index)
    }

    /// Entry for a register. Header slots have no entry.
    #[must_use]
    pub fn operand(&self, register: VirtualRegister) -> Option<&T> {
        if let Some(local) = register.to_local() {
            self.locals.get(local)
        } else {
            register.to_argument().and_then(|a| self.arguments.get(a))
        }
    }

    /// Mutable entry for a register.
    pub fn operand_mut(&mut self, register: VirtualRegister) -> Option<&mut T> {
        if let Some(local) = register.to_local() {
            self.locals.get_mut(local)
        } else {
            register.to_argument().and_then(|a| self.arguments.get_mut(a))
        }
    }

    /// Entry at flat index `index`: arguments first, then locals.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&T> {
        if index < self.arguments.len() {
            self.arguments.get(index)
        } else {
            self.locals.get(index - self.arguments.len())
        }
    }

    /// Mutable entry at flat index `index`.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        let arguments = self.arguments.len();
        if index < arguments {
            self.arguments.get_mut(index)
        } else {
            self.locals.get_mut(index - arguments)
        }
    }

    /// Register of the entry at flat index `index`.
    #[must_use]
    pub fn register_for_index(&self, index: usize) -> VirtualRegister {
        if index < self.arguments.len() {
            VirtualRegister::argument(index)
        } else {
            VirtualRegister::local(index - self.arguments.len())
        }
    }

    /// Iterates over all entries, arguments first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.arguments.iter().chain(self.locals.iter())
    }

    /// Iterates mutably over all entries, arguments first.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.arguments.iter_mut().chain(self.locals.iter_mut())
    }
}

/// The representation a stack slot is flushed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlushFormat {
    /// A boxed value of any type.
    #[default]
    JSValue,
    /// An unboxed int32.
    Int32,
    /// An unboxed boolean.
    Boolean,
    /// A cell pointer.
    Cell,
    /// An unboxed double.
    Double,
}

impl FlushFormat {
    /// The types a slot flushed in this format can hold.
    #[must_use]
    pub fn type_filter(self) -> SpeculatedType {
        match self {
            FlushFormat::JSValue => SpeculatedType::HEAP_TOP,
            FlushFormat::Int32 => SpeculatedType::INT32,
            FlushFormat::Boolean => SpeculatedType::BOOLEAN,
            FlushFormat::Cell => SpeculatedType::CELL,
            FlushFormat::Double => SpeculatedType::FULL_DOUBLE,
        }
    }
}

/// Payload of `GetStack` and `PutStack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackAccessData {
    /// The accessed slot, in machine-frame coordinates.
    pub local: VirtualRegister,
    /// The slot's representation.
    pub format: FlushFormat,
}

impl StackAccessData {
    /// A boxed access to `local`.
    #[must_use]
    pub fn new(local: VirtualRegister) -> Self {
        Self {
            local,
            format: FlushFormat::JSValue,
        }
    }
}

/// A callee inlined into the machine frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCallFrame {
    /// Offset of the callee frame within the machine frame.
    pub stack_offset: i32,
    /// Number of arguments passed, including `this`.
    pub argument_count_including_this: usize,
    /// `true` if the call was a varargs call, so the count is only known at run time.
    pub is_varargs: bool,
    /// `true` if the callee is a closure, so its callee slot is live.
    pub is_closure_call: bool,
    /// Origin of the call in the caller.
    pub caller: CodeOrigin,
}

impl InlineCallFrame {
    /// Register of argument `index` in machine-frame coordinates.
    #[must_use]
    pub fn argument_register(&self, index: usize) -> VirtualRegister {
        VirtualRegister::argument(index).offset(self.stack_offset)
    }

    /// Callee slot in machine-frame coordinates.
    #[must_use]
    pub fn callee_register(&self) -> VirtualRegister {
        VirtualRegister::callee().offset(self.stack_offset)
    }

    /// Argument-count slot in machine-frame coordinates.
    #[must_use]
    pub fn argument_count_register(&self) -> VirtualRegister {
        VirtualRegister::argument_count().offset(self.stack_offset)
    }
}

/// A bytecode position, optionally inside an inlined callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CodeOrigin {
    /// Bytecode index within the (possibly inlined) code block.
    pub bytecode_index: u32,
    /// The inline frame, or `None` for the machine frame.
    pub inline_call_frame: Option<InlineFrameId>,
}

impl CodeOrigin {
    /// An origin in the machine frame.
    #[must_use]
    pub fn new(bytecode_index: u32) -> Self {
        Self {
            bytecode_index,
            inline_call_frame: None,
        }
    }

    /// An origin inside an inlined callee.
    #[must_use]
    pub fn inlined(bytecode_index: u32, frame: InlineFrameId) -> Self {
        Self {
            bytecode_index,
            inline_call_frame: Some(frame),
        }
    }
}

/// Where a node came from, and where execution resumes if it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeOrigin {
    /// The position whose semantics the node implements.
    pub semantic: CodeOrigin,
    /// The position an OSR exit from this node resumes at.
    pub for_exit: CodeOrigin,
}

impl NodeOrigin {
    /// An origin whose semantic and exit positions coincide.
    #[must_use]
    pub fn new(origin: CodeOrigin) -> Self {
        Self {
            semantic: origin,
            for_exit: origin,
        }
    }

    /// Returns a copy with a different exit position.
    #[must_use]
    pub fn with_for_exit(mut self, for_exit: CodeOrigin) -> Self {
        self.for_exit = for_exit;
        self
    }
}

/// Which way the abstract interpreter proved a block's branch goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchDirection {
    /// The block ends in something other than a branch, or was not analyzed.
    #[default]
    InvalidBranchDirection,
    /// Always taken.
    TakeTrue,
    /// Never taken.
    TakeFalse,
    /// Could go either way.
    TakeBoth,
}

impl BranchDirection {
    /// `true` if the branch is decided.
    #[must_use]
    pub fn is_known(self) -> bool {
        matches!(self, BranchDirection::TakeTrue | BranchDirection::TakeFalse)
    }

    /// The direction for a condition known to be `value`.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value {
            BranchDirection::TakeTrue
        } else {
            BranchDirection::TakeFalse
        }
    }
}

/// Payload of `Branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchData {
    /// Successor when the condition is truthy.
    pub taken: BlockIndex,
    /// Successor when the condition is falsy.
    pub not_taken: BlockIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_classes() {
        assert_eq!(VirtualRegister::argument(0).to_argument(), Some(0));
        assert_eq!(VirtualRegister::local(2).to_local(), Some(2));
        assert!(VirtualRegister::callee().is_header());
        assert_eq!(VirtualRegister::local(0).to_string(), "loc0");
    }

    #[test]
    fn test_inline_frame_registers_are_caller_locals() {
        let frame = InlineCallFrame {
            stack_offset: -20,
            argument_count_including_this: 3,
            is_varargs: false,
            is_closure_call: false,
            caller: CodeOrigin::new(0),
        };
        assert!(frame.argument_register(1).is_local());
        assert!(frame.argument_count_register().is_local());
    }

    #[test]
    fn test_operands_addressing() {
        let mut operands = Operands::new(2, 3, 0u8);
        *operands.operand_mut(VirtualRegister::local(1)).unwrap() = 7;
        *operands.operand_mut(VirtualRegister::argument(1)).unwrap() = 3;
        assert_eq!(operands.at(3), Some(&7));
        assert_eq!(operands.at(1), Some(&3));
        assert_eq!(operands.register_for_index(3), VirtualRegister::local(1));
        assert!(operands.operand(VirtualRegister::callee()).is_none());
    }
}
