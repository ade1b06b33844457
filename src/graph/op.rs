//! Node opcodes and their payloads.
//!
//! [`Op`] carries the per-node data (constants, stack slots, structure sets, array
//! modes). Its payload-free twin [`NodeType`] is derived with `strum` and is what
//! pure-value keys, statistics and dumps use.

use std::fmt;

use strum::{EnumDiscriminants, EnumIter};

use crate::{
    analysis::{
        structure::{PropertyId, PropertyOffset, Structure, StructureSet, Transition},
        FrozenValue,
    },
    graph::{ArrayMode, BlockIndex, BranchData, NodeId, StackAccessData, VirtualRegister},
};

/// Overflow and negative-zero handling of an arithmetic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithMode {
    /// Wraps on overflow; `-0` is not distinguished.
    Unchecked,
    /// Exits on overflow; `-0` is not distinguished.
    CheckOverflow,
    /// Exits on overflow and on a `-0` result.
    CheckOverflowAndNegativeZero,
    /// Produces a double on overflow.
    DoOverflow,
}

impl ArithMode {
    /// `true` if an int32 overflow must not wrap.
    #[must_use]
    pub fn should_check_overflow(self) -> bool {
        matches!(
            self,
            ArithMode::CheckOverflow | ArithMode::CheckOverflowAndNegativeZero
        )
    }

    /// `true` if a `-0` result must be observed.
    #[must_use]
    pub fn should_check_negative_zero(self) -> bool {
        matches!(self, ArithMode::CheckOverflowAndNegativeZero)
    }

    /// Stable encoding for pure-value keys.
    #[must_use]
    pub fn bits(self) -> u64 {
        self as u64
    }
}

/// How `ArithRound` produces its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    /// Produces a double.
    Double,
    /// Produces an int32, exiting if the result is not one.
    Int32,
    /// Produces an int32, exiting if the result is not one or is `-0`.
    Int32WithNegativeZeroCheck,
}

impl RoundingMode {
    /// `true` for int32-producing modes.
    #[must_use]
    pub fn produces_integer(self) -> bool {
        !matches!(self, RoundingMode::Double)
    }
}

/// Payload of `GetByOffset` and `PutByOffset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageAccessData {
    /// Slot of the property.
    pub offset: PropertyOffset,
    /// Name of the property.
    pub identifier: PropertyId,
}

/// How one case of a `MultiGetByOffset` produces its value.
#[derive(Debug, Clone, PartialEq)]
pub enum GetByOffsetMethod {
    /// The property is a known constant.
    Constant(FrozenValue),
    /// The property is loaded from the given slot.
    Load(PropertyOffset),
}

/// One structure-dispatched case of a `MultiGetByOffset`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiGetByOffsetCase {
    /// Structures handled by this case.
    pub set: StructureSet,
    /// How the value is produced.
    pub method: GetByOffsetMethod,
}

/// Payload of `MultiGetByOffset`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiGetByOffsetData {
    /// Name of the property.
    pub identifier: PropertyId,
    /// Cases, checked in order.
    pub cases: Vec<MultiGetByOffsetCase>,
}

/// Kind of a property store variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PutByIdVariantKind {
    /// Overwrites an existing property.
    Replace,
    /// Adds a property, transitioning the structure.
    Transition,
}

/// One structure-dispatched way of performing a property store.
#[derive(Debug, Clone, PartialEq)]
pub struct PutByIdVariant {
    /// Replace or transition.
    pub kind: PutByIdVariantKind,
    /// Structures handled by this variant.
    pub old_structure: StructureSet,
    /// Structure after a transition.
    pub new_structure: Option<Structure>,
    /// Slot of the property.
    pub offset: PropertyOffset,
    /// `true` if the transition grows the out-of-line storage.
    pub reallocates_storage: bool,
}

impl PutByIdVariant {
    /// A replacing store.
    #[must_use]
    pub fn replace(old_structure: StructureSet, offset: PropertyOffset) -> Self {
        Self {
            kind: PutByIdVariantKind::Replace,
            old_structure,
            new_structure: None,
            offset,
            reallocates_storage: false,
        }
    }

    /// A transitioning store from `old` to `new`.
    #[must_use]
    pub fn transition(old: Structure, new: Structure, offset: PropertyOffset, reallocates: bool) -> Self {
        Self {
            kind: PutByIdVariantKind::Transition,
            old_structure: StructureSet::single(old),
            new_structure: Some(new),
            offset,
            reallocates_storage: reallocates,
        }
    }

    /// The single structure a transition starts from.
    #[must_use]
    pub fn old_structure_for_transition(&self) -> Option<Structure> {
        self.old_structure.only_structure()
    }

    /// The transition this variant performs, if any.
    #[must_use]
    pub fn as_transition(&self) -> Option<Transition> {
        match (self.kind, self.old_structure_for_transition(), self.new_structure) {
            (PutByIdVariantKind::Transition, Some(previous), Some(next)) => {
                Some(Transition { previous, next })
            }
            _ => None,
        }
    }
}

/// Payload of `MultiPutByOffset`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPutByOffsetData {
    /// Name of the property.
    pub identifier: PropertyId,
    /// Variants, checked in order.
    pub variants: Vec<PutByIdVariant>,
}

impl MultiPutByOffsetData {
    /// `true` if some variant transitions.
    #[must_use]
    pub fn writes_structures(&self) -> bool {
        self.variants
            .iter()
            .any(|v| v.kind == PutByIdVariantKind::Transition)
    }

    /// `true` if some variant reallocates the out-of-line storage.
    #[must_use]
    pub fn reallocates_storage(&self) -> bool {
        self.variants.iter().any(|v| v.reallocates_storage)
    }
}

/// Payload of `LoadVarargs` and `ForwardVarargs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadVarargsData {
    /// First slot written.
    pub start: VirtualRegister,
    /// Slot receiving the argument count (including `this`).
    pub count: VirtualRegister,
    /// Number of leading source arguments skipped.
    pub offset: u32,
    /// Slots available at `start`, plus one for `this`.
    pub limit: u32,
    /// Minimum count; missing arguments are filled with `undefined`.
    pub mandatory_minimum: u32,
}

/// Payload of the varargs call family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallVarargsData {
    /// Number of leading source arguments skipped.
    pub first_var_arg_offset: u32,
}

/// The operation a node performs.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(NodeType))]
#[strum_discriminants(derive(Hash, EnumIter, strum::Display))]
#[strum_discriminants(doc = "The opcode of a node, without its payload.")]
#[strum_discriminants(allow(missing_docs))]
#[allow(missing_docs)]
pub enum Op {
    // Constants and SSA plumbing.
    JSConstant(FrozenValue),
    Identity,
    Phi,
    Upsilon { phi: NodeId },
    BottomValue,
    Check,

    // Frame access.
    GetCallee,
    GetArgumentCount,
    GetStack(StackAccessData),
    PutStack(StackAccessData),
    MovHint(VirtualRegister),
    KillStack(VirtualRegister),

    // Arithmetic.
    ArithAdd(ArithMode),
    ArithSub(ArithMode),
    ArithMul(ArithMode),
    ArithDiv(ArithMode),
    ArithMod(ArithMode),
    ArithNegate(ArithMode),
    ArithAbs(ArithMode),
    ArithMin,
    ArithMax,
    ArithSqrt,
    ArithRound(RoundingMode),
    ValueAdd,
    BitAnd,
    BitOr,
    BitXor,
    BitLShift,
    BitRShift,
    BitURShift,
    UInt32ToNumber(ArithMode),
    ValueToInt32,
    DoubleRep,
    ValueRep,

    // Comparison and logic.
    CompareLess,
    CompareLessEq,
    CompareGreater,
    CompareGreaterEq,
    CompareEq,
    CompareStrictEq,
    LogicalNot,

    // Speculation checks.
    CheckStructure(StructureSet),
    CheckCell(FrozenValue),
    CheckArray(ArrayMode),
    CheckInBounds,

    // Property and element access.
    GetById(PropertyId),
    PutById(PropertyId),
    GetByOffset(StorageAccessData),
    PutByOffset(StorageAccessData),
    MultiGetByOffset(MultiGetByOffsetData),
    MultiPutByOffset(MultiPutByOffsetData),
    PutStructure(Transition),
    GetButterfly,
    GetByVal(ArrayMode),
    PutByVal(ArrayMode),
    GetArrayLength(ArrayMode),

    // Allocation and arguments objects.
    NewObject(Structure),
    CreateDirectArguments,
    CreateClonedArguments,
    PhantomDirectArguments,
    PhantomClonedArguments,
    GetFromArguments(u32),
    PutToArguments(u32),
    GetMyArgumentByVal,
    LoadVarargs(LoadVarargsData),
    ForwardVarargs(LoadVarargsData),

    // Calls.
    Call,
    Construct,
    TailCall,
    CallVarargs(CallVarargsData),
    ConstructVarargs(CallVarargsData),
    TailCallVarargs(CallVarargsData),
    CallForwardVarargs(CallVarargsData),
    ConstructForwardVarargs(CallVarargsData),
    TailCallForwardVarargs(CallVarargsData),

    // Control.
    Jump(BlockIndex),
    Branch(BranchData),
    Return,
    Unreachable,
    ForceOSRExit,
    InvalidationPoint,
    LoopHint,
}

impl Op {
    /// The payload-free opcode.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        NodeType::from(self)
    }

    /// The constant, for `JSConstant`.
    #[must_use]
    pub fn constant(&self) -> Option<FrozenValue> {
        match self {
            Op::JSConstant(value) => Some(*value),
            _ => None,
        }
    }

    /// The arithmetic mode, for nodes that have one.
    #[must_use]
    pub fn arith_mode(&self) -> Option<ArithMode> {
        match self {
            Op::ArithAdd(mode)
            | Op::ArithSub(mode)
            | Op::ArithMul(mode)
            | Op::ArithDiv(mode)
            | Op::ArithMod(mode)
            | Op::ArithNegate(mode)
            | Op::ArithAbs(mode)
            | Op::UInt32ToNumber(mode) => Some(*mode),
            _ => None,
        }
    }

    /// The array mode, for indexed accesses.
    #[must_use]
    pub fn array_mode(&self) -> Option<ArrayMode> {
        match self {
            Op::CheckArray(mode)
            | Op::GetByVal(mode)
            | Op::PutByVal(mode)
            | Op::GetArrayLength(mode) => Some(*mode),
            _ => None,
        }
    }

    /// The varargs payload, for `LoadVarargs` and `ForwardVarargs`.
    #[must_use]
    pub fn load_varargs_data(&self) -> Option<LoadVarargsData> {
        match self {
            Op::LoadVarargs(data) | Op::ForwardVarargs(data) => Some(*data),
            _ => None,
        }
    }

    /// The varargs call payload.
    #[must_use]
    pub fn call_varargs_data(&self) -> Option<CallVarargsData> {
        match self {
            Op::CallVarargs(data)
            | Op::ConstructVarargs(data)
            | Op::TailCallVarargs(data)
            | Op::CallForwardVarargs(data)
            | Op::ConstructForwardVarargs(data)
            | Op::TailCallForwardVarargs(data) => Some(*data),
            _ => None,
        }
    }

    /// Successor blocks of a terminal.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockIndex> {
        match self {
            Op::Jump(target) => vec![*target],
            Op::Branch(data) => vec![data.taken, data.not_taken],
            _ => Vec::new(),
        }
    }
}

impl NodeType {
    /// `true` for nodes that end a block.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeType::Jump
                | NodeType::Branch
                | NodeType::Return
                | NodeType::Unreachable
                | NodeType::TailCall
                | NodeType::TailCallVarargs
                | NodeType::TailCallForwardVarargs
        )
    }

    /// `true` for nodes kept alive regardless of uses.
    #[must_use]
    pub fn must_generate(self) -> bool {
        matches!(
            self,
            NodeType::Upsilon
                | NodeType::Check
                | NodeType::PutStack
                | NodeType::MovHint
                | NodeType::KillStack
                | NodeType::CheckStructure
                | NodeType::CheckCell
                | NodeType::CheckArray
                | NodeType::CheckInBounds
                | NodeType::PutById
                | NodeType::PutByOffset
                | NodeType::MultiPutByOffset
                | NodeType::PutStructure
                | NodeType::PutByVal
                | NodeType::PutToArguments
                | NodeType::LoadVarargs
                | NodeType::ForwardVarargs
                | NodeType::Call
                | NodeType::Construct
                | NodeType::CallVarargs
                | NodeType::ConstructVarargs
                | NodeType::CallForwardVarargs
                | NodeType::ConstructForwardVarargs
                | NodeType::ValueAdd
                | NodeType::GetById
                | NodeType::ForceOSRExit
                | NodeType::InvalidationPoint
                | NodeType::LoopHint
        ) || self.is_terminal()
    }

    /// `true` for nodes that produce a value.
    #[must_use]
    pub fn has_result(self) -> bool {
        !matches!(
            self,
            NodeType::Upsilon
                | NodeType::Check
                | NodeType::PutStack
                | NodeType::MovHint
                | NodeType::KillStack
                | NodeType::CheckStructure
                | NodeType::CheckCell
                | NodeType::CheckArray
                | NodeType::CheckInBounds
                | NodeType::PutById
                | NodeType::PutByOffset
                | NodeType::MultiPutByOffset
                | NodeType::PutStructure
                | NodeType::PutByVal
                | NodeType::PutToArguments
                | NodeType::LoadVarargs
                | NodeType::ForwardVarargs
                | NodeType::ForceOSRExit
                | NodeType::InvalidationPoint
                | NodeType::LoopHint
        ) && !self.is_terminal()
    }

    /// `true` for the call family, including tail calls.
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(
            self,
            NodeType::Call
                | NodeType::Construct
                | NodeType::TailCall
                | NodeType::CallVarargs
                | NodeType::ConstructVarargs
                | NodeType::TailCallVarargs
                | NodeType::CallForwardVarargs
                | NodeType::ConstructForwardVarargs
                | NodeType::TailCallForwardVarargs
        )
    }

    /// `true` for `CreateDirectArguments` and `CreateClonedArguments`.
    #[must_use]
    pub fn is_arguments_allocation(self) -> bool {
        matches!(
            self,
            NodeType::CreateDirectArguments | NodeType::CreateClonedArguments
        )
    }

    /// `true` for the phantom forms of the arguments allocations.
    #[must_use]
    pub fn is_phantom_allocation(self) -> bool {
        matches!(
            self,
            NodeType::PhantomDirectArguments | NodeType::PhantomClonedArguments
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_type())?;
        match self {
            Op::JSConstant(value) | Op::CheckCell(value) => write!(f, "({value})"),
            Op::Upsilon { phi } => write!(f, "(^{phi})"),
            Op::GetStack(data) | Op::PutStack(data) => write!(f, "({}, {:?})", data.local, data.format),
            Op::MovHint(reg) | Op::KillStack(reg) => write!(f, "({reg})"),
            Op::CheckStructure(set) => write!(f, "({set})"),
            Op::GetById(id) | Op::PutById(id) => write!(f, "({id})"),
            Op::GetByOffset(data) | Op::PutByOffset(data) => {
                write!(f, "({}, offset {})", data.identifier, data.offset)
            }
            Op::MultiGetByOffset(data) => write!(f, "({}, {} cases)", data.identifier, data.cases.len()),
            Op::MultiPutByOffset(data) => {
                write!(f, "({}, {} variants)", data.identifier, data.variants.len())
            }
            Op::PutStructure(t) => write!(f, "({} -> {})", t.previous, t.next),
            Op::NewObject(structure) => write!(f, "({structure})"),
            Op::GetFromArguments(index) | Op::PutToArguments(index) => write!(f, "({index})"),
            Op::Jump(target) => write!(f, "({target})"),
            Op::Branch(data) => write!(f, "({}, {})", data.taken, data.not_taken),
            _ => {
                if let Some(mode) = self.array_mode() {
                    write!(f, "({mode})")
                } else if let Some(mode) = self.arith_mode() {
                    write!(f, "({mode:?})")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_terminals_are_generated() {
        for node_type in NodeType::iter().filter(|t| t.is_terminal()) {
            assert!(node_type.must_generate(), "{node_type}");
        }
    }

    #[test]
    fn test_successors() {
        let branch = Op::Branch(BranchData {
            taken: BlockIndex(1),
            not_taken: BlockIndex(2),
        });
        assert_eq!(branch.successors(), vec![BlockIndex(1), BlockIndex(2)]);
        assert!(Op::Return.successors().is_empty());
    }

    #[test]
    fn test_arith_modes() {
        assert!(ArithMode::CheckOverflowAndNegativeZero.should_check_negative_zero());
        assert!(!ArithMode::Unchecked.should_check_overflow());
        assert_eq!(Op::ArithAdd(ArithMode::Unchecked).arith_mode(), Some(ArithMode::Unchecked));
    }
}
