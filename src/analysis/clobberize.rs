//! The effect model: what each node reads, writes and defines.
//!
//! [`clobberize`] reports a node's effects to a [`ClobberizeVisitor`]:
//!
//! - `read(heap)` / `write(heap)` for every abstract heap touched
//! - `def_pure(value)` when the result depends only on the operands
//! - `def_location(location, value)` when the result is the contents of a specific
//!   heap location, so later loads of the location can reuse `value`
//!
//! The model is conservative: an effect that is not reported does not happen, so
//! passes may rely on the absence of a write to move or remove code.

use crate::{
    analysis::{
        AbstractHeap,
        AbstractHeapKind::{self, *},
        HeapLocation, LocationKind, PureValue,
    },
    graph::{ArrayMode, ArrayType, Graph, Node, NodeId, Op, UseKind, VirtualRegister},
};

/// Receives the effects of a node. Every method defaults to ignoring the effect.
pub trait ClobberizeVisitor {
    /// The node reads `heap`.
    fn read(&mut self, heap: AbstractHeap) {
        let _ = heap;
    }

    /// The node writes `heap`.
    fn write(&mut self, heap: AbstractHeap) {
        let _ = heap;
    }

    /// The node's result is the pure value `value`.
    fn def_pure(&mut self, value: PureValue) {
        let _ = value;
    }

    /// After the node, `location` holds the result of node `value`.
    fn def_location(&mut self, location: HeapLocation, value: NodeId) {
        let _ = (location, value);
    }
}

fn stack_slot(register: VirtualRegister) -> AbstractHeap {
    AbstractHeap::with_slot(Stack, i64::from(register.0))
}

fn heap(kind: AbstractHeapKind) -> AbstractHeap {
    AbstractHeap::new(kind)
}

fn array_mode_word(mode: ArrayMode) -> u64 {
    ((mode.array_type as u64) << 8) | ((mode.class as u64) << 4) | mode.speculation as u64
}

fn pure(node: &Node, info: u64) -> PureValue {
    PureValue::with_info(
        node.node_type(),
        node.children.iter().map(|e| e.node).collect(),
        info,
    )
}

fn child(node: &Node, index: usize) -> NodeId {
    node.child(index).map_or(NodeId(usize::MAX), |e| e.node)
}

/// `true` if `node` converts an operand of unknown type to a number or primitive.
///
/// Such a conversion may call `valueOf`/`toString` on an object, so the node can
/// read and write anything. The abstract interpreter clobbers on the same condition.
#[must_use]
pub fn converts_untyped_operands(node: &Node) -> bool {
    match node.op {
        Op::BitAnd
        | Op::BitOr
        | Op::BitXor
        | Op::BitLShift
        | Op::BitRShift
        | Op::BitURShift
        | Op::ArithMin
        | Op::ArithMax
        | Op::ValueToInt32
        | Op::CompareLess
        | Op::CompareLessEq
        | Op::CompareGreater
        | Op::CompareGreaterEq
        | Op::CompareEq => node.children.iter().any(|e| e.use_kind == UseKind::Untyped),
        _ => false,
    }
}

/// Reports the effects of `id` to `visitor`.
pub fn clobberize(graph: &Graph, id: NodeId, visitor: &mut impl ClobberizeVisitor) {
    let node = graph.node(id);

    if node.children.iter().any(|e| e.use_kind.uses_structure()) {
        visitor.read(heap(JSCell_structureID));
    }

    match &node.op {
        Op::JSConstant(value) => {
            visitor.def_pure(PureValue::constant(value.value));
        }

        Op::Identity | Op::Check => {}

        Op::BitAnd
        | Op::BitOr
        | Op::BitXor
        | Op::BitLShift
        | Op::BitRShift
        | Op::BitURShift
        | Op::ArithMin
        | Op::ArithMax
        | Op::ValueToInt32
        | Op::CompareLess
        | Op::CompareLessEq
        | Op::CompareGreater
        | Op::CompareGreaterEq
        | Op::CompareEq => {
            if converts_untyped_operands(node) {
                visitor.read(AbstractHeap::WORLD);
                visitor.write(AbstractHeap::HEAP);
            } else {
                visitor.def_pure(pure(node, 0));
            }
        }

        Op::ArithSqrt
        | Op::CompareStrictEq
        | Op::LogicalNot
        | Op::CheckInBounds
        | Op::DoubleRep
        | Op::ValueRep
        | Op::BottomValue => visitor.def_pure(pure(node, 0)),

        Op::ArithAdd(mode)
        | Op::ArithSub(mode)
        | Op::ArithMul(mode)
        | Op::ArithDiv(mode)
        | Op::ArithMod(mode)
        | Op::ArithNegate(mode)
        | Op::ArithAbs(mode)
        | Op::UInt32ToNumber(mode) => visitor.def_pure(pure(node, mode.bits())),

        Op::ArithRound(mode) => visitor.def_pure(pure(node, *mode as u64)),

        Op::CheckCell(cell) => visitor.def_pure(pure(node, cell.value.bits())),

        Op::MovHint(_)
        | Op::KillStack(_)
        | Op::Upsilon { .. }
        | Op::Phi
        | Op::Jump(_)
        | Op::Branch(_)
        | Op::Return
        | Op::Unreachable
        | Op::ForceOSRExit
        | Op::LoopHint => visitor.write(AbstractHeap::SIDE_STATE),

        Op::InvalidationPoint => {
            visitor.write(AbstractHeap::SIDE_STATE);
            visitor.def_location(
                HeapLocation::new(LocationKind::InvalidationPointLoc, heap(Watchpoint_fire)),
                id,
            );
        }

        Op::CreateDirectArguments | Op::CreateClonedArguments => {
            visitor.read(AbstractHeap::STACK);
            visitor.read(heap(HeapObjectCount));
            visitor.write(heap(HeapObjectCount));
        }

        Op::PhantomDirectArguments | Op::PhantomClonedArguments => {
            visitor.read(AbstractHeap::STACK);
            visitor.read(heap(HeapObjectCount));
            visitor.write(heap(HeapObjectCount));
        }

        Op::NewObject(_) => {
            visitor.read(heap(HeapObjectCount));
            visitor.write(heap(HeapObjectCount));
        }

        Op::GetById(_)
        | Op::PutById(_)
        | Op::Call
        | Op::Construct
        | Op::CallVarargs(_)
        | Op::ConstructVarargs(_)
        | Op::CallForwardVarargs(_)
        | Op::ConstructForwardVarargs(_)
        | Op::ValueAdd => {
            visitor.read(AbstractHeap::WORLD);
            visitor.write(AbstractHeap::HEAP);
        }

        Op::TailCall | Op::TailCallVarargs(_) | Op::TailCallForwardVarargs(_) => {
            visitor.read(AbstractHeap::WORLD);
            visitor.write(AbstractHeap::SIDE_STATE);
        }

        Op::GetCallee => {
            let slot = stack_slot(VirtualRegister::callee());
            visitor.read(slot);
            visitor.def_location(HeapLocation::new(LocationKind::StackLoc, slot), id);
        }

        Op::GetArgumentCount => {
            let slot = stack_slot(VirtualRegister::argument_count());
            visitor.read(slot);
            visitor.def_location(HeapLocation::new(LocationKind::StackPayloadLoc, slot), id);
        }

        Op::GetStack(data) => {
            let slot = stack_slot(data.local);
            visitor.read(slot);
            visitor.def_location(HeapLocation::new(LocationKind::StackLoc, slot), id);
        }

        Op::PutStack(data) => {
            let slot = stack_slot(data.local);
            visitor.write(slot);
            visitor.def_location(HeapLocation::new(LocationKind::StackLoc, slot), child(node, 0));
        }

        Op::LoadVarargs(data) => {
            visitor.read(AbstractHeap::WORLD);
            visitor.write(AbstractHeap::HEAP);
            visitor.write(stack_slot(data.count));
            for i in (0..data.limit).rev() {
                visitor.write(stack_slot(data.start.offset(i as i32)));
            }
        }

        Op::ForwardVarargs(data) => {
            visitor.read(AbstractHeap::STACK);
            visitor.write(stack_slot(data.count));
            for i in (0..data.limit).rev() {
                visitor.write(stack_slot(data.start.offset(i as i32)));
            }
        }

        Op::GetMyArgumentByVal => visitor.read(AbstractHeap::STACK),

        Op::GetByVal(mode) => clobberize_get_by_val(node, id, *mode, visitor),

        Op::PutByVal(mode) => clobberize_put_by_val(node, *mode, visitor),

        Op::GetArrayLength(mode) => {
            let base = child(node, 0);
            match mode.array_type {
                ArrayType::Int32 | ArrayType::Double | ArrayType::Contiguous | ArrayType::ArrayStorage => {
                    visitor.read(heap(Butterfly_publicLength));
                    visitor.def_location(
                        HeapLocation::with_base(
                            LocationKind::ArrayLengthLoc,
                            heap(Butterfly_publicLength),
                            base,
                        ),
                        id,
                    );
                }
                ArrayType::String => visitor.def_pure(pure(node, array_mode_word(*mode))),
                _ => {
                    visitor.read(heap(MiscFields));
                    visitor.def_location(
                        HeapLocation::with_base(LocationKind::ArrayLengthLoc, heap(MiscFields), base),
                        id,
                    );
                }
            }
        }

        Op::CheckStructure(_) => visitor.read(heap(JSCell_structureID)),

        Op::CheckArray(_) => {
            visitor.read(heap(JSCell_indexingType));
            visitor.read(heap(JSCell_typeInfoType));
            visitor.read(heap(JSCell_structureID));
        }

        Op::PutStructure(_) => {
            visitor.write(heap(JSCell_structureID));
            visitor.write(heap(JSCell_typeInfoType));
            visitor.write(heap(JSCell_typeInfoFlags));
            visitor.write(heap(JSCell_indexingType));
        }

        Op::GetButterfly => {
            visitor.read(heap(JSObject_butterfly));
            visitor.def_location(
                HeapLocation::with_base(
                    LocationKind::ButterflyLoc,
                    heap(JSObject_butterfly),
                    child(node, 0),
                ),
                id,
            );
        }

        Op::GetByOffset(data) => {
            let named = AbstractHeap::with_slot(NamedProperties, i64::from(data.identifier.0));
            visitor.read(named);
            visitor.def_location(
                HeapLocation::with_base(LocationKind::NamedPropertyLoc, named, child(node, 1)),
                id,
            );
        }

        Op::MultiGetByOffset(data) => {
            let named = AbstractHeap::with_slot(NamedProperties, i64::from(data.identifier.0));
            visitor.read(heap(JSCell_structureID));
            visitor.read(heap(JSObject_butterfly));
            visitor.read(named);
            visitor.def_location(
                HeapLocation::with_base(LocationKind::NamedPropertyLoc, named, child(node, 0)),
                id,
            );
        }

        Op::MultiPutByOffset(data) => {
            let named = AbstractHeap::with_slot(NamedProperties, i64::from(data.identifier.0));
            visitor.read(heap(JSCell_structureID));
            visitor.read(heap(JSObject_butterfly));
            visitor.write(named);
            if data.writes_structures() {
                visitor.write(heap(JSCell_structureID));
            }
            if data.reallocates_storage() {
                visitor.write(heap(JSObject_butterfly));
            }
            visitor.def_location(
                HeapLocation::with_base(LocationKind::NamedPropertyLoc, named, child(node, 0)),
                child(node, 1),
            );
        }

        Op::PutByOffset(data) => {
            let named = AbstractHeap::with_slot(NamedProperties, i64::from(data.identifier.0));
            visitor.write(named);
            visitor.def_location(
                HeapLocation::with_base(LocationKind::NamedPropertyLoc, named, child(node, 1)),
                child(node, 2),
            );
        }

        Op::GetFromArguments(index) => {
            let slot = AbstractHeap::with_slot(DirectArgumentsProperties, i64::from(*index));
            visitor.read(slot);
            visitor.def_location(
                HeapLocation::with_base(LocationKind::DirectArgumentsLoc, slot, child(node, 0)),
                id,
            );
        }

        Op::PutToArguments(index) => {
            let slot = AbstractHeap::with_slot(DirectArgumentsProperties, i64::from(*index));
            visitor.write(slot);
            visitor.def_location(
                HeapLocation::with_base(LocationKind::DirectArgumentsLoc, slot, child(node, 0)),
                child(node, 1),
            );
        }
    }
}

fn indexed_heap(mode: ArrayMode) -> Option<AbstractHeapKind> {
    match mode.array_type {
        ArrayType::Int32 => Some(IndexedInt32Properties),
        ArrayType::Double => Some(IndexedDoubleProperties),
        ArrayType::Contiguous => Some(IndexedContiguousProperties),
        _ => None,
    }
}

fn clobberize_get_by_val(node: &Node, id: NodeId, mode: ArrayMode, visitor: &mut impl ClobberizeVisitor) {
    let (base, index) = (child(node, 0), child(node, 1));
    match mode.array_type {
        ArrayType::ForceExit => visitor.write(AbstractHeap::SIDE_STATE),
        ArrayType::Generic => {
            visitor.read(AbstractHeap::WORLD);
            visitor.write(AbstractHeap::HEAP);
        }
        ArrayType::String => {
            if mode.is_out_of_bounds() {
                visitor.read(AbstractHeap::WORLD);
                visitor.write(AbstractHeap::HEAP);
            } else {
                visitor.def_pure(pure(node, array_mode_word(mode)));
            }
        }
        ArrayType::DirectArguments if mode.is_out_of_bounds() => {
            visitor.read(AbstractHeap::WORLD);
            visitor.write(AbstractHeap::HEAP);
        }
        ArrayType::DirectArguments => {
            visitor.read(heap(DirectArgumentsProperties));
            visitor.def_location(
                HeapLocation::with_index(
                    LocationKind::IndexedPropertyLoc,
                    heap(DirectArgumentsProperties),
                    base,
                    index,
                ),
                id,
            );
        }
        ArrayType::Int32 | ArrayType::Double | ArrayType::Contiguous => {
            let Some(kind) = indexed_heap(mode).filter(|_| mode.is_in_bounds()) else {
                visitor.read(AbstractHeap::WORLD);
                visitor.write(AbstractHeap::HEAP);
                return;
            };
            visitor.read(heap(Butterfly_publicLength));
            visitor.read(heap(kind));
            visitor.def_location(
                HeapLocation::with_index(LocationKind::IndexedPropertyLoc, heap(kind), base, index),
                id,
            );
        }
        ArrayType::ArrayStorage => {
            if mode.is_in_bounds() {
                visitor.read(heap(Butterfly_vectorLength));
                visitor.read(heap(IndexedArrayStorageProperties));
            } else {
                visitor.read(AbstractHeap::WORLD);
                visitor.write(AbstractHeap::HEAP);
            }
        }
    }
}

fn clobberize_put_by_val(node: &Node, mode: ArrayMode, visitor: &mut impl ClobberizeVisitor) {
    let (base, index, value) = (child(node, 0), child(node, 1), child(node, 2));
    let put_mode = mode.for_put();
    match put_mode.array_type {
        ArrayType::ForceExit => visitor.write(AbstractHeap::SIDE_STATE),
        ArrayType::Int32 | ArrayType::Double | ArrayType::Contiguous if !mode.is_out_of_bounds() => {
            let Some(kind) = indexed_heap(put_mode) else {
                return;
            };
            visitor.read(heap(Butterfly_publicLength));
            visitor.read(heap(Butterfly_vectorLength));
            visitor.read(heap(kind));
            visitor.write(heap(kind));
            if mode.may_store_to_hole() {
                visitor.write(heap(Butterfly_publicLength));
            }
            visitor.def_location(
                HeapLocation::with_index(LocationKind::IndexedPropertyLoc, heap(kind), base, index),
                value,
            );
        }
        _ => {
            visitor.read(AbstractHeap::WORLD);
            visitor.write(AbstractHeap::HEAP);
        }
    }
}

/// Every effect of a node, collected for inspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    /// Heaps read, in report order.
    pub reads: Vec<AbstractHeap>,
    /// Heaps written, in report order.
    pub writes: Vec<AbstractHeap>,
    /// Pure values defined.
    pub pure_defs: Vec<PureValue>,
    /// Heap locations defined, with the node holding their value.
    pub location_defs: Vec<(HeapLocation, NodeId)>,
}

impl ClobberizeVisitor for Effects {
    fn read(&mut self, heap: AbstractHeap) {
        self.reads.push(heap);
    }

    fn write(&mut self, heap: AbstractHeap) {
        self.writes.push(heap);
    }

    fn def_pure(&mut self, value: PureValue) {
        self.pure_defs.push(value);
    }

    fn def_location(&mut self, location: HeapLocation, value: NodeId) {
        self.location_defs.push((location, value));
    }
}

/// Collects the effects of `node`.
#[must_use]
pub fn effects_of(graph: &Graph, node: NodeId) -> Effects {
    let mut effects = Effects::default();
    clobberize(graph, node, &mut effects);
    effects
}

struct WriteFinder<F: FnMut(AbstractHeap) -> bool> {
    matches: F,
    found: bool,
}

impl<F: FnMut(AbstractHeap) -> bool> ClobberizeVisitor for WriteFinder<F> {
    fn write(&mut self, heap: AbstractHeap) {
        self.found |= (self.matches)(heap);
    }
}

/// `true` if `node` writes anything.
#[must_use]
pub fn does_writes(graph: &Graph, node: NodeId) -> bool {
    let mut finder = WriteFinder {
        matches: |_| true,
        found: false,
    };
    clobberize(graph, node, &mut finder);
    finder.found
}

/// `true` if `node` writes the whole heap.
#[must_use]
pub fn clobbers_heap(graph: &Graph, node: NodeId) -> bool {
    let mut finder = WriteFinder {
        matches: |heap: AbstractHeap| matches!(heap.kind, World | Heap),
        found: false,
    };
    clobberize(graph, node, &mut finder);
    finder.found
}

/// `true` if `node` writes something overlapping `target`.
#[must_use]
pub fn writes_overlap_heap(graph: &Graph, node: NodeId, target: AbstractHeap) -> bool {
    let mut finder = WriteFinder {
        matches: |heap: AbstractHeap| heap.overlaps(target),
        found: false,
    };
    clobberize(graph, node, &mut finder);
    finder.found
}
