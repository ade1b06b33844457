//! Abstract heaps, heap locations and pure values: the vocabulary of the effect
//! model.
//!
//! Abstract heaps form a tree rooted at [`AbstractHeapKind::World`]:
//!
//! ```text
//! World
//! ├── Stack (per slot)
//! ├── SideState
//! └── Heap
//!     ├── JSCell_structureID, JSObject_butterfly, ...
//!     ├── NamedProperties (per property)
//!     ├── Indexed*Properties, DirectArgumentsProperties (per index)
//!     └── HeapObjectCount, MiscFields, Watchpoint_fire
//! ```
//!
//! A heap with a payload (a stack slot, a property, an index) is a child of the same
//! kind with a top payload. Two heaps overlap if one contains the other.

use std::fmt;

use crate::{
    analysis::Value,
    graph::{NodeId, NodeType},
};

/// Kinds of abstract heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(non_camel_case_types, missing_docs)]
pub enum AbstractHeapKind {
    World,
    Stack,
    Heap,
    SideState,
    JSCell_structureID,
    JSCell_indexingType,
    JSCell_typeInfoType,
    JSCell_typeInfoFlags,
    JSObject_butterfly,
    Butterfly_publicLength,
    Butterfly_vectorLength,
    NamedProperties,
    IndexedInt32Properties,
    IndexedDoubleProperties,
    IndexedContiguousProperties,
    IndexedArrayStorageProperties,
    DirectArgumentsProperties,
    HeapObjectCount,
    MiscFields,
    Watchpoint_fire,
}

/// Discriminator within a heap kind: top (any) or one specific slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeapPayload {
    /// Every slot of the kind.
    Top,
    /// One slot, such as a stack register or a property id.
    Slot(i64),
}

impl HeapPayload {
    /// `true` if the two payloads may name the same slot.
    #[must_use]
    pub fn overlaps(self, other: HeapPayload) -> bool {
        match (self, other) {
            (HeapPayload::Slot(a), HeapPayload::Slot(b)) => a == b,
            _ => true,
        }
    }
}

/// A region of state that nodes read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbstractHeap {
    /// The kind.
    pub kind: AbstractHeapKind,
    /// The slot within the kind.
    pub payload: HeapPayload,
}

impl AbstractHeap {
    /// The heap of every slot of `kind`.
    #[must_use]
    pub const fn new(kind: AbstractHeapKind) -> Self {
        Self {
            kind,
            payload: HeapPayload::Top,
        }
    }

    /// The heap of one slot of `kind`.
    #[must_use]
    pub const fn with_slot(kind: AbstractHeapKind, slot: i64) -> Self {
        Self {
            kind,
            payload: HeapPayload::Slot(slot),
        }
    }

    /// The root heap.
    pub const WORLD: AbstractHeap = AbstractHeap::new(AbstractHeapKind::World);
    /// All object state.
    pub const HEAP: AbstractHeap = AbstractHeap::new(AbstractHeapKind::Heap);
    /// All stack slots.
    pub const STACK: AbstractHeap = AbstractHeap::new(AbstractHeapKind::Stack);
    /// Compiler-visible side state that forbids hoisting.
    pub const SIDE_STATE: AbstractHeap = AbstractHeap::new(AbstractHeapKind::SideState);

    /// The heap directly containing this one, or `None` for the world.
    #[must_use]
    pub fn supertype(self) -> Option<AbstractHeap> {
        match self.kind {
            AbstractHeapKind::World => None,
            AbstractHeapKind::Heap | AbstractHeapKind::SideState => Some(Self::WORLD),
            kind => match self.payload {
                HeapPayload::Slot(_) => Some(AbstractHeap::new(kind)),
                HeapPayload::Top if kind == AbstractHeapKind::Stack => Some(Self::WORLD),
                HeapPayload::Top => Some(Self::HEAP),
            },
        }
    }

    /// `true` if the two heaps may share state.
    #[must_use]
    pub fn overlaps(self, other: AbstractHeap) -> bool {
        use AbstractHeapKind::{Heap, SideState, Stack, World};
        if self.kind == World || other.kind == World {
            return true;
        }
        if self.kind == Heap || other.kind == Heap {
            return !matches!(self.kind, SideState | Stack) && !matches!(other.kind, SideState | Stack);
        }
        if self.kind != other.kind {
            return false;
        }
        self.payload.overlaps(other.payload)
    }

    /// `true` if `self` is `other` or contained in it.
    #[must_use]
    pub fn is_subtype_of(self, other: AbstractHeap) -> bool {
        let mut current = Some(self);
        while let Some(heap) = current {
            if heap == other {
                return true;
            }
            current = heap.supertype();
        }
        false
    }
}

impl fmt::Display for AbstractHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload {
            HeapPayload::Top => write!(f, "{:?}", self.kind),
            HeapPayload::Slot(slot) => write!(f, "{:?}({slot})", self.kind),
        }
    }
}

/// Kinds of heap location a node's result can be keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum LocationKind {
    ArrayLengthLoc,
    ButterflyLoc,
    DirectArgumentsLoc,
    IndexedPropertyLoc,
    NamedPropertyLoc,
    StackLoc,
    StackPayloadLoc,
    InvalidationPointLoc,
}

/// A specific memory location: an abstract heap plus the nodes naming the base
/// object and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapLocation {
    /// What kind of location.
    pub kind: LocationKind,
    /// The heap the location lives in.
    pub heap: AbstractHeap,
    /// Base object, if any.
    pub base: Option<NodeId>,
    /// Index, if any.
    pub index: Option<NodeId>,
}

impl HeapLocation {
    /// A location with no base or index.
    #[must_use]
    pub fn new(kind: LocationKind, heap: AbstractHeap) -> Self {
        Self {
            kind,
            heap,
            base: None,
            index: None,
        }
    }

    /// A location on `base`.
    #[must_use]
    pub fn with_base(kind: LocationKind, heap: AbstractHeap, base: NodeId) -> Self {
        Self {
            kind,
            heap,
            base: Some(base),
            index: None,
        }
    }

    /// A location on `base` at `index`.
    #[must_use]
    pub fn with_index(kind: LocationKind, heap: AbstractHeap, base: NodeId, index: NodeId) -> Self {
        Self {
            kind,
            heap,
            base: Some(base),
            index: Some(index),
        }
    }
}

/// A key identifying the result of a side-effect-free computation: two nodes with
/// equal pure values compute the same result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PureValue {
    /// The opcode.
    pub op: NodeType,
    /// The operand nodes.
    pub children: Vec<NodeId>,
    /// Extra discriminating payload (constant bits, arithmetic mode).
    pub info: u64,
}

impl PureValue {
    /// A pure value with no extra payload.
    #[must_use]
    pub fn new(op: NodeType, children: Vec<NodeId>) -> Self {
        Self {
            op,
            children,
            info: 0,
        }
    }

    /// A pure value with an extra payload.
    #[must_use]
    pub fn with_info(op: NodeType, children: Vec<NodeId>, info: u64) -> Self {
        Self { op, children, info }
    }

    /// The pure value of a constant.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self::with_info(NodeType::JSConstant, Vec::new(), value.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AbstractHeapKind::*;

    #[test]
    fn test_supertype_chain() {
        let slot = AbstractHeap::with_slot(NamedProperties, 3);
        assert_eq!(slot.supertype(), Some(AbstractHeap::new(NamedProperties)));
        assert_eq!(AbstractHeap::new(NamedProperties).supertype(), Some(AbstractHeap::HEAP));
        assert_eq!(AbstractHeap::HEAP.supertype(), Some(AbstractHeap::WORLD));
        assert_eq!(AbstractHeap::with_slot(Stack, -1).supertype(), Some(AbstractHeap::STACK));
        assert_eq!(AbstractHeap::STACK.supertype(), Some(AbstractHeap::WORLD));
        assert!(slot.is_subtype_of(AbstractHeap::WORLD));
    }

    #[test]
    fn test_overlaps() {
        let f = AbstractHeap::with_slot(NamedProperties, 1);
        let g = AbstractHeap::with_slot(NamedProperties, 2);
        assert!(!f.overlaps(g));
        assert!(f.overlaps(AbstractHeap::new(NamedProperties)));
        assert!(f.overlaps(AbstractHeap::HEAP));
        assert!(!AbstractHeap::HEAP.overlaps(AbstractHeap::STACK));
        assert!(!AbstractHeap::HEAP.overlaps(AbstractHeap::SIDE_STATE));
        assert!(AbstractHeap::WORLD.overlaps(AbstractHeap::SIDE_STATE));
        assert!(!AbstractHeap::new(JSCell_structureID).overlaps(f));
    }
}
