//! Sets of abstract heaps, closed under supertypes, for fast overlap queries.

use std::collections::HashMap;

use crate::{
    analysis::{clobberize, AbstractHeap, ClobberizeVisitor},
    graph::{Graph, NodeId},
};

/// A set of heaps. Each directly added heap is recorded as a direct member; its
/// supertypes are recorded as indirect members so that overlap against a broader
/// heap is a single lookup.
#[derive(Debug, Clone, Default)]
pub struct ClobberSet {
    clobbers: HashMap<AbstractHeap, bool>,
}

impl ClobberSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `heap` as a direct member.
    pub fn add(&mut self, heap: AbstractHeap) {
        match self.clobbers.get_mut(&heap) {
            Some(direct) if *direct => return,
            Some(direct) => *direct = true,
            None => {
                self.clobbers.insert(heap, true);
            }
        }
        let mut current = heap.supertype();
        while let Some(superheap) = current {
            if self.clobbers.contains_key(&superheap) {
                return;
            }
            self.clobbers.insert(superheap, false);
            current = superheap.supertype();
        }
    }

    /// Adds every direct member of `other`.
    pub fn add_all(&mut self, other: &ClobberSet) {
        for (&heap, &direct) in &other.clobbers {
            if direct {
                self.add(heap);
            }
        }
    }

    /// `true` if `heap` is a direct member.
    #[must_use]
    pub fn contains(&self, heap: AbstractHeap) -> bool {
        self.clobbers.get(&heap).copied().unwrap_or(false)
    }

    /// `true` if `heap` overlaps some direct member.
    #[must_use]
    pub fn overlaps(&self, heap: AbstractHeap) -> bool {
        if self.clobbers.contains_key(&heap) {
            return true;
        }
        let mut current = heap.supertype();
        while let Some(superheap) = current {
            if self.contains(superheap) {
                return true;
            }
            current = superheap.supertype();
        }
        false
    }

    /// `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clobbers.is_empty()
    }

    /// The direct members.
    pub fn direct(&self) -> impl Iterator<Item = AbstractHeap> + '_ {
        self.clobbers
            .iter()
            .filter(|(_, &direct)| direct)
            .map(|(&heap, _)| heap)
    }
}

struct ReadCollector<'a>(&'a mut ClobberSet);

impl ClobberizeVisitor for ReadCollector<'_> {
    fn read(&mut self, heap: AbstractHeap) {
        self.0.add(heap);
    }
}

struct WriteCollector<'a>(&'a mut ClobberSet);

impl ClobberizeVisitor for WriteCollector<'_> {
    fn write(&mut self, heap: AbstractHeap) {
        self.0.add(heap);
    }
}

/// Adds everything `node` reads to `set`.
pub fn add_reads(graph: &Graph, node: NodeId, set: &mut ClobberSet) {
    clobberize(graph, node, &mut ReadCollector(set));
}

/// Adds everything `node` writes to `set`.
pub fn add_writes(graph: &Graph, node: NodeId, set: &mut ClobberSet) {
    clobberize(graph, node, &mut WriteCollector(set));
}

/// The heaps `node` reads.
#[must_use]
pub fn reads_set(graph: &Graph, node: NodeId) -> ClobberSet {
    let mut set = ClobberSet::new();
    add_reads(graph, node, &mut set);
    set
}

/// The heaps `node` writes.
#[must_use]
pub fn writes_set(graph: &Graph, node: NodeId) -> ClobberSet {
    let mut set = ClobberSet::new();
    add_writes(graph, node, &mut set);
    set
}

struct OverlapFinder<'a> {
    set: &'a ClobberSet,
    reads: bool,
    found: bool,
}

impl ClobberizeVisitor for OverlapFinder<'_> {
    fn read(&mut self, heap: AbstractHeap) {
        if self.reads {
            self.found |= self.set.overlaps(heap);
        }
    }

    fn write(&mut self, heap: AbstractHeap) {
        if !self.reads {
            self.found |= self.set.overlaps(heap);
        }
    }
}

/// `true` if something `node` reads overlaps `set`.
#[must_use]
pub fn reads_overlap(graph: &Graph, node: NodeId, set: &ClobberSet) -> bool {
    let mut finder = OverlapFinder {
        set,
        reads: true,
        found: false,
    };
    clobberize(graph, node, &mut finder);
    finder.found
}

/// `true` if something `node` writes overlaps `set`.
#[must_use]
pub fn writes_overlap(graph: &Graph, node: NodeId, set: &ClobberSet) -> bool {
    let mut finder = OverlapFinder {
        set,
        reads: false,
        found: false,
    };
    clobberize(graph, node, &mut finder);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AbstractHeapKind::NamedProperties;

    #[test]
    fn test_overlap_through_supertypes() {
        let mut set = ClobberSet::new();
        set.add(AbstractHeap::with_slot(NamedProperties, 8));

        assert!(set.contains(AbstractHeap::with_slot(NamedProperties, 8)));
        assert!(!set.contains(AbstractHeap::HEAP));
        assert!(!set.overlaps(AbstractHeap::with_slot(NamedProperties, 7)));
        assert!(set.overlaps(AbstractHeap::new(NamedProperties)));
        assert!(set.overlaps(AbstractHeap::WORLD));
        assert!(!set.overlaps(AbstractHeap::STACK));

        set.add(AbstractHeap::HEAP);
        assert!(set.overlaps(AbstractHeap::with_slot(NamedProperties, 7)));
    }
}
