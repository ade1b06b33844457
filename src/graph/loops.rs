//! Natural loop detection.
//!
//! A back edge is an edge whose target dominates its source; the target is a loop
//! header. All back edges into one header form a single loop whose body is every
//! block that reaches a back-edge source without passing through the header. Loops
//! nest by body containment.

use std::collections::BTreeSet;

use crate::graph::{BlockIndex, Dominators, Graph};

/// A natural loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalLoop {
    index: usize,
    header: BlockIndex,
    body: BTreeSet<BlockIndex>,
}

impl NaturalLoop {
    /// Position in [`NaturalLoops`].
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The loop header.
    #[must_use]
    pub fn header(&self) -> BlockIndex {
        self.header
    }

    /// `true` if `block` is in the loop body (the header included).
    #[must_use]
    pub fn contains(&self, block: BlockIndex) -> bool {
        self.body.contains(&block)
    }

    /// Number of blocks in the body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Always `false`: a loop contains at least its header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Iterates over the body in block order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.body.iter().copied()
    }
}

/// All natural loops of a graph together with their nesting.
#[derive(Debug, Clone, Default)]
pub struct NaturalLoops {
    loops: Vec<NaturalLoop>,
    innermost: Vec<Option<usize>>,
    parent: Vec<Option<usize>>,
}

impl NaturalLoops {
    /// Finds the loops of `graph`.
    #[must_use]
    pub fn compute(graph: &Graph, dominators: &Dominators) -> Self {
        let mut loops: Vec<NaturalLoop> = Vec::new();

        for block in graph.blocks_in_pre_order() {
            for successor in graph.successors_of(block) {
                if !dominators.dominates(successor, block) {
                    continue;
                }
                let position = match loops.iter().position(|l| l.header == successor) {
                    Some(position) => position,
                    None => {
                        loops.push(NaturalLoop {
                            index: loops.len(),
                            header: successor,
                            body: BTreeSet::from([successor]),
                        });
                        loops.len() - 1
                    }
                };

                let mut worklist = vec![block];
                while let Some(current) = worklist.pop() {
                    if !loops[position].body.insert(current) {
                        continue;
                    }
                    if let Some(data) = graph.block(current) {
                        worklist.extend(
                            data.predecessors
                                .iter()
                                .copied()
                                .filter(|p| dominators.dominates(successor, *p)),
                        );
                    }
                }
            }
        }

        let mut innermost = vec![None; graph.num_blocks()];
        for (block, slot) in innermost.iter_mut().enumerate() {
            *slot = loops
                .iter()
                .filter(|l| l.contains(BlockIndex(block)))
                .min_by_key(|l| l.len())
                .map(|l| l.index);
        }

        let parent = loops
            .iter()
            .map(|inner| {
                loops
                    .iter()
                    .filter(|outer| {
                        outer.index != inner.index
                            && outer.contains(inner.header)
                            && outer.len() > inner.len()
                    })
                    .min_by_key(|outer| outer.len())
                    .map(|outer| outer.index)
            })
            .collect();

        Self {
            loops,
            innermost,
            parent,
        }
    }

    /// Number of loops.
    #[must_use]
    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    /// The loop at `index`.
    #[must_use]
    pub fn loop_at(&self, index: usize) -> Option<&NaturalLoop> {
        self.loops.get(index)
    }

    /// Iterates over all loops.
    pub fn iter(&self) -> impl Iterator<Item = &NaturalLoop> {
        self.loops.iter()
    }

    /// The innermost loop containing `block`.
    #[must_use]
    pub fn innermost_loop_of(&self, block: BlockIndex) -> Option<&NaturalLoop> {
        self.innermost
            .get(block.0)
            .copied()
            .flatten()
            .and_then(|index| self.loops.get(index))
    }

    /// The innermost loop strictly enclosing `inner`.
    #[must_use]
    pub fn innermost_outer_loop(&self, inner: &NaturalLoop) -> Option<&NaturalLoop> {
        self.parent
            .get(inner.index)
            .copied()
            .flatten()
            .and_then(|index| self.loops.get(index))
    }

    /// The loops containing `block`, innermost first.
    #[must_use]
    pub fn loops_of(&self, block: BlockIndex) -> Vec<&NaturalLoop> {
        let mut result = Vec::new();
        let mut current = self.innermost_loop_of(block);
        while let Some(natural_loop) = current {
            result.push(natural_loop);
            current = self.innermost_outer_loop(natural_loop);
        }
        result
    }

    /// The loop headed by `block`, if any.
    #[must_use]
    pub fn header_of(&self, block: BlockIndex) -> Option<&NaturalLoop> {
        self.loops.iter().find(|l| l.header == block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BranchData, Edge, NodeOrigin, Op};

    /// 0 -> 1 -> 2 -> 3 -> 2, 3 -> 1, 1 -> 4
    fn nested() -> Graph {
        let mut graph = Graph::new(1, 0);
        let b: Vec<BlockIndex> = (0..5).map(|_| graph.add_block()).collect();
        let origin = NodeOrigin::default();
        let cond = graph.add_node(Op::GetArgumentCount, vec![], origin);
        let terminals = [
            Op::Jump(b[1]),
            Op::Branch(BranchData {
                taken: b[2],
                not_taken: b[4],
            }),
            Op::Jump(b[3]),
            Op::Branch(BranchData {
                taken: b[2],
                not_taken: b[1],
            }),
            Op::Return,
        ];
        graph.append(b[0], cond).unwrap();
        for (i, op) in terminals.into_iter().enumerate() {
            let children = if matches!(op, Op::Branch(_)) {
                vec![Edge::untyped(cond)]
            } else {
                vec![]
            };
            let node = graph.add_node(op, children, origin);
            graph.append(b[i], node).unwrap();
        }
        graph.compute_predecessors();
        graph
    }

    #[test]
    fn test_nested_loops() {
        let graph = nested();
        let dominators = Dominators::compute(&graph);
        let loops = NaturalLoops::compute(&graph, &dominators);

        assert_eq!(loops.num_loops(), 2);
        let inner = loops.innermost_loop_of(BlockIndex(3)).unwrap();
        assert_eq!(inner.header(), BlockIndex(2));
        let outer = loops.innermost_outer_loop(inner).unwrap();
        assert_eq!(outer.header(), BlockIndex(1));
        assert!(outer.contains(BlockIndex(3)));
        assert!(loops.innermost_loop_of(BlockIndex(4)).is_none());
        assert_eq!(loops.loops_of(BlockIndex(3)).len(), 2);
    }
}
