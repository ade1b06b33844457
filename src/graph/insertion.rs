//! Deferred node insertion into a block.
//!
//! Passes that walk a block by index record new nodes against the index they should
//! precede and splice them all in at once with [`InsertionSet::execute`], so the
//! walk's indices stay valid while it runs.

use crate::{
    analysis::FrozenValue,
    graph::{BlockIndex, Edge, Graph, NodeId, NodeOrigin, Op},
    Result,
};

/// Nodes waiting to be inserted into one block.
#[derive(Debug, Default)]
pub struct InsertionSet {
    insertions: Vec<(usize, NodeId)>,
}

impl InsertionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an existing node to be inserted before position `index`.
    pub fn insert(&mut self, index: usize, node: NodeId) -> NodeId {
        self.insertions.push((index, node));
        node
    }

    /// Creates a node and schedules it before position `index`.
    pub fn insert_node(
        &mut self,
        graph: &mut Graph,
        index: usize,
        op: Op,
        origin: NodeOrigin,
        children: Vec<Edge>,
    ) -> NodeId {
        let node = graph.add_node(op, children, origin);
        self.insert(index, node)
    }

    /// Creates a constant and schedules it before position `index`.
    pub fn insert_constant(
        &mut self,
        graph: &mut Graph,
        index: usize,
        origin: NodeOrigin,
        value: FrozenValue,
    ) -> NodeId {
        self.insert_node(graph, index, Op::JSConstant(value), origin, Vec::new())
    }

    /// Schedules a `Check` of those `edges` that still need checking. Nothing is
    /// inserted when none do.
    pub fn insert_check(
        &mut self,
        graph: &mut Graph,
        index: usize,
        origin: NodeOrigin,
        edges: &[Edge],
    ) -> Option<NodeId> {
        let checked: Vec<Edge> = edges.iter().copied().filter(Edge::will_have_check).collect();
        if checked.is_empty() {
            return None;
        }
        Some(self.insert_node(graph, index, Op::Check, origin, checked))
    }

    /// Number of pending insertions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insertions.len()
    }

    /// `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
    }

    /// Splices the pending nodes into `block` and clears the set. Nodes scheduled at
    /// the same index keep their scheduling order. Returns the number inserted.
    pub fn execute(&mut self, graph: &mut Graph, block: BlockIndex) -> Result<usize> {
        if self.insertions.is_empty() {
            return Ok(0);
        }
        self.insertions.sort_by_key(|&(index, _)| index);
        let pending = std::mem::take(&mut self.insertions);
        let count = pending.len();

        let target = graph.try_block_mut(block)?;
        let old = std::mem::take(&mut target.nodes);
        let mut merged = Vec::with_capacity(old.len() + count);
        let mut pending = pending.into_iter().peekable();
        for (index, node) in old.into_iter().enumerate() {
            while let Some(&(at, inserted)) = pending.peek() {
                if at > index {
                    break;
                }
                merged.push(inserted);
                pending.next();
            }
            merged.push(node);
        }
        merged.extend(pending.map(|(_, node)| node));
        target.nodes = merged;

        let nodes = graph.try_block(block)?.nodes.clone();
        for node in nodes {
            graph.node_mut(node).owner = Some(block);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::Value, graph::UseKind};

    #[test]
    fn test_insertions_keep_order() {
        let mut graph = Graph::new(1, 0);
        let block = graph.add_block();
        let origin = NodeOrigin::default();
        let a = graph.add_node(Op::GetCallee, vec![], origin);
        let ret = graph.add_node(Op::Return, vec![], origin);
        graph.append(block, a).unwrap();
        graph.append(block, ret).unwrap();

        let mut insertions = InsertionSet::new();
        let c1 = insertions.insert_constant(&mut graph, 1, origin, FrozenValue::primitive(Value::Int32(1)));
        let c2 = insertions.insert_constant(&mut graph, 1, origin, FrozenValue::primitive(Value::Int32(2)));
        let c0 = insertions.insert_constant(&mut graph, 0, origin, FrozenValue::primitive(Value::Null));
        assert_eq!(insertions.execute(&mut graph, block).unwrap(), 3);

        assert_eq!(graph.block(block).unwrap().nodes, vec![c0, a, c1, c2, ret]);
        assert_eq!(graph.node(c2).owner, Some(block));
        assert!(insertions.is_empty());
    }

    #[test]
    fn test_insert_check_skips_unchecked_edges() {
        let mut graph = Graph::new(1, 0);
        let block = graph.add_block();
        let origin = NodeOrigin::default();
        let a = graph.add_node(Op::GetCallee, vec![], origin);
        let mut insertions = InsertionSet::new();
        assert!(insertions
            .insert_check(&mut graph, 0, origin, &[Edge::untyped(a)])
            .is_none());
        assert!(insertions
            .insert_check(&mut graph, 0, origin, &[Edge::new(a, UseKind::Cell)])
            .is_some());
        assert_eq!(insertions.execute(&mut graph, block).unwrap(), 1);
    }
}
