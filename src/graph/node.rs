//! Graph nodes.

use std::fmt;

use crate::{
    analysis::{FrozenValue, SpeculatedType},
    graph::{BlockIndex, Edge, NodeOrigin, NodeType, Op, StackAccessData, UseKind},
};

/// An operation in the graph.
///
/// Nodes are owned by the graph's arena and referenced by [`crate::graph::NodeId`].
/// A node's position in the program is the block that lists it; `owner` caches that
/// block and is refreshed by [`crate::graph::Graph::initialize_node_owners`].
#[derive(Debug, Clone)]
pub struct Node {
    /// The operation and its payload.
    pub op: Op,
    /// Uses, in operand order.
    pub children: Vec<Edge>,
    /// Source position.
    pub origin: NodeOrigin,
    /// Profiled result type.
    pub prediction: SpeculatedType,
    /// Block listing this node.
    pub owner: Option<BlockIndex>,
    ref_count: u32,
}

impl Node {
    /// Creates an unowned node.
    #[must_use]
    pub fn new(op: Op, children: Vec<Edge>, origin: NodeOrigin) -> Self {
        Self {
            op,
            children,
            origin,
            prediction: SpeculatedType::NONE,
            owner: None,
            ref_count: 0,
        }
    }

    /// The payload-free opcode.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.op.node_type()
    }

    /// The `index`th child edge.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Edge> {
        self.children.get(index).copied()
    }

    /// First child.
    #[must_use]
    pub fn child1(&self) -> Option<Edge> {
        self.child(0)
    }

    /// Second child.
    #[must_use]
    pub fn child2(&self) -> Option<Edge> {
        self.child(1)
    }

    /// Third child.
    #[must_use]
    pub fn child3(&self) -> Option<Edge> {
        self.child(2)
    }

    /// Number of uses.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub(crate) fn set_ref_count(&mut self, count: u32) {
        self.ref_count = count;
    }

    /// `true` if the node will be emitted.
    #[must_use]
    pub fn should_generate(&self) -> bool {
        self.ref_count > 0
    }

    /// `true` if the node ends its block.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.node_type().is_terminal()
    }

    /// `true` if the node produces a value.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.node_type().has_result()
    }

    /// The constant, for `JSConstant`.
    #[must_use]
    pub fn constant(&self) -> Option<FrozenValue> {
        self.op.constant()
    }

    /// `true` for `JSConstant`.
    #[must_use]
    pub fn has_constant(&self) -> bool {
        self.constant().is_some()
    }

    /// `true` if the result is an unboxed double.
    #[must_use]
    pub fn result_is_double(&self) -> bool {
        let double_input = self
            .child1()
            .is_some_and(|edge| edge.use_kind == UseKind::DoubleRep);
        match self.node_type() {
            NodeType::DoubleRep | NodeType::ArithSqrt => true,
            NodeType::ArithRound => {
                double_input && !matches!(self.op, Op::ArithRound(mode) if mode.produces_integer())
            }
            NodeType::ArithAdd
            | NodeType::ArithSub
            | NodeType::ArithMul
            | NodeType::ArithDiv
            | NodeType::ArithMod
            | NodeType::ArithNegate
            | NodeType::ArithAbs
            | NodeType::ArithMin
            | NodeType::ArithMax => double_input,
            _ => false,
        }
    }

    /// Replaces the node with a `Check` of the edges that still need checking.
    pub fn remove(&mut self) {
        self.children.retain(Edge::will_have_check);
        self.op = Op::Check;
    }

    /// Turns the node into a constant, dropping its children.
    pub fn convert_to_constant(&mut self, value: FrozenValue) {
        self.op = Op::JSConstant(value);
        self.children.clear();
    }

    /// Turns the node into an `Identity` of `child`.
    pub fn convert_to_identity_on(&mut self, child: crate::graph::NodeId) {
        self.op = Op::Identity;
        self.children = vec![Edge::untyped(child)];
    }

    /// Turns the node into a stack load.
    pub fn convert_to_get_stack(&mut self, data: StackAccessData) {
        self.op = Op::GetStack(data);
        self.children.clear();
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.children.is_empty() {
            f.write_str(" [")?;
            for (i, edge) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{edge}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ArithMode, NodeId, ProofStatus};

    #[test]
    fn test_remove_keeps_only_checking_edges() {
        let mut proved = Edge::new(NodeId(2), UseKind::Int32);
        proved.proof = ProofStatus::IsProved;
        let mut node = Node::new(
            Op::ArithAdd(ArithMode::CheckOverflow),
            vec![Edge::new(NodeId(1), UseKind::Int32), proved],
            NodeOrigin::default(),
        );
        node.remove();
        assert_eq!(node.node_type(), NodeType::Check);
        assert_eq!(node.children, vec![Edge::new(NodeId(1), UseKind::Int32)]);
    }

    #[test]
    fn test_double_results() {
        let node = Node::new(
            Op::ArithAdd(ArithMode::Unchecked),
            vec![Edge::new(NodeId(1), UseKind::DoubleRep)],
            NodeOrigin::default(),
        );
        assert!(node.result_is_double());
        let node = Node::new(Op::ValueRep, vec![], NodeOrigin::default());
        assert!(!node.result_is_double());
    }
}
