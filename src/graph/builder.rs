//! A small builder for assembling graphs in tests, benchmarks and front ends.
//!
//! # Examples
//!
//! ```rust
//! use dfgopt::prelude::*;
//!
//! let mut b = GraphBuilder::new(1, 0);
//! let x = b.int32(4);
//! let y = b.int32(5);
//! let sum = b.add(
//!     Op::ArithAdd(ArithMode::CheckOverflow),
//!     [Edge::new(x, UseKind::Int32), Edge::new(y, UseKind::Int32)],
//! );
//! b.ret(Edge::untyped(sum));
//! let graph = b.finish()?;
//! assert_eq!(graph.block_indices().len(), 1);
//! # Ok::<(), dfgopt::Error>(())
//! ```

use crate::{
    analysis::{FrozenValue, Value},
    graph::{
        liveness::compute_liveness, BlockIndex, BranchData, CodeOrigin, Edge, Graph,
        InlineCallFrame, InlineFrameId, NodeId, NodeOrigin, Op,
    },
    Result,
};

/// Appends nodes to a current block of a graph under construction.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    current: BlockIndex,
    origin: NodeOrigin,
}

impl GraphBuilder {
    /// Starts a graph with a root block and makes the root current.
    #[must_use]
    pub fn new(num_arguments: usize, num_locals: usize) -> Self {
        let mut graph = Graph::new(num_arguments, num_locals);
        let root = graph.add_block();
        Self {
            graph,
            current: root,
            origin: NodeOrigin::default(),
        }
    }

    /// The graph under construction.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// The block nodes are currently appended to.
    #[must_use]
    pub fn current(&self) -> BlockIndex {
        self.current
    }

    /// Adds a new block without switching to it.
    pub fn block(&mut self) -> BlockIndex {
        self.graph.add_block()
    }

    /// Makes `block` current.
    pub fn switch_to(&mut self, block: BlockIndex) {
        self.current = block;
    }

    /// Sets the origin given to subsequently added nodes.
    pub fn at_origin(&mut self, origin: CodeOrigin) {
        self.origin = NodeOrigin::new(origin);
    }

    /// Registers an inline call frame.
    pub fn inline_frame(&mut self, frame: InlineCallFrame) -> InlineFrameId {
        self.graph.inline_call_frames.push(frame);
        InlineFrameId(self.graph.inline_call_frames.len() - 1)
    }

    /// Appends a node to the current block.
    pub fn add(&mut self, op: Op, children: impl IntoIterator<Item = Edge>) -> NodeId {
        let node = self
            .graph
            .add_node(op, children.into_iter().collect(), self.origin);
        if let Some(block) = self.graph.block_mut(self.current) {
            block.nodes.push(node);
        }
        self.graph.node_mut(node).owner = Some(self.current);
        node
    }

    /// Appends a constant.
    pub fn constant(&mut self, value: Value) -> NodeId {
        self.frozen(FrozenValue::primitive(value))
    }

    /// Appends a frozen constant.
    pub fn frozen(&mut self, value: FrozenValue) -> NodeId {
        self.add(Op::JSConstant(value), [])
    }

    /// Appends an int32 constant.
    pub fn int32(&mut self, value: i32) -> NodeId {
        self.constant(Value::Int32(value))
    }

    /// Ends the current block with a jump.
    pub fn jump(&mut self, target: BlockIndex) -> NodeId {
        self.add(Op::Jump(target), [])
    }

    /// Ends the current block with a branch on `condition`.
    pub fn branch(&mut self, condition: Edge, taken: BlockIndex, not_taken: BlockIndex) -> NodeId {
        self.add(Op::Branch(BranchData { taken, not_taken }), [condition])
    }

    /// Ends the current block with a return of `value`.
    pub fn ret(&mut self, value: Edge) -> NodeId {
        self.add(Op::Return, [value])
    }

    /// Finalizes the graph: predecessors, owners, reference counts and liveness.
    pub fn finish(mut self) -> Result<Graph> {
        self.graph.compute_predecessors();
        self.graph.validate()?;
        self.graph.initialize_node_owners();
        self.graph.compute_ref_counts();
        compute_liveness(&mut self.graph)?;
        Ok(self.graph)
    }
}
