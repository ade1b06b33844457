//! Abstract states: where the abstract interpreter reads and writes values.
//!
//! [`InPlaceAbstractState`] drives the control-flow analysis: it loads a block's
//! head values, lets the interpreter run over the block, and merges the tail values
//! into the successors. [`AtTailAbstractState`] executes nodes on top of a block's
//! already-computed tail values, which is what code motion needs when it places a
//! node at the end of a pre-header.

use std::collections::HashMap;

use crate::{
    analysis::{AbstractValue, StructureClobberState},
    graph::{BlockIndex, BranchDirection, FlushFormat, Graph, NodeId, Op, Operands},
    Error, Result,
};

/// The storage the abstract interpreter runs against.
pub trait AbstractState {
    /// The abstract value of `node` at the current point.
    fn for_node(&mut self, node: NodeId) -> &mut AbstractValue;

    /// The abstract values of the stack slots at the current point.
    fn variables(&mut self) -> &mut Operands<AbstractValue>;

    /// The block being interpreted.
    fn block(&self) -> Option<BlockIndex>;

    /// `false` once a contradiction proved the rest of the block unreachable.
    fn is_valid(&self) -> bool;

    /// Records reachability of the current point.
    fn set_is_valid(&mut self, valid: bool);

    /// Records that the block ran an effect that may have changed arbitrary state.
    fn set_did_clobber(&mut self, did_clobber: bool);

    /// `true` if the block ran an effect that may have changed arbitrary state.
    fn did_clobber(&self) -> bool;

    /// Records that a node's result became a known constant.
    fn set_found_constants(&mut self, found: bool);

    /// Records the proved direction of the block's branch.
    fn set_branch_direction(&mut self, direction: BranchDirection);

    /// Whether structure sets are currently trustworthy.
    fn structure_clobber_state(&self) -> StructureClobberState;

    /// Updates the structure clobber state.
    fn set_structure_clobber_state(&mut self, state: StructureClobberState);

    /// Calls `functor` on every value an effect at position `clobber_limit` of the
    /// current block can observe: node values up to and including that position,
    /// values live into the block and the stack slots.
    fn for_all_values(
        &mut self,
        graph: &Graph,
        clobber_limit: usize,
        functor: &mut dyn FnMut(&mut AbstractValue),
    );

    /// Makes `node` tracked by this state, so that a write to it is kept.
    fn create_value_for_node(&mut self, _node: NodeId) {}
}

/// The state used while the analysis walks blocks in order.
#[derive(Debug)]
pub struct InPlaceAbstractState {
    values: Vec<AbstractValue>,
    variables: Operands<AbstractValue>,
    block: Option<BlockIndex>,
    is_valid: bool,
    did_clobber: bool,
    found_constants: bool,
    branch_direction: BranchDirection,
    structure_clobber_state: StructureClobberState,
}

impl InPlaceAbstractState {
    /// Creates a state sized for `graph`.
    #[must_use]
    pub fn new(graph: &Graph) -> Self {
        Self {
            values: vec![AbstractValue::default(); graph.num_nodes()],
            variables: Operands::new(graph.num_arguments(), graph.num_locals(), AbstractValue::default()),
            block: None,
            is_valid: false,
            did_clobber: false,
            found_constants: false,
            branch_direction: BranchDirection::InvalidBranchDirection,
            structure_clobber_state: StructureClobberState::StructuresAreWatched,
        }
    }

    /// Resets every block's analysis results and seeds the root's arguments from
    /// their flush formats.
    pub fn initialize(&mut self, graph: &mut Graph) -> Result<()> {
        let formats = graph.argument_formats.clone();
        for index in graph.block_indices() {
            let block = graph.try_block_mut(index)?;
            block.reset_cfa();
            block.cfa_structure_clobber_state_at_head = StructureClobberState::StructuresAreWatched;
            block.cfa_structure_clobber_state_at_tail = StructureClobberState::StructuresAreWatched;

            if index == BlockIndex::ROOT {
                block.cfa_should_revisit = true;
                for (i, format) in formats.iter().enumerate() {
                    if let Some(value) = block.values_at_head.argument_mut(i) {
                        *value = match format {
                            FlushFormat::JSValue => AbstractValue::heap_top(),
                            format => AbstractValue::of_type(format.type_filter()),
                        };
                    }
                }
            }

            let live_at_head = block.ssa.live_at_head.clone();
            let live_at_tail = block.ssa.live_at_tail.clone();
            block.ssa.values_at_head = live_at_head
                .into_iter()
                .map(|node| (node, AbstractValue::default()))
                .collect();
            block.ssa.values_at_tail = live_at_tail
                .into_iter()
                .map(|node| (node, AbstractValue::default()))
                .collect();
        }
        Ok(())
    }

    /// Loads `index`'s head state and makes it the current block.
    pub fn begin_basic_block(&mut self, graph: &mut Graph, index: BlockIndex) -> Result<()> {
        if self.values.len() < graph.num_nodes() {
            self.values.resize(graph.num_nodes(), AbstractValue::default());
        }
        let block = graph.try_block_mut(index)?;
        for &node in &block.nodes {
            self.values[node.index()].clear();
        }
        self.variables = block.values_at_head.clone();
        for (&node, value) in &block.ssa.values_at_head {
            if let Some(slot) = self.values.get_mut(node.index()) {
                *slot = value.clone();
            }
        }
        block.cfa_should_revisit = false;
        block.cfa_has_visited = true;

        self.block = Some(index);
        self.is_valid = true;
        self.did_clobber = false;
        self.found_constants = false;
        self.branch_direction = BranchDirection::InvalidBranchDirection;
        self.structure_clobber_state = block.cfa_structure_clobber_state_at_head;
        Ok(())
    }

    /// Stores the current block's results and, if `merge_to_successors`, propagates
    /// its tail state. Returns `true` if anything changed.
    pub fn end_basic_block(&mut self, graph: &mut Graph, merge_to_successors: bool) -> Result<bool> {
        let index = self
            .block
            .take()
            .ok_or_else(|| Error::Error("end_basic_block without a current block".into()))?;
        let block = graph.try_block_mut(index)?;
        block.cfa_found_constants = self.found_constants;
        block.cfa_did_finish = self.is_valid;
        block.cfa_branch_direction = self.branch_direction;

        if !self.is_valid {
            self.reset();
            return Ok(false);
        }

        let mut changed = block.cfa_structure_clobber_state_at_tail != self.structure_clobber_state;
        block.cfa_structure_clobber_state_at_tail = self.structure_clobber_state;

        for (tail, current) in block.values_at_tail.iter_mut().zip(self.variables.iter()) {
            changed |= tail.merge(current);
        }
        for node in block.ssa.live_at_tail.iter().copied().collect::<Vec<_>>() {
            let value = self.values.get(node.index()).cloned().unwrap_or_default();
            changed |= block
                .ssa
                .values_at_tail
                .entry(node)
                .or_default()
                .merge(&value);
        }
        self.reset();

        if !merge_to_successors {
            return Ok(changed);
        }
        Ok(Self::merge_to_successors(graph, index)? || changed)
    }

    /// Forgets the current block without storing anything.
    pub fn reset(&mut self) {
        self.block = None;
        self.is_valid = false;
        self.branch_direction = BranchDirection::InvalidBranchDirection;
        self.structure_clobber_state = StructureClobberState::StructuresAreWatched;
    }

    fn merge_to_successors(graph: &mut Graph, index: BlockIndex) -> Result<bool> {
        let Some(terminal) = graph.terminal(index) else {
            return Ok(false);
        };
        let direction = graph.try_block(index)?.cfa_branch_direction;
        match graph.node(terminal).op.clone() {
            Op::Jump(target) => Self::merge(graph, index, target),
            Op::Branch(data) => {
                let mut changed = false;
                if direction != BranchDirection::TakeFalse {
                    changed |= Self::merge(graph, index, data.taken)?;
                }
                if direction != BranchDirection::TakeTrue {
                    changed |= Self::merge(graph, index, data.not_taken)?;
                }
                Ok(changed)
            }
            _ => Ok(false),
        }
    }

    /// Merges `from`'s tail state into `to`'s head state. Returns `true` if `to`
    /// must be (re)visited.
    pub fn merge(graph: &mut Graph, from: BlockIndex, to: BlockIndex) -> Result<bool> {
        let source = graph.try_block(from)?;
        let clobber_state = source.cfa_structure_clobber_state_at_tail;
        let tail_values = source.values_at_tail.clone();
        let ssa_tail: HashMap<NodeId, AbstractValue> = source.ssa.values_at_tail.clone();

        let target = graph.try_block_mut(to)?;
        let merged_state = clobber_state.merge(target.cfa_structure_clobber_state_at_head);
        let mut changed = merged_state != target.cfa_structure_clobber_state_at_head;
        target.cfa_structure_clobber_state_at_head = merged_state;

        for (head, tail) in target.values_at_head.iter_mut().zip(tail_values.iter()) {
            changed |= head.merge(tail);
        }
        for node in target.ssa.live_at_head.iter().copied().collect::<Vec<_>>() {
            let incoming = ssa_tail.get(&node).cloned().unwrap_or_default();
            changed |= target
                .ssa
                .values_at_head
                .entry(node)
                .or_default()
                .merge(&incoming);
        }

        if !target.cfa_has_visited {
            changed = true;
        }
        target.cfa_should_revisit |= changed;
        Ok(changed)
    }
}

impl AbstractState for InPlaceAbstractState {
    fn for_node(&mut self, node: NodeId) -> &mut AbstractValue {
        if node.index() >= self.values.len() {
            self.values.resize(node.index() + 1, AbstractValue::default());
        }
        &mut self.values[node.index()]
    }

    fn variables(&mut self) -> &mut Operands<AbstractValue> {
        &mut self.variables
    }

    fn block(&self) -> Option<BlockIndex> {
        self.block
    }

    fn is_valid(&self) -> bool {
        self.is_valid
    }

    fn set_is_valid(&mut self, valid: bool) {
        self.is_valid = valid;
    }

    fn set_did_clobber(&mut self, did_clobber: bool) {
        self.did_clobber = did_clobber;
    }

    fn did_clobber(&self) -> bool {
        self.did_clobber
    }

    fn set_found_constants(&mut self, found: bool) {
        self.found_constants = found;
    }

    fn set_branch_direction(&mut self, direction: BranchDirection) {
        self.branch_direction = direction;
    }

    fn structure_clobber_state(&self) -> StructureClobberState {
        self.structure_clobber_state
    }

    fn set_structure_clobber_state(&mut self, state: StructureClobberState) {
        self.structure_clobber_state = state;
    }

    fn for_all_values(
        &mut self,
        graph: &Graph,
        clobber_limit: usize,
        functor: &mut dyn FnMut(&mut AbstractValue),
    ) {
        let Some(block) = self.block.and_then(|index| graph.block(index)) else {
            return;
        };
        let limit = clobber_limit.saturating_add(1).min(block.len());
        for &node in &block.nodes[..limit] {
            if let Some(value) = self.values.get_mut(node.index()) {
                functor(value);
            }
        }
        for &node in &block.ssa.live_at_head {
            if let Some(value) = self.values.get_mut(node.index()) {
                functor(value);
            }
        }
        for value in self.variables.iter_mut() {
            functor(value);
        }
    }
}

/// A state positioned at the end of one block, on top of its tail values.
///
/// Values are copied in by [`AtTailAbstractState::initialize_to`] and written back by
/// [`AtTailAbstractState::write_back`]. Nodes with no tail value (such as a node just
/// moved into the block) start at heap top.
#[derive(Debug, Default)]
pub struct AtTailAbstractState {
    block: Option<BlockIndex>,
    values: HashMap<NodeId, AbstractValue>,
    variables: Operands<AbstractValue>,
    is_valid: bool,
    structure_clobber_state: StructureClobberState,
}

impl AtTailAbstractState {
    /// Creates an unpositioned state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions the state at the end of `index`.
    pub fn initialize_to(&mut self, graph: &Graph, index: BlockIndex) -> Result<()> {
        let block = graph.try_block(index)?;
        self.block = Some(index);
        self.values = block.ssa.values_at_tail.clone();
        self.variables = block.values_at_tail.clone();
        self.is_valid = block.cfa_did_finish;
        self.structure_clobber_state = block.cfa_structure_clobber_state_at_tail;
        Ok(())
    }

    /// Stores the values back into the block's tail.
    pub fn write_back(&self, graph: &mut Graph) -> Result<()> {
        let Some(index) = self.block else {
            return Ok(());
        };
        let block = graph.try_block_mut(index)?;
        block.ssa.values_at_tail = self.values.clone();
        block.values_at_tail = self.variables.clone();
        block.cfa_did_finish = self.is_valid;
        block.cfa_structure_clobber_state_at_tail = self.structure_clobber_state;
        Ok(())
    }
}

impl AbstractState for AtTailAbstractState {
    fn for_node(&mut self, node: NodeId) -> &mut AbstractValue {
        self.values.entry(node).or_insert_with(AbstractValue::heap_top)
    }

    fn variables(&mut self) -> &mut Operands<AbstractValue> {
        &mut self.variables
    }

    fn block(&self) -> Option<BlockIndex> {
        self.block
    }

    fn is_valid(&self) -> bool {
        self.is_valid
    }

    fn set_is_valid(&mut self, valid: bool) {
        self.is_valid = valid;
    }

    fn set_did_clobber(&mut self, _: bool) {}

    fn did_clobber(&self) -> bool {
        false
    }

    fn set_found_constants(&mut self, _: bool) {}

    fn set_branch_direction(&mut self, _: BranchDirection) {}

    fn structure_clobber_state(&self) -> StructureClobberState {
        self.structure_clobber_state
    }

    fn set_structure_clobber_state(&mut self, state: StructureClobberState) {
        self.structure_clobber_state = state;
    }

    fn for_all_values(
        &mut self,
        _graph: &Graph,
        _clobber_limit: usize,
        functor: &mut dyn FnMut(&mut AbstractValue),
    ) {
        for value in self.values.values_mut() {
            functor(value);
        }
        for value in self.variables.iter_mut() {
            functor(value);
        }
    }

    fn create_value_for_node(&mut self, node: NodeId) {
        self.values.entry(node).or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::SpeculatedType,
        graph::{Edge, GraphBuilder, UseKind},
    };

    #[test]
    fn test_initialize_seeds_arguments() {
        let mut builder = GraphBuilder::new(2, 1);
        let zero = builder.int32(0);
        builder.ret(Edge::new(zero, UseKind::Int32));
        let mut graph = builder.finish().expect("graph");
        graph.argument_formats[1] = FlushFormat::Int32;

        let mut state = InPlaceAbstractState::new(&graph);
        state.initialize(&mut graph).expect("initialize");

        let root = graph.block(BlockIndex::ROOT).expect("root");
        assert!(root.cfa_should_revisit);
        assert!(root.values_at_head.argument(0).expect("this").is_heap_top());
        assert_eq!(
            root.values_at_head.argument(1).expect("arg").ty,
            SpeculatedType::INT32
        );
        assert!(root.values_at_head.local(0).expect("local").is_clear());
    }

    #[test]
    fn test_merge_marks_unvisited_successor() {
        let mut builder = GraphBuilder::new(1, 0);
        let next = builder.block();
        builder.jump(next);
        builder.switch_to(next);
        let zero = builder.int32(0);
        builder.ret(Edge::untyped(zero));
        let mut graph = builder.finish().expect("graph");

        let mut state = InPlaceAbstractState::new(&graph);
        state.initialize(&mut graph).expect("initialize");
        state.begin_basic_block(&mut graph, BlockIndex::ROOT).expect("begin");
        let changed = state.end_basic_block(&mut graph, true).expect("end");

        assert!(changed);
        let successor = graph.block(next).expect("successor");
        assert!(successor.cfa_should_revisit);
        assert!(successor.values_at_head.argument(0).expect("this").is_heap_top());
    }

    #[test]
    fn test_at_tail_defaults_to_top() {
        let mut builder = GraphBuilder::new(1, 0);
        let zero = builder.int32(0);
        builder.ret(Edge::untyped(zero));
        let graph = builder.finish().expect("graph");

        let mut state = AtTailAbstractState::new();
        state.initialize_to(&graph, BlockIndex::ROOT).expect("position");
        assert!(state.for_node(zero).is_heap_top());
    }
}
