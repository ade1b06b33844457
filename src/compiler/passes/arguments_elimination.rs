//! Arguments escape analysis and elimination.
//!
//! An arguments allocation (`CreateDirectArguments`, `CreateClonedArguments`) is
//! a candidate for elimination when every use of it can be answered from the
//! frame's argument slots. The pass proceeds in three steps:
//!
//! 1. Collect every allocation as a candidate.
//! 2. Drop candidates that escape: any use outside a small set of consumers that
//!    only read arguments (element and length reads, varargs loads and calls,
//!    hints and checks that cannot fail).
//! 3. Drop candidates whose argument slots may be overwritten while the
//!    allocation is live, found with liveness and the clobberize stack effects.
//!
//! Surviving allocations become phantom allocations (kept for exit state) and their
//! consumers read the stack directly.
//!
//! Varargs calls take their children as `[callee, this, arguments]`; `LoadVarargs`
//! and the argument reads take the arguments object as their first child.

use std::collections::BTreeSet;

use crate::{
    analysis::{
        clobberize, effects_of, heap::HeapPayload, AbstractHeap, AbstractHeapKind,
        ClobberizeVisitor, FrozenValue, SpeculatedType, Value,
    },
    compiler::{CompilationContext, EventKind, GraphPass},
    error::invariant_error,
    graph::{
        liveness::{compute_liveness, for_all_kills_in_block},
        ArithMode, ArrayType, BlockIndex, CallVarargsData, Edge, FlushFormat, Graph,
        InlineCallFrame, InsertionSet, LoadVarargsData, NodeId, NodeOrigin, Op, StackAccessData,
        UseKind, VirtualRegister,
    },
    Result,
};

const PASS: &str = "arguments-elimination";

/// Emits nodes computing the number of arguments (excluding `this`) of the
/// frame `arguments` was allocated in, scheduled before `index`.
///
/// Inline frames with a fixed argument count yield a constant; otherwise the count
/// slot is read and `this` subtracted.
pub(super) fn emit_arguments_length(
    graph: &mut Graph,
    insertions: &mut InsertionSet,
    index: usize,
    arguments: NodeId,
    origin: NodeOrigin,
) -> NodeId {
    let frame = graph
        .inline_call_frame(graph.node(arguments).origin.semantic)
        .cloned();

    if let Some(frame) = frame.as_ref().filter(|frame| !frame.is_varargs) {
        let length = i32::try_from(frame.argument_count_including_this.saturating_sub(1))
            .unwrap_or(i32::MAX);
        return insertions.insert_constant(
            graph,
            index,
            origin,
            FrozenValue::primitive(Value::Int32(length)),
        );
    }

    let count = match frame {
        Some(frame) => insertions.insert_node(
            graph,
            index,
            Op::GetStack(StackAccessData {
                local: frame.argument_count_register(),
                format: FlushFormat::Int32,
            }),
            origin,
            Vec::new(),
        ),
        None => insertions.insert_node(graph, index, Op::GetArgumentCount, origin, Vec::new()),
    };
    let one = insertions.insert_constant(graph, index, origin, FrozenValue::primitive(Value::Int32(1)));
    insertions.insert_node(
        graph,
        index,
        Op::ArithSub(ArithMode::Unchecked),
        origin,
        vec![Edge::new(count, UseKind::Int32), Edge::new(one, UseKind::Int32)],
    )
}

/// Register holding argument `index` (0 is `this`) of the frame `arguments` was
/// allocated in.
fn argument_register(graph: &Graph, arguments: NodeId, index: usize) -> VirtualRegister {
    match graph.inline_call_frame(graph.node(arguments).origin.semantic) {
        Some(frame) => frame.argument_register(index),
        None => VirtualRegister::argument(index),
    }
}

/// `true` if writing `register` may change what the arguments object allocated by
/// `candidate` would observe.
fn arguments_involve_stack_slot(graph: &Graph, candidate: NodeId, register: VirtualRegister) -> bool {
    match graph.inline_call_frame(graph.node(candidate).origin.semantic) {
        None => register.to_argument().is_some_and(|index| index >= 1),
        Some(frame) => {
            if frame.is_closure_call && register == frame.callee_register() {
                return true;
            }
            if frame.is_varargs && register == frame.argument_count_register() {
                return true;
            }
            (1..frame.argument_count_including_this)
                .any(|index| frame.argument_register(index) == register)
        }
    }
}

/// Stack writes of a whole block.
#[derive(Debug, Default)]
struct StackWrites {
    slots: BTreeSet<VirtualRegister>,
    everything: bool,
}

impl StackWrites {
    fn add(&mut self, heap: AbstractHeap) {
        match (heap.kind, heap.payload) {
            (AbstractHeapKind::Stack, HeapPayload::Slot(slot)) => match i32::try_from(slot) {
                Ok(slot) => {
                    self.slots.insert(VirtualRegister(slot));
                }
                Err(_) => self.everything = true,
            },
            _ if heap.overlaps(AbstractHeap::STACK) => self.everything = true,
            _ => {}
        }
    }

    fn interfere_with(&self, graph: &Graph, candidate: NodeId) -> bool {
        self.everything
            || self
                .slots
                .iter()
                .any(|&slot| arguments_involve_stack_slot(graph, candidate, slot))
    }
}

impl ClobberizeVisitor for StackWrites {
    fn write(&mut self, heap: AbstractHeap) {
        self.add(heap);
    }
}

/// Replaces arguments objects that never escape with direct stack reads.
pub struct ArgumentsEliminationPass;

impl Default for ArgumentsEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgumentsEliminationPass {
    /// Creates a new arguments elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct Elimination<'a> {
    ctx: &'a CompilationContext,
    candidates: BTreeSet<NodeId>,
}

impl<'a> Elimination<'a> {
    fn new(ctx: &'a CompilationContext) -> Self {
        Self {
            ctx,
            candidates: BTreeSet::new(),
        }
    }

    fn identify_candidates(&mut self, graph: &Graph) {
        for block in graph.blocks() {
            for &id in &block.nodes {
                if matches!(
                    graph.node(id).op,
                    Op::CreateDirectArguments | Op::CreateClonedArguments
                ) {
                    self.candidates.insert(id);
                }
            }
        }
    }

    fn evict(&mut self, graph: &Graph, candidate: NodeId, user: NodeId, kind: EventKind, why: &str) {
        if !self.candidates.remove(&candidate) {
            return;
        }
        if self.ctx.config.verbose_events {
            self.ctx
                .events
                .record(kind)
                .at(graph, user)
                .pass(PASS)
                .message(format!("{candidate} {why}"));
        }
    }

    fn escape(&mut self, graph: &Graph, edge: Option<Edge>, user: NodeId) {
        if let Some(edge) = edge {
            self.evict(graph, edge.node, user, EventKind::CandidateEscaped, "escapes");
        }
    }

    /// An array access escapes its base unless its array mode matches the kind of
    /// arguments object allocated.
    fn escape_based_on_array_mode(
        &mut self,
        graph: &Graph,
        array_type: ArrayType,
        edge: Option<Edge>,
        user: NodeId,
    ) {
        let Some(edge) = edge else {
            return;
        };
        let allocation = &graph.node(edge.node).op;
        let compatible = match array_type {
            ArrayType::DirectArguments => matches!(allocation, Op::CreateDirectArguments),
            ArrayType::Int32 | ArrayType::Double | ArrayType::Contiguous => {
                matches!(allocation, Op::CreateClonedArguments)
            }
            _ => false,
        };
        if !compatible {
            self.escape(graph, Some(edge), user);
        }
    }

    fn eliminate_candidates_that_escape(&mut self, graph: &Graph) {
        for block in graph.blocks() {
            for &id in &block.nodes {
                let node = graph.node(id);
                match &node.op {
                    Op::GetFromArguments(_) => {
                        if let Some(edge) = node.child1() {
                            if !matches!(graph.node(edge.node).op, Op::CreateDirectArguments) {
                                self.escape(graph, Some(edge), id);
                            }
                        }
                    }

                    Op::GetByVal(mode) => {
                        self.escape_based_on_array_mode(graph, mode.array_type, node.child1(), id);
                        self.escape(graph, node.child2(), id);
                        self.escape(graph, node.child3(), id);
                    }

                    Op::GetArrayLength(mode) | Op::CheckArray(mode) => {
                        self.escape_based_on_array_mode(graph, mode.array_type, node.child1(), id);
                        self.escape(graph, node.child2(), id);
                    }

                    Op::LoadVarargs(_) | Op::MovHint(_) | Op::GetButterfly => {}

                    Op::GetMyArgumentByVal => self.escape(graph, node.child2(), id),

                    Op::CallVarargs(_) | Op::ConstructVarargs(_) | Op::TailCallVarargs(_) => {
                        self.escape(graph, node.child1(), id);
                        self.escape(graph, node.child2(), id);
                    }

                    Op::Check => {
                        for &edge in &node.children {
                            if edge.will_not_have_check()
                                || edge.use_kind.already_checked(SpeculatedType::OBJECT)
                            {
                                continue;
                            }
                            self.escape(graph, Some(edge), id);
                        }
                    }

                    _ => {
                        for &edge in &node.children {
                            self.escape(graph, Some(edge), id);
                        }
                    }
                }
            }
        }
    }

    fn stack_writes_of_block(graph: &Graph, block: BlockIndex) -> Result<StackWrites> {
        let mut writes = StackWrites::default();
        for &id in &graph.try_block(block)?.nodes {
            clobberize(graph, id, &mut writes);
        }
        Ok(writes)
    }

    fn node_interferes(graph: &Graph, id: NodeId, candidate: NodeId) -> bool {
        let mut writes = StackWrites::default();
        for heap in effects_of(graph, id).writes {
            writes.add(heap);
        }
        writes.interfere_with(graph, candidate)
    }

    fn eliminate_candidates_that_interfere(&mut self, graph: &mut Graph) -> Result<()> {
        compute_liveness(graph)?;
        graph.initialize_node_owners();

        for block in graph.block_indices() {
            let writes = Self::stack_writes_of_block(graph, block)?;
            let mut kills = Vec::new();
            for_all_kills_in_block(graph, block, |index, node| kills.push((index, node)))?;

            let data = graph.try_block(block)?;
            for (kill_index, candidate) in kills {
                if !self.candidates.contains(&candidate) {
                    continue;
                }

                if kill_index == data.len() && graph.node(candidate).owner != Some(block) {
                    if writes.interfere_with(graph, candidate) {
                        let user = data.nodes.last().copied().unwrap_or(candidate);
                        self.evict(
                            graph,
                            candidate,
                            user,
                            EventKind::CandidateInterfered,
                            "is live across stack writes",
                        );
                    }
                    continue;
                }

                for &id in data.nodes[..kill_index].iter().rev() {
                    if id == candidate {
                        break;
                    }
                    if Self::node_interferes(graph, id, candidate) {
                        self.evict(
                            graph,
                            candidate,
                            id,
                            EventKind::CandidateInterfered,
                            "argument slot written while live",
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn candidate_child(&self, graph: &Graph, id: NodeId, index: usize) -> Option<Edge> {
        graph
            .node(id)
            .child(index)
            .filter(|edge| self.candidates.contains(&edge.node))
    }

    fn transform(&self, graph: &mut Graph) -> Result<()> {
        for block in graph.block_indices() {
            let mut insertions = InsertionSet::new();
            let len = graph.try_block(block)?.len();
            for index in 0..len {
                let id = graph.try_block(block)?.nodes[index];
                self.transform_node(graph, &mut insertions, index, id)?;
            }
            insertions.execute(graph, block)?;
        }
        Ok(())
    }

    fn transform_node(
        &self,
        graph: &mut Graph,
        insertions: &mut InsertionSet,
        index: usize,
        id: NodeId,
    ) -> Result<()> {
        let origin = graph.node(id).origin;
        match graph.node(id).op.clone() {
            Op::CreateDirectArguments if self.candidates.contains(&id) => {
                graph.node_mut(id).op = Op::PhantomDirectArguments;
            }

            Op::CreateClonedArguments if self.candidates.contains(&id) => {
                graph.node_mut(id).op = Op::PhantomClonedArguments;
            }

            Op::GetFromArguments(argument) => {
                let Some(arguments) = self.candidate_child(graph, id, 0) else {
                    return Ok(());
                };
                let register = argument_register(graph, arguments.node, argument as usize + 1);
                graph
                    .node_mut(id)
                    .convert_to_get_stack(StackAccessData::new(register));
            }

            Op::GetArrayLength(_) => {
                let Some(arguments) = self.candidate_child(graph, id, 0) else {
                    return Ok(());
                };
                let length = emit_arguments_length(graph, insertions, index, arguments.node, origin);
                graph.node_mut(id).convert_to_identity_on(length);
            }

            Op::GetByVal(_) => {
                let Some(arguments) = self.candidate_child(graph, id, 0) else {
                    return Ok(());
                };
                let Some(index_edge) = graph.node(id).child2() else {
                    return Err(invariant_error!("{} has no index", id));
                };
                let result =
                    Self::emit_argument_read(graph, insertions, index, arguments.node, index_edge, origin);
                let prediction = graph.node(id).prediction;
                graph.node_mut(result).prediction = prediction;
                graph.node_mut(id).convert_to_identity_on(result);
            }

            Op::LoadVarargs(data) => {
                let Some(arguments) = self.candidate_child(graph, id, 0) else {
                    return Ok(());
                };
                let frame = graph
                    .inline_call_frame(graph.node(arguments.node).origin.semantic)
                    .cloned();
                match frame {
                    Some(frame)
                        if !frame.is_varargs
                            && frame
                                .argument_count_including_this
                                .saturating_sub(data.offset as usize)
                                <= data.limit as usize =>
                    {
                        Self::expand_load_varargs(graph, insertions, index, &frame, data, origin)?;
                        graph.node_mut(id).remove();
                    }
                    _ => graph.node_mut(id).op = Op::ForwardVarargs(data),
                }
            }

            Op::CallVarargs(data) | Op::ConstructVarargs(data) | Op::TailCallVarargs(data) => {
                let Some(arguments) = self.candidate_child(graph, id, 2) else {
                    return Ok(());
                };
                let op = graph.node(id).op.clone();
                let frame = graph
                    .inline_call_frame(graph.node(arguments.node).origin.semantic)
                    .cloned();
                match frame {
                    Some(frame) if !frame.is_varargs => {
                        let arguments = Self::emit_call_arguments(graph, insertions, index, &frame, data, origin);
                        let node = graph.node_mut(id);
                        node.op = match op {
                            Op::ConstructVarargs(_) => Op::Construct,
                            Op::TailCallVarargs(_) => Op::TailCall,
                            _ => Op::Call,
                        };
                        node.children.truncate(2);
                        node.children.extend(arguments);
                    }
                    _ => {
                        graph.node_mut(id).op = match op {
                            Op::ConstructVarargs(_) => Op::ConstructForwardVarargs(data),
                            Op::TailCallVarargs(_) => Op::TailCallForwardVarargs(data),
                            _ => Op::CallForwardVarargs(data),
                        };
                    }
                }
            }

            Op::CheckArray(_) | Op::GetButterfly => {
                if self.candidate_child(graph, id, 0).is_some() {
                    graph.node_mut(id).remove();
                }
            }

            _ => {}
        }
        Ok(())
    }

    /// Reads argument `index_edge` of `arguments` from the stack when the index is
    /// a constant within the frame's static argument count, and falls back to
    /// `GetMyArgumentByVal` otherwise.
    fn emit_argument_read(
        graph: &mut Graph,
        insertions: &mut InsertionSet,
        index: usize,
        arguments: NodeId,
        index_edge: Edge,
        origin: NodeOrigin,
    ) -> NodeId {
        let frame = graph
            .inline_call_frame(graph.node(arguments).origin.semantic)
            .cloned();
        let static_count = frame
            .as_ref()
            .map_or(graph.num_arguments(), |frame| frame.argument_count_including_this);
        let constant_index = graph
            .node(index_edge.node)
            .constant()
            .and_then(|constant| constant.value.as_int32())
            .and_then(|value| usize::try_from(value).ok())
            .filter(|&value| value + 1 < static_count);

        let Some(argument) = constant_index else {
            return insertions.insert_node(
                graph,
                index,
                Op::GetMyArgumentByVal,
                origin,
                vec![Edge::untyped(arguments), index_edge],
            );
        };

        if frame.as_ref().map_or(true, |frame| frame.is_varargs) {
            let length = emit_arguments_length(graph, insertions, index, arguments, origin);
            insertions.insert_node(
                graph,
                index,
                Op::CheckInBounds,
                origin,
                vec![
                    Edge::new(index_edge.node, UseKind::Int32),
                    Edge::new(length, UseKind::Int32),
                ],
            );
        }
        let register = argument_register(graph, arguments, argument + 1);
        insertions.insert_node(
            graph,
            index,
            Op::GetStack(StackAccessData::new(register)),
            origin,
            Vec::new(),
        )
    }

    /// Replaces a `LoadVarargs` from a fixed-count inline frame with explicit
    /// stores of the count and each argument slot.
    fn expand_load_varargs(
        graph: &mut Graph,
        insertions: &mut InsertionSet,
        index: usize,
        frame: &InlineCallFrame,
        data: LoadVarargsData,
        origin: NodeOrigin,
    ) -> Result<()> {
        let argc = frame.argument_count_including_this;
        let count = i32::try_from(argc.saturating_sub(data.offset as usize)).unwrap_or(i32::MAX);
        let count = insertions.insert_constant(graph, index, origin, FrozenValue::primitive(Value::Int32(count)));
        insertions.insert_node(graph, index, Op::MovHint(data.count), origin, vec![Edge::untyped(count)]);
        insertions.insert_node(
            graph,
            index,
            Op::PutStack(StackAccessData {
                local: data.count,
                format: FlushFormat::Int32,
            }),
            origin,
            vec![Edge::new(count, UseKind::Int32)],
        );

        let Some(limit) = data.limit.checked_sub(1) else {
            return Err(invariant_error!("varargs load with zero limit"));
        };
        if limit < data.mandatory_minimum {
            return Err(invariant_error!(
                "varargs limit {} below mandatory minimum {}",
                limit,
                data.mandatory_minimum
            ));
        }

        let mut undefined = None;
        for store_index in 0..limit {
            let load_index = store_index as usize + data.offset as usize;
            let value = if load_index + 1 < argc {
                insertions.insert_node(
                    graph,
                    index,
                    Op::GetStack(StackAccessData::new(frame.argument_register(load_index + 1))),
                    origin,
                    Vec::new(),
                )
            } else {
                *undefined.get_or_insert_with(|| {
                    insertions.insert_constant(
                        graph,
                        index,
                        origin,
                        FrozenValue::primitive(Value::Undefined),
                    )
                })
            };
            let register = data.start.offset(store_index as i32);
            insertions.insert_node(graph, index, Op::MovHint(register), origin, vec![Edge::untyped(value)]);
            insertions.insert_node(
                graph,
                index,
                Op::PutStack(StackAccessData::new(register)),
                origin,
                vec![Edge::untyped(value)],
            );
        }
        Ok(())
    }

    /// Loads the arguments a varargs call would spread, for a frame whose count is
    /// fixed.
    fn emit_call_arguments(
        graph: &mut Graph,
        insertions: &mut InsertionSet,
        index: usize,
        frame: &InlineCallFrame,
        data: CallVarargsData,
        origin: NodeOrigin,
    ) -> Vec<Edge> {
        let first = 1 + data.first_var_arg_offset as usize;
        (first..frame.argument_count_including_this)
            .map(|argument| {
                let load = insertions.insert_node(
                    graph,
                    index,
                    Op::GetStack(StackAccessData::new(frame.argument_register(argument))),
                    origin,
                    Vec::new(),
                );
                Edge::untyped(load)
            })
            .collect()
    }
}

impl GraphPass for ArgumentsEliminationPass {
    fn name(&self) -> &'static str {
        PASS
    }

    fn description(&self) -> &'static str {
        "Replaces non-escaping arguments objects with direct stack reads"
    }

    fn should_run(&self, _graph: &Graph, ctx: &CompilationContext) -> bool {
        ctx.config.arguments_elimination_enabled
    }

    fn run(&self, graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
        graph.ensure_ssa(PASS)?;

        let mut elimination = Elimination::new(ctx);
        elimination.identify_candidates(graph);
        if elimination.candidates.is_empty() {
            return Ok(false);
        }

        elimination.eliminate_candidates_that_escape(graph);
        if elimination.candidates.is_empty() {
            return Ok(false);
        }

        elimination.eliminate_candidates_that_interfere(graph)?;
        if elimination.candidates.is_empty() {
            return Ok(false);
        }

        elimination.transform(graph)?;
        for &candidate in &elimination.candidates {
            ctx.events
                .record(EventKind::AllocationEliminated)
                .at(graph, candidate)
                .pass(PASS)
                .message(format!("{candidate} replaced by stack reads"));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::structure::PropertyId,
        graph::{ArrayMode, CodeOrigin, GraphBuilder, InlineFrameId, NodeType},
    };

    fn inline_frame(argc: usize, is_varargs: bool) -> InlineCallFrame {
        InlineCallFrame {
            stack_offset: -20,
            argument_count_including_this: argc,
            is_varargs,
            is_closure_call: false,
            caller: CodeOrigin::new(0),
        }
    }

    fn node_types(graph: &Graph) -> Vec<NodeType> {
        graph
            .blocks()
            .flat_map(|block| block.nodes.iter())
            .map(|&id| graph.node(id).node_type())
            .collect()
    }

    fn reads_with_constant_indices(builder: &mut GraphBuilder, arguments: NodeId) -> (NodeId, NodeId) {
        let mode = ArrayMode::new(ArrayType::DirectArguments);
        let zero = builder.int32(0);
        let one = builder.int32(1);
        let first = builder.add(
            Op::GetByVal(mode),
            [Edge::new(arguments, UseKind::Cell), Edge::new(zero, UseKind::Int32)],
        );
        let second = builder.add(
            Op::GetByVal(mode),
            [Edge::new(arguments, UseKind::Cell), Edge::new(one, UseKind::Int32)],
        );
        (first, second)
    }

    #[test]
    fn test_constant_reads_become_stack_loads() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(3, 0);
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let (first, second) = reads_with_constant_indices(&mut builder, arguments);
        let sum = builder.add(
            Op::ValueAdd,
            [Edge::untyped(first), Edge::untyped(second)],
        );
        builder.ret(Edge::untyped(sum));
        let mut graph = builder.finish().unwrap();

        assert!(ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.node(arguments).op, Op::PhantomDirectArguments);
        for (read, argument) in [(first, 1), (second, 2)] {
            assert_eq!(graph.node(read).op, Op::Identity);
            let load = graph.node(read).children[0].node;
            assert_eq!(
                graph.node(load).op,
                Op::GetStack(StackAccessData::new(VirtualRegister::argument(argument)))
            );
        }
        // The root frame's count is dynamic, so each read keeps a bounds check.
        let types = node_types(&graph);
        assert_eq!(
            types.iter().filter(|&&t| t == NodeType::CheckInBounds).count(),
            2
        );
        assert!(ctx.events.has(EventKind::AllocationEliminated));
    }

    #[test]
    fn test_inline_frame_reads_need_no_bounds_check() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let frame = builder.inline_frame(inline_frame(3, false));
        builder.at_origin(CodeOrigin::inlined(1, frame));
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let (first, _) = reads_with_constant_indices(&mut builder, arguments);
        builder.ret(Edge::untyped(first));
        let mut graph = builder.finish().unwrap();

        assert!(ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        let load = graph.node(first).children[0].node;
        assert_eq!(
            graph.node(load).op,
            Op::GetStack(StackAccessData::new(VirtualRegister::argument(1).offset(-20)))
        );
        assert!(!node_types(&graph).contains(&NodeType::CheckInBounds));
    }

    #[test]
    fn test_captured_arguments_escape() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(2, 0);
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let (first, _) = reads_with_constant_indices(&mut builder, arguments);
        let object = builder.add(Op::GetCallee, []);
        builder.add(
            Op::PutById(PropertyId(7)),
            [Edge::new(object, UseKind::Cell), Edge::untyped(arguments)],
        );
        builder.ret(Edge::untyped(first));
        let mut graph = builder.finish().unwrap();

        assert!(!ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.node(arguments).op, Op::CreateDirectArguments);
        assert!(matches!(graph.node(first).op, Op::GetByVal(_)));
        assert!(!ctx.events.has(EventKind::AllocationEliminated));
    }

    #[test]
    fn test_argument_write_interferes() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(2, 0);
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let value = builder.int32(3);
        builder.add(
            Op::PutStack(StackAccessData::new(VirtualRegister::argument(1))),
            [Edge::untyped(value)],
        );
        let length = builder.add(
            Op::GetArrayLength(ArrayMode::new(ArrayType::DirectArguments)),
            [Edge::new(arguments, UseKind::Cell)],
        );
        builder.ret(Edge::untyped(length));
        let mut graph = builder.finish().unwrap();

        assert!(!ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.node(arguments).op, Op::CreateDirectArguments);
    }

    #[test]
    fn test_varargs_call_from_fixed_frame_becomes_call() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let frame: InlineFrameId = builder.inline_frame(inline_frame(3, false));
        builder.at_origin(CodeOrigin::inlined(1, frame));
        let arguments = builder.add(Op::CreateClonedArguments, []);
        let callee = builder.add(Op::GetCallee, []);
        let this = builder.int32(0);
        let call = builder.add(
            Op::CallVarargs(CallVarargsData {
                first_var_arg_offset: 0,
            }),
            [
                Edge::new(callee, UseKind::Cell),
                Edge::untyped(this),
                Edge::untyped(arguments),
            ],
        );
        builder.ret(Edge::untyped(call));
        let mut graph = builder.finish().unwrap();

        assert!(ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        let node = graph.node(call);
        assert_eq!(node.op, Op::Call);
        assert_eq!(node.children.len(), 4);
        assert_eq!(node.children[0].node, callee);
        assert_eq!(
            graph.node(node.children[2].node).op,
            Op::GetStack(StackAccessData::new(VirtualRegister::argument(1).offset(-20)))
        );
    }

    #[test]
    fn test_varargs_frame_forwards() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 2);
        let frame = builder.inline_frame(inline_frame(2, true));
        builder.at_origin(CodeOrigin::inlined(1, frame));
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let data = LoadVarargsData {
            start: VirtualRegister::local(0),
            count: VirtualRegister::local(1),
            offset: 0,
            limit: 2,
            mandatory_minimum: 0,
        };
        let load = builder.add(Op::LoadVarargs(data), [Edge::untyped(arguments)]);
        let undefined = builder.constant(Value::Undefined);
        builder.ret(Edge::untyped(undefined));
        let mut graph = builder.finish().unwrap();

        assert!(ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.node(load).op, Op::ForwardVarargs(data));
        assert_eq!(graph.node(arguments).op, Op::PhantomDirectArguments);
    }

    #[test]
    fn test_fixed_frame_load_varargs_expands_to_stores() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 4);
        let frame = builder.inline_frame(inline_frame(2, false));
        builder.at_origin(CodeOrigin::inlined(1, frame));
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let data = LoadVarargsData {
            start: VirtualRegister::local(0),
            count: VirtualRegister::local(3),
            offset: 0,
            limit: 3,
            mandatory_minimum: 0,
        };
        let load = builder.add(Op::LoadVarargs(data), [Edge::untyped(arguments)]);
        let undefined = builder.constant(Value::Undefined);
        builder.ret(Edge::untyped(undefined));
        let mut graph = builder.finish().unwrap();

        assert!(ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.node(load).op, Op::Check);
        let types = node_types(&graph);
        // Count plus two argument slots.
        assert_eq!(types.iter().filter(|&&t| t == NodeType::PutStack).count(), 3);
        assert_eq!(types.iter().filter(|&&t| t == NodeType::MovHint).count(), 3);
    }

    fn stored_constant(graph: &Graph, register: VirtualRegister) -> Option<Value> {
        graph
            .blocks()
            .flat_map(|block| block.nodes.iter())
            .find_map(|&id| match graph.node(id).op {
                Op::PutStack(slot) if slot.local == register => graph.node(id).child1(),
                _ => None,
            })
            .and_then(|edge| graph.node(edge.node).constant())
            .map(|frozen| frozen.value)
    }

    #[test]
    fn test_load_varargs_offset_past_frame_loads_nothing() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 4);
        let frame = builder.inline_frame(inline_frame(2, false));
        builder.at_origin(CodeOrigin::inlined(1, frame));
        let arguments = builder.add(Op::CreateDirectArguments, []);
        let data = LoadVarargsData {
            start: VirtualRegister::local(0),
            count: VirtualRegister::local(3),
            offset: 3,
            limit: 2,
            mandatory_minimum: 0,
        };
        let load = builder.add(Op::LoadVarargs(data), [Edge::untyped(arguments)]);
        let undefined = builder.constant(Value::Undefined);
        builder.ret(Edge::untyped(undefined));
        let mut graph = builder.finish().unwrap();

        assert!(ArgumentsEliminationPass::new().run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.node(load).op, Op::Check);
        assert_eq!(stored_constant(&graph, data.count), Some(Value::Int32(0)));
        assert_eq!(stored_constant(&graph, data.start), Some(Value::Undefined));
    }
}
