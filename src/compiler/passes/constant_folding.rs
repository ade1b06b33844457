//! Constant folding and check elimination.
//!
//! Replays every block the analysis marked with `cfa_found_constants`, starting
//! from the head state [`CfaPass`](super::CfaPass) computed. Before each node
//! executes, an opcode-specific simplification may fire on the state that precedes
//! it; otherwise the node executes normally and, if its result is now a known
//! value, is rewritten into a constant with its still-pending checks kept as an
//! explicit `Check`.
//!
//! # Simplifications
//!
//! - Structure, cell, array and bounds checks that the state already proves are
//!   removed, after their narrowing has been applied to the state.
//! - `MultiGetByOffset`/`MultiPutByOffset` cases that the base's structures rule out
//!   are dropped; a single remaining case becomes a direct offset access.
//! - `GetById`/`PutById` with a finite set of base structures are turned into offset
//!   accesses (one variant) or their multi-case forms.
//! - `GetMyArgumentByVal` with a constant, statically in-bounds index becomes a stack
//!   read, guarded by a bounds check unless the frame's argument count is fixed.
//!
//! Afterwards, `Upsilon`s whose `Phi` became a constant are removed, blocks are
//! truncated with `Unreachable` after the point where the analysis proves
//! execution cannot continue, branches with a proved direction become jumps and
//! blocks left unreachable are deleted.

use crate::{
    analysis::{
        structure::{
            is_inline_offset, PropertyId, PropertyOffset, StructureAbstractValue, StructureSet,
        },
        AbstractInterpreter, AbstractState, AbstractValue, InPlaceAbstractState, SpeculatedType,
        Value,
    },
    compiler::{
        oracle::{GetByIdStatus, PutByIdStatus},
        CompilationContext, EventKind, GraphPass,
    },
    error::invariant_error,
    graph::{
        BlockIndex, BranchDirection, Edge, GetByOffsetMethod, Graph, InsertionSet,
        MultiGetByOffsetCase, MultiGetByOffsetData, MultiPutByOffsetData, NodeId, NodeType, Op,
        PutByIdVariant, PutByIdVariantKind, StackAccessData, StorageAccessData, UseKind,
        VirtualRegister,
    },
    Result,
};

use super::arguments_elimination::emit_arguments_length;

const PASS: &str = "constant-folding";

/// Folds constants and removes checks the abstract interpreter proved.
pub struct ConstantFoldingPass;

impl Default for ConstantFoldingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantFoldingPass {
    /// Creates a new constant folding pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// What a simplification did with the node.
enum Outcome {
    /// Nothing; the node executes normally.
    Unchanged,
    /// The node was rewritten and still has to be executed.
    Rewritten,
    /// The node was executed (and possibly rewritten).
    Handled { changed: bool },
}

struct Folder<'a> {
    ctx: &'a CompilationContext,
    interpreter: AbstractInterpreter<'a, InPlaceAbstractState>,
    insertions: InsertionSet,
}

impl<'a> Folder<'a> {
    fn new(ctx: &'a CompilationContext, graph: &Graph) -> Self {
        Self {
            ctx,
            interpreter: AbstractInterpreter::new(ctx, InPlaceAbstractState::new(graph)),
            insertions: InsertionSet::new(),
        }
    }

    fn record(&self, graph: &Graph, kind: EventKind, node: NodeId, message: String) {
        self.ctx
            .events
            .record(kind)
            .at(graph, node)
            .pass(PASS)
            .message(message);
    }

    fn value_of(&mut self, node: NodeId) -> AbstractValue {
        self.interpreter.state_mut().for_node(node).clone()
    }

    fn fold_block(&mut self, graph: &mut Graph, block: BlockIndex) -> Result<bool> {
        self.interpreter.state_mut().begin_basic_block(graph, block)?;
        let len = graph.try_block(block)?.len();
        let mut changed = false;

        for index in 0..len {
            if !self.interpreter.state().is_valid() {
                break;
            }
            let id = graph
                .try_block(block)?
                .at(index)
                .ok_or_else(|| invariant_error!("no node at index {} of {}", index, block))?;

            match self.simplify(graph, index, id)? {
                Outcome::Handled { changed: did_change } => {
                    changed |= did_change;
                    continue;
                }
                Outcome::Rewritten => changed = true,
                Outcome::Unchanged => {}
            }

            // Folding a node whose continuation is unreachable would invent a value.
            if !self.interpreter.execute(graph, index)? {
                break;
            }
            changed |= self.fold_to_constant(graph, index, id);
        }

        self.interpreter.state_mut().reset();
        self.insertions.execute(graph, block)?;
        Ok(changed)
    }

    fn fold_to_constant(&mut self, graph: &mut Graph, index: usize, id: NodeId) -> bool {
        let node = graph.node(id);
        if !node.should_generate()
            || self.interpreter.state().did_clobber()
            || node.has_constant()
            || !node.has_result()
        {
            return false;
        }
        let Some(value) = self.interpreter.state_mut().for_node(id).value else {
            return false;
        };

        let frozen = self.ctx.freeze(value);
        let (origin, children) = (node.origin, node.children.clone());
        let description = node.op.to_string();
        self.insertions.insert_check(graph, index, origin, &children);
        graph.node_mut(id).convert_to_constant(frozen);
        self.record(
            graph,
            EventKind::ConstantFolded,
            id,
            format!("{description} folded to {frozen}"),
        );
        true
    }

    fn simplify(&mut self, graph: &mut Graph, index: usize, id: NodeId) -> Result<Outcome> {
        let node = graph.node(id);
        let op = node.op.clone();
        let Some(base) = node.child1() else {
            return Ok(Outcome::Unchanged);
        };

        let proved = match &op {
            Op::CheckStructure(set) => self.value_of(base.node).structure.is_subset_of(set),
            Op::CheckArray(mode) => mode.already_checked(&self.value_of(base.node)),
            Op::PutStructure(transition) => {
                self.value_of(base.node).structure.only_structure() == Some(transition.next)
            }
            Op::CheckCell(cell) => self.value_of(base.node).value == Some(cell.value),
            Op::CheckInBounds => {
                let checked = self.value_of(base.node).value.and_then(Value::as_int32);
                let length = node
                    .child2()
                    .and_then(|edge| self.value_of(edge.node).value)
                    .and_then(Value::as_int32);
                matches!((checked, length), (Some(i), Some(n)) if n >= 0 && (i as u32) < (n as u32))
            }
            Op::GetMyArgumentByVal => return self.reduce_get_my_argument_by_val(graph, index, id),
            Op::MultiGetByOffset(data) => {
                return self.prune_multi_get_by_offset(graph, index, id, base, data.clone());
            }
            Op::MultiPutByOffset(data) => {
                return self.prune_multi_put_by_offset(graph, index, id, base, data.clone());
            }
            Op::GetById(identifier) => {
                return Ok(self.reduce_get_by_id(graph, index, id, base, *identifier));
            }
            Op::PutById(identifier) => {
                return self.reduce_put_by_id(graph, index, id, base, *identifier);
            }
            Op::Check => {
                self.interpreter.execute(graph, index)?;
                let node = graph.node_mut(id);
                let before = node.children.len();
                node.children.retain(Edge::will_have_check);
                return Ok(Outcome::Handled {
                    changed: node.children.len() != before,
                });
            }
            _ => false,
        };
        if !proved {
            return Ok(Outcome::Unchanged);
        }

        // The check's narrowing still applies to everything after it.
        self.interpreter.execute(graph, index)?;
        let description = graph.node(id).op.to_string();
        graph.node_mut(id).remove();
        self.record(graph, EventKind::CheckRemoved, id, format!("{description} is proved"));
        Ok(Outcome::Handled { changed: true })
    }

    fn reduce_get_my_argument_by_val(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
    ) -> Result<Outcome> {
        let node = graph.node(id);
        let (Some(arguments), Some(index_edge)) = (node.child1(), node.child2()) else {
            return Ok(Outcome::Unchanged);
        };
        let origin = node.origin;
        let Some(argument) = self
            .value_of(index_edge.node)
            .value
            .and_then(Value::as_int32)
            .and_then(|i| usize::try_from(i).ok())
        else {
            return Ok(Outcome::Unchanged);
        };

        // Past the static argument count there is no slot to read.
        let frame = graph
            .inline_call_frame(graph.node(arguments.node).origin.semantic)
            .cloned();
        let static_count = frame
            .as_ref()
            .map_or(graph.num_arguments(), |frame| frame.argument_count_including_this);
        if argument + 1 >= static_count {
            return Ok(Outcome::Unchanged);
        }

        self.interpreter.execute(graph, index)?;
        let register = frame.as_ref().map_or(VirtualRegister::argument(argument + 1), |frame| {
            frame.argument_register(argument + 1)
        });
        if !frame.as_ref().is_some_and(|frame| !frame.is_varargs) {
            let length =
                emit_arguments_length(graph, &mut self.insertions, index, arguments.node, origin);
            self.insertions.insert_node(
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
        graph
            .node_mut(id)
            .convert_to_get_stack(StackAccessData::new(register));
        self.record(
            graph,
            EventKind::AccessStrengthReduced,
            id,
            format!("argument {argument} read from {register}"),
        );
        Ok(Outcome::Handled { changed: true })
    }

    fn prune_multi_get_by_offset(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: Edge,
        mut data: MultiGetByOffsetData,
    ) -> Result<Outcome> {
        let base_value = self.value_of(base.node);
        self.interpreter.execute(graph, index)?;

        let before = data.cases.len();
        for case in &mut data.cases {
            case.set.filter_by_value(&base_value);
        }
        data.cases.retain(|case| !case.set.is_empty());
        let mut changed = data.cases.len() != before;
        if changed {
            self.record(
                graph,
                EventKind::MultiAccessPruned,
                id,
                format!("{} of {before} cases remain", data.cases.len()),
            );
        }

        if let [case] = data.cases.as_slice() {
            let case = case.clone();
            self.emit_get_by_offset(
                graph,
                index,
                id,
                base,
                &base_value,
                &case.set,
                case.method,
                data.identifier,
            );
            changed = true;
        } else if changed {
            graph.node_mut(id).op = Op::MultiGetByOffset(data);
        }
        Ok(Outcome::Handled { changed })
    }

    fn prune_multi_put_by_offset(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: Edge,
        mut data: MultiPutByOffsetData,
    ) -> Result<Outcome> {
        let base_value = self.value_of(base.node);
        self.interpreter.execute(graph, index)?;

        let before = data.variants.clone();
        for variant in &mut data.variants {
            variant.old_structure.filter_by_value(&base_value);
            if variant.kind == PutByIdVariantKind::Transition
                && variant.old_structure.only_structure() == variant.new_structure
            {
                *variant = PutByIdVariant::replace(variant.old_structure.clone(), variant.offset);
            }
        }
        data.variants.retain(|variant| !variant.old_structure.is_empty());
        let mut changed = data.variants != before;
        if data.variants.len() != before.len() {
            self.record(
                graph,
                EventKind::MultiAccessPruned,
                id,
                format!("{} of {} variants remain", data.variants.len(), before.len()),
            );
        }

        match data.variants.as_slice() {
            [variant] if !variant.reallocates_storage => {
                let variant = variant.clone();
                self.emit_put_by_offset(
                    graph,
                    index,
                    id,
                    base,
                    &base_value,
                    &variant,
                    data.identifier,
                );
                changed = true;
            }
            _ if changed => graph.node_mut(id).op = Op::MultiPutByOffset(data),
            _ => {}
        }
        Ok(Outcome::Handled { changed })
    }

    fn reduce_get_by_id(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: Edge,
        identifier: PropertyId,
    ) -> Outcome {
        let base_value = self.value_of(base.node);
        if base.use_kind == UseKind::Untyped || !base_value.is_type(SpeculatedType::CELL) {
            return Outcome::Unchanged;
        }
        let Some(structures) = Self::access_structures(&base_value) else {
            return Outcome::Unchanged;
        };
        let GetByIdStatus::Simple(variants) =
            self.ctx
                .oracle()
                .get_by_id_status(&self.ctx.registry, &structures, identifier)
        else {
            return Outcome::Unchanged;
        };

        match variants.as_slice() {
            [] => return Outcome::Unchanged,
            [variant] => {
                let method = self
                    .ctx
                    .try_get_constant_property(
                        &graph.watchpoints,
                        base_value.value,
                        &StructureAbstractValue::from_set(variant.structure_set.clone()),
                        variant.offset,
                    )
                    .map_or(GetByOffsetMethod::Load(variant.offset), |value| {
                        GetByOffsetMethod::Constant(self.ctx.freeze(value))
                    });
                let set = variant.structure_set.clone();
                self.emit_get_by_offset(
                    graph,
                    index,
                    id,
                    base,
                    &base_value,
                    &set,
                    method,
                    identifier,
                );
            }
            _ => {
                let cases = variants
                    .iter()
                    .map(|variant| MultiGetByOffsetCase {
                        set: variant.structure_set.clone(),
                        method: GetByOffsetMethod::Load(variant.offset),
                    })
                    .collect();
                graph.node_mut(id).op =
                    Op::MultiGetByOffset(MultiGetByOffsetData { identifier, cases });
                self.record(
                    graph,
                    EventKind::AccessStrengthReduced,
                    id,
                    format!("{identifier} dispatched over {} cases", variants.len()),
                );
            }
        }
        Outcome::Rewritten
    }

    fn reduce_put_by_id(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: Edge,
        identifier: PropertyId,
    ) -> Result<Outcome> {
        let base_value = self.value_of(base.node);
        self.interpreter.execute(graph, index)?;

        if !base_value.is_type(SpeculatedType::CELL) {
            return Ok(Outcome::Handled { changed: false });
        }
        let Some(structures) = Self::access_structures(&base_value) else {
            return Ok(Outcome::Handled { changed: false });
        };
        let PutByIdStatus::Simple(variants) =
            self.ctx
                .oracle()
                .put_by_id_status(&self.ctx.registry, &structures, identifier)
        else {
            return Ok(Outcome::Handled { changed: false });
        };

        match variants.as_slice() {
            [] => return Ok(Outcome::Handled { changed: false }),
            [variant] if !variant.reallocates_storage => {
                let variant = variant.clone();
                self.emit_put_by_offset(graph, index, id, base, &base_value, &variant, identifier);
            }
            _ => {
                let count = variants.len();
                graph.node_mut(id).op = Op::MultiPutByOffset(MultiPutByOffsetData {
                    identifier,
                    variants,
                });
                self.record(
                    graph,
                    EventKind::AccessStrengthReduced,
                    id,
                    format!("{identifier} dispatched over {count} variants"),
                );
            }
        }
        Ok(Outcome::Handled { changed: true })
    }

    fn access_structures(base: &AbstractValue) -> Option<StructureSet> {
        (base.structure.is_finite() && !base.structure.is_empty())
            .then(|| base.structure.set().clone())
    }

    /// Guards `base` for an access that handles only the structures in `set`.
    fn add_base_check(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: NodeId,
        base_value: &AbstractValue,
        set: &StructureSet,
    ) {
        let origin = graph.node(id).origin;
        if !base_value.structure.is_subset_of(set) {
            self.insertions.insert_node(
                graph,
                index,
                Op::CheckStructure(set.clone()),
                origin,
                vec![Edge::new(base, UseKind::Cell)],
            );
        } else if !base_value.is_type(SpeculatedType::CELL) {
            self.insertions
                .insert_check(graph, index, origin, &[Edge::new(base, UseKind::Cell)]);
        }
    }

    /// The property storage for `offset`: the cell itself or its butterfly.
    fn storage_for(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: NodeId,
        offset: PropertyOffset,
    ) -> Edge {
        if is_inline_offset(offset) {
            return Edge::new(base, UseKind::KnownCell);
        }
        let origin = graph.node(id).origin;
        let butterfly = self.insertions.insert_node(
            graph,
            index,
            Op::GetButterfly,
            origin,
            vec![Edge::new(base, UseKind::KnownCell)],
        );
        Edge::untyped(butterfly)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_get_by_offset(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: Edge,
        base_value: &AbstractValue,
        set: &StructureSet,
        method: GetByOffsetMethod,
        identifier: PropertyId,
    ) {
        self.add_base_check(graph, index, id, base.node, base_value, set);
        let message = match method {
            GetByOffsetMethod::Constant(value) => {
                graph.node_mut(id).convert_to_constant(value);
                format!("{identifier} is the constant {value}")
            }
            GetByOffsetMethod::Load(offset) => {
                let storage = self.storage_for(graph, index, id, base.node, offset);
                let node = graph.node_mut(id);
                node.op = Op::GetByOffset(StorageAccessData { offset, identifier });
                node.children = vec![storage, Edge::new(base.node, UseKind::KnownCell)];
                format!("{identifier} loaded from offset {offset}")
            }
        };
        self.record(graph, EventKind::AccessStrengthReduced, id, message);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_put_by_offset(
        &mut self,
        graph: &mut Graph,
        index: usize,
        id: NodeId,
        base: Edge,
        base_value: &AbstractValue,
        variant: &PutByIdVariant,
        identifier: PropertyId,
    ) {
        let Some(value) = graph.node(id).child2() else {
            return;
        };
        let origin = graph.node(id).origin;
        self.add_base_check(graph, index, id, base.node, base_value, &variant.old_structure);
        let storage = self.storage_for(graph, index, id, base.node, variant.offset);

        let node = graph.node_mut(id);
        node.op = Op::PutByOffset(StorageAccessData {
            offset: variant.offset,
            identifier,
        });
        node.children = vec![storage, Edge::new(base.node, UseKind::KnownCell), value];

        if let Some(transition) = variant.as_transition() {
            self.insertions.insert_node(
                graph,
                index + 1,
                Op::PutStructure(transition),
                origin,
                vec![Edge::new(base.node, UseKind::KnownCell)],
            );
        }
        self.record(
            graph,
            EventKind::AccessStrengthReduced,
            id,
            format!("{identifier} stored at offset {}", variant.offset),
        );
    }

    /// Removes `Upsilon`s feeding a `Phi` that became a constant.
    fn fix_upsilons(&self, graph: &mut Graph) -> Result<()> {
        for block in graph.block_indices() {
            let nodes = graph.try_block(block)?.nodes.clone();
            for id in nodes {
                let Op::Upsilon { phi } = graph.node(id).op else {
                    continue;
                };
                match graph.node(phi).node_type() {
                    NodeType::Phi => {}
                    NodeType::JSConstant => {
                        graph.node_mut(id).remove();
                        self.record(
                            graph,
                            EventKind::PhiInputRewritten,
                            id,
                            format!("{phi} is a constant"),
                        );
                    }
                    other => {
                        return Err(invariant_error!("{} feeds {} which is {}", id, phi, other));
                    }
                }
            }
        }
        Ok(())
    }

    /// Truncates blocks where the replay proves execution stops and turns branches
    /// with a proved direction into jumps. Returns `true` if anything changed.
    fn clip_blocks(&mut self, graph: &mut Graph) -> Result<bool> {
        let mut changed = false;
        for block in graph.block_indices() {
            if !graph.try_block(block)?.cfa_has_visited {
                continue;
            }
            self.interpreter.state_mut().begin_basic_block(graph, block)?;
            let len = graph.try_block(block)?.len();
            for index in 0..len {
                let Some(id) = graph.try_block(block)?.at(index) else {
                    break;
                };
                if graph.node(id).is_terminal() {
                    break;
                }
                if !self.interpreter.state().is_valid() {
                    let origin = graph.node(id).origin;
                    graph.try_block_mut(block)?.nodes.truncate(index);
                    let unreachable = graph.add_node(Op::Unreachable, Vec::new(), origin);
                    graph.append(block, unreachable)?;
                    self.ctx
                        .events
                        .record(EventKind::BlockClipped)
                        .at(graph, unreachable)
                        .pass(PASS)
                        .message(format!("{block} truncated after {index} nodes"));
                    changed = true;
                    break;
                }
                self.interpreter.execute(graph, index)?;
            }
            self.interpreter.state_mut().reset();
            changed |= self.fold_branch(graph, block)?;
        }
        Ok(changed)
    }

    fn fold_branch(&mut self, graph: &mut Graph, block: BlockIndex) -> Result<bool> {
        let Some(terminal) = graph.terminal(block) else {
            return Ok(false);
        };
        let Op::Branch(data) = graph.node(terminal).op else {
            return Ok(false);
        };
        let target = match graph.try_block(block)?.cfa_branch_direction {
            BranchDirection::TakeTrue => data.taken,
            BranchDirection::TakeFalse => data.not_taken,
            _ => return Ok(false),
        };

        let node = graph.node(terminal);
        let (origin, children) = (node.origin, node.children.clone());
        let position = graph.try_block(block)?.len() - 1;
        let mut insertions = InsertionSet::new();
        insertions.insert_check(graph, position, origin, &children);
        let node = graph.node_mut(terminal);
        node.op = Op::Jump(target);
        node.children.clear();
        insertions.execute(graph, block)?;
        self.record(graph, EventKind::Info, terminal, format!("branch always goes to {target}"));
        Ok(true)
    }
}

impl GraphPass for ConstantFoldingPass {
    fn name(&self) -> &'static str {
        PASS
    }

    fn description(&self) -> &'static str {
        "Folds constants, removes proved checks and strength-reduces property accesses"
    }

    fn should_run(&self, _graph: &Graph, ctx: &CompilationContext) -> bool {
        ctx.config.constant_folding_enabled
    }

    fn run(&self, graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
        graph.ensure_ssa(PASS)?;
        let mut folder = Folder::new(ctx, graph);

        let mut changed = false;
        for block in graph.block_indices() {
            if graph.try_block(block)?.cfa_found_constants {
                changed |= folder.fold_block(graph, block)?;
            }
        }
        if changed {
            folder.fix_upsilons(graph)?;
        }

        if folder.clip_blocks(graph)? {
            changed = true;
            graph.compute_predecessors();
            let removed = graph.kill_unreachable_blocks();
            if removed > 0 {
                ctx.events
                    .record(EventKind::BlockRemoved)
                    .graph(graph)
                    .pass(PASS)
                    .message(format!("removed {removed} unreachable blocks"));
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::CellKind,
        compiler::passes::CfaPass,
        graph::{ArithMode, GraphBuilder, IndexingShape, IndexingType},
    };

    fn analyze_and_fold(ctx: &CompilationContext, graph: &mut Graph) -> bool {
        CfaPass::analyze(graph, ctx).unwrap();
        ConstantFoldingPass::new().run(graph, ctx).unwrap()
    }

    fn ops(graph: &Graph, block: BlockIndex) -> Vec<Op> {
        graph
            .block(block)
            .unwrap()
            .nodes
            .iter()
            .map(|&id| graph.node(id).op.clone())
            .collect()
    }

    #[test]
    fn test_checked_add_folds_without_guard() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let four = builder.int32(4);
        let five = builder.int32(5);
        let add = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(four, UseKind::Int32), Edge::new(five, UseKind::Int32)],
        );
        builder.ret(Edge::untyped(add));
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        assert_eq!(graph.node(add).constant().map(|c| c.value), Some(Value::Int32(9)));
        assert!(!ops(&graph, BlockIndex::ROOT).contains(&Op::Check));
        assert!(ctx.events.has(EventKind::ConstantFolded));
    }

    #[test]
    fn test_subsumed_structure_check_keeps_narrowing() {
        let ctx = CompilationContext::new();
        let indexing = IndexingType::non_array(IndexingShape::None);
        let s1 = ctx.registry.create_structure(CellKind::FinalObject, indexing);
        let s2 = ctx.registry.create_structure(CellKind::FinalObject, indexing);

        let mut builder = GraphBuilder::new(1, 0);
        let object = builder.add(Op::NewObject(s1), []);
        let wide: StructureSet = [s1, s2].into_iter().collect();
        let first = builder.add(Op::CheckStructure(wide), [Edge::new(object, UseKind::Cell)]);
        let second = builder.add(
            Op::CheckStructure(StructureSet::single(s1)),
            [Edge::new(object, UseKind::Cell)],
        );
        builder.ret(Edge::untyped(object));
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        assert_eq!(graph.node(first).op, Op::Check);
        assert_eq!(graph.node(second).op, Op::Check);
        assert_eq!(ctx.events.count_kind(EventKind::CheckRemoved), 2);
    }

    #[test]
    fn test_constant_bounds_check_is_removed() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let index = builder.int32(1);
        let length = builder.int32(3);
        let check = builder.add(
            Op::CheckInBounds,
            [Edge::new(index, UseKind::Int32), Edge::new(length, UseKind::Int32)],
        );
        builder.ret(Edge::untyped(index));
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        assert_eq!(graph.node(check).op, Op::Check);
        assert!(graph.node(check).children.is_empty());
    }

    #[test]
    fn test_multi_get_prunes_to_direct_load() {
        let ctx = CompilationContext::new();
        let indexing = IndexingType::non_array(IndexingShape::None);
        let s1 = ctx.registry.create_structure(CellKind::FinalObject, indexing);
        let s2 = ctx.registry.create_structure(CellKind::FinalObject, indexing);
        let x = PropertyId(1);
        ctx.registry.add_property(s1, x, 0);
        ctx.registry.add_property(s2, x, 1);

        let mut builder = GraphBuilder::new(1, 0);
        let object = builder.add(Op::NewObject(s1), []);
        let load = builder.add(
            Op::MultiGetByOffset(MultiGetByOffsetData {
                identifier: x,
                cases: vec![
                    MultiGetByOffsetCase {
                        set: StructureSet::single(s1),
                        method: GetByOffsetMethod::Load(0),
                    },
                    MultiGetByOffsetCase {
                        set: StructureSet::single(s2),
                        method: GetByOffsetMethod::Load(1),
                    },
                ],
            }),
            [Edge::new(object, UseKind::Cell)],
        );
        builder.ret(Edge::untyped(load));
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        assert_eq!(
            graph.node(load).op,
            Op::GetByOffset(StorageAccessData {
                offset: 0,
                identifier: x
            })
        );
        // Already known to be S1: no structure check is needed.
        assert!(!ops(&graph, BlockIndex::ROOT)
            .iter()
            .any(|op| matches!(op, Op::CheckStructure(_))));
        assert!(ctx.events.has(EventKind::MultiAccessPruned));
        assert!(ctx.events.has(EventKind::AccessStrengthReduced));
    }

    #[test]
    fn test_block_is_clipped_after_forced_exit() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let callee = builder.add(Op::GetCallee, []);
        builder.add(Op::ForceOSRExit, []);
        let one = builder.int32(1);
        builder.ret(Edge::untyped(one));
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        let ops = ops(&graph, BlockIndex::ROOT);
        assert_eq!(ops.len(), 3);
        assert_eq!(graph.node(callee).op, Op::GetCallee);
        assert_eq!(ops[1], Op::ForceOSRExit);
        assert_eq!(ops[2], Op::Unreachable);
        assert!(ctx.events.has(EventKind::BlockClipped));
    }

    #[test]
    fn test_proved_branch_becomes_jump() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let taken = builder.block();
        let not_taken = builder.block();
        let flag = builder.constant(Value::Boolean(true));
        builder.branch(Edge::new(flag, UseKind::Boolean), taken, not_taken);
        for block in [taken, not_taken] {
            builder.switch_to(block);
            let zero = builder.int32(0);
            builder.ret(Edge::untyped(zero));
        }
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        let terminal = graph.terminal(BlockIndex::ROOT).unwrap();
        assert_eq!(graph.node(terminal).op, Op::Jump(taken));
        assert!(graph.block(not_taken).is_none());
        assert!(ctx.events.has(EventKind::BlockRemoved));
    }

    #[test]
    fn test_constant_phi_drops_its_upsilons() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let next = builder.block();
        let one = builder.int32(1);
        let phi = builder.graph_mut().add_node(Op::Phi, vec![], Default::default());
        let upsilon = builder.add(Op::Upsilon { phi }, [Edge::untyped(one)]);
        builder.jump(next);

        builder.switch_to(next);
        builder.graph_mut().append(next, phi).unwrap();
        builder.ret(Edge::untyped(phi));
        let mut graph = builder.finish().unwrap();

        assert!(analyze_and_fold(&ctx, &mut graph));
        assert_eq!(graph.node(phi).constant().map(|c| c.value), Some(Value::Int32(1)));
        assert_eq!(graph.node(upsilon).op, Op::Check);
        assert!(ctx.events.has(EventKind::PhiInputRewritten));
    }
}
