//! The abstract interpreter: per-node transfer functions over [`AbstractValue`]s.
//!
//! Execution of a node has two halves. [`AbstractInterpreter::execute_edges`] applies
//! each use's speculation to the child's value and records on the edge whether the
//! check is already proved. [`AbstractInterpreter::execute_effects`] then computes
//! the node's result and applies its side effects to the state: clobbering
//! structure sets, recording transitions, deciding branches and cutting off the rest
//! of the block after a contradiction.
//!
//! The interpreter is generic over the [`AbstractState`] it reads and writes, so the
//! same transfer functions serve the control-flow analysis (walking a block in
//! place) and code motion (executing a hoisted node at a block's tail).

use crate::{
    analysis::{
        clobberize::converts_untyped_operands,
        speculation::is_negative_zero,
        structure::{
            PropertyId, StructureAbstractValue, StructureRegistrar, StructureSet, Transition,
        },
        value::{js_number, js_round, strict_equal, to_int32},
        AbstractState, AbstractValue, CellKind, FiltrationResult, FrozenValue, SpeculatedType,
        StructureClobberState, Value,
    },
    compiler::{CompilationContext, GetByIdStatus, GetByIdVariant, PutByIdStatus},
    error::invariant_error,
    graph::{
        ArithMode, ArrayType, BranchDirection, GetByOffsetMethod, Graph, Node, NodeId, Op,
        ProofStatus, PutByIdVariant, PutByIdVariantKind, RoundingMode, UseKind, VirtualRegister,
    },
    Result,
};

/// Result type of double arithmetic whose inputs are unknown.
const DOUBLE_RESULT: SpeculatedType = SpeculatedType::BYTECODE_DOUBLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryArith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryArith {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryArith::Add => a + b,
            BinaryArith::Sub => a - b,
            BinaryArith::Mul => a * b,
            BinaryArith::Div => a / b,
            BinaryArith::Mod => a % b,
        }
    }

    /// The int32 result of `a op b` under `mode`, if the operation cannot exit.
    fn fold_int32(self, mode: ArithMode, a: i32, b: i32) -> Option<Value> {
        let d = self.apply(f64::from(a), f64::from(b));
        match mode {
            ArithMode::DoOverflow => Some(js_number(d)),
            ArithMode::Unchecked => Some(Value::Int32(match self {
                BinaryArith::Add => a.wrapping_add(b),
                BinaryArith::Sub => a.wrapping_sub(b),
                BinaryArith::Mul => a.wrapping_mul(b),
                BinaryArith::Div | BinaryArith::Mod => to_int32(d),
            })),
            _ => {
                // Adding +0 turns a -0 result into +0.
                let d = if mode.should_check_negative_zero() { d } else { d + 0.0 };
                match js_number(d) {
                    Value::Int32(i) => Some(Value::Int32(i)),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitOp {
    And,
    Or,
    Xor,
    LShift,
    RShift,
    URShift,
}

impl BitOp {
    fn apply(self, a: i32, b: i32) -> i32 {
        let shift = (b & 31) as u32;
        match self {
            BitOp::And => a & b,
            BitOp::Or => a | b,
            BitOp::Xor => a ^ b,
            BitOp::LShift => a.wrapping_shl(shift),
            BitOp::RShift => a.wrapping_shr(shift),
            BitOp::URShift => ((a as u32) >> shift) as i32,
        }
    }
}

/// Truthiness of a value, when the abstract value decides it.
///
/// Cells are only decided when every possible structure is a non-string kind:
/// objects are always truthy, strings depend on their length.
pub fn boolean_result(value: &AbstractValue) -> Option<bool> {
    if let Some(result) = value.value.and_then(Value::to_boolean) {
        return Some(result);
    }
    if value.is_set() && value.is_type(SpeculatedType::OTHER) {
        return Some(false);
    }
    if value.ty.is_object() {
        return Some(true);
    }
    if value.ty.is_cell()
        && value.structure.is_finite()
        && !value.structure.is_empty()
        && value.structure.iter().all(|s| s.kind != CellKind::String)
    {
        return Some(true);
    }
    None
}

/// Widens a type so that values which may compare strictly equal share bits.
fn strict_equality_class(ty: SpeculatedType) -> SpeculatedType {
    let mut class = ty;
    if ty.intersects(SpeculatedType::FULL_NUMBER) {
        class |= SpeculatedType::FULL_NUMBER;
    }
    if ty.intersects(SpeculatedType::STRING) {
        class |= SpeculatedType::STRING;
    }
    class
}

/// Executes nodes against an [`AbstractState`].
pub struct AbstractInterpreter<'a, S: AbstractState> {
    ctx: &'a CompilationContext,
    state: S,
}

impl<'a, S: AbstractState> AbstractInterpreter<'a, S> {
    /// Creates an interpreter over `state`.
    pub fn new(ctx: &'a CompilationContext, state: S) -> Self {
        Self { ctx, state }
    }

    /// The state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The state, mutably.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Consumes the interpreter, returning its state.
    pub fn into_state(self) -> S {
        self.state
    }

    /// Prepares the state for executing one node.
    pub fn start_executing(&mut self) {
        self.state.set_did_clobber(false);
    }

    /// Executes the node at `index_in_block` of the state's current block.
    ///
    /// Returns `false` if the node proved the rest of the block unreachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the state has no current block or the index is out of
    /// range.
    pub fn execute(&mut self, graph: &mut Graph, index_in_block: usize) -> Result<bool> {
        let block = self
            .state
            .block()
            .ok_or_else(|| invariant_error!("execute without a current block"))?;
        let node = graph.try_block(block)?.at(index_in_block).ok_or_else(|| {
            invariant_error!("no node at index {} of {}", index_in_block, block)
        })?;
        self.start_executing();
        self.execute_edges(graph, node)?;
        Ok(self.execute_effects(graph, index_in_block, node))
    }

    /// Executes `node` outside of a block walk, as if it were placed at the point the
    /// state describes. Every value the state tracks may be clobbered.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not part of `graph`.
    pub fn execute_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<bool> {
        self.start_executing();
        self.execute_edges(graph, node)?;
        Ok(self.execute_effects(graph, usize::MAX, node))
    }

    /// Applies each use kind's filter to the child's value and records whether the
    /// check is already proved.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not part of `graph`.
    pub fn execute_edges(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let mut children = graph.try_node(node)?.children.clone();
        for edge in &mut children {
            let filter = edge.use_kind.type_filter();
            let value = self.state.for_node(edge.node);
            edge.proof = if value.is_type(filter) {
                ProofStatus::IsProved
            } else {
                ProofStatus::NeedsCheck
            };
            if value.filter_type(filter) == FiltrationResult::Contradiction {
                self.state.set_is_valid(false);
            }
        }
        graph.node_mut(node).children = children;
        Ok(())
    }

    /// Computes the result and the side effects of `id`.
    ///
    /// `clobber_limit` is the node's index in the current block: node values past it
    /// are not yet computed and are left alone by clobbering. Returns the state's
    /// validity afterwards.
    pub fn execute_effects(&mut self, graph: &Graph, clobber_limit: usize, id: NodeId) -> bool {
        let node = graph.node(id);
        match &node.op {
            Op::JSConstant(value) => self.set_constant(graph, id, *value),

            Op::Identity => {
                let value = self.child_value(node, 0);
                if value.value.is_some() {
                    self.state.set_found_constants(true);
                }
                *self.state.for_node(id) = value;
            }

            Op::Phi => {
                if self.state.for_node(id).value.is_some() {
                    self.state.set_found_constants(true);
                }
            }

            Op::Upsilon { phi } => {
                let value = self.child_value(node, 0);
                self.state.create_value_for_node(*phi);
                *self.state.for_node(*phi) = value;
            }

            Op::BottomValue | Op::PhantomDirectArguments | Op::PhantomClonedArguments => {
                // Claims bottom; keeps constant folding away from the node.
                self.state.set_did_clobber(true);
            }

            Op::Check => {
                if node
                    .children
                    .iter()
                    .any(|edge| edge.is_proved() || edge.will_not_have_check())
                {
                    self.state.set_found_constants(true);
                }
            }

            Op::GetCallee => self.set_type(graph, id, SpeculatedType::FUNCTION),
            Op::GetArgumentCount => self.set_type(graph, id, SpeculatedType::INT32),

            Op::GetStack(data) => {
                let mut value = self
                    .state
                    .variables()
                    .operand(data.local)
                    .cloned()
                    .unwrap_or_default();
                if value.is_clear() {
                    value.make_heap_top();
                }
                if value.value.is_some() {
                    self.state.set_found_constants(true);
                }
                *self.state.for_node(id) = value;
            }

            Op::PutStack(data) => {
                let value = self.child_value(node, 0);
                if let Some(slot) = self.state.variables().operand_mut(data.local) {
                    *slot = value;
                }
            }

            Op::MovHint(_) | Op::KillStack(_) => {}

            Op::ArithAdd(mode) => self.execute_binary_arith(graph, node, id, BinaryArith::Add, *mode),
            Op::ArithSub(mode) => self.execute_binary_arith(graph, node, id, BinaryArith::Sub, *mode),
            Op::ArithMul(mode) => self.execute_binary_arith(graph, node, id, BinaryArith::Mul, *mode),
            Op::ArithDiv(mode) => self.execute_binary_arith(graph, node, id, BinaryArith::Div, *mode),
            Op::ArithMod(mode) => self.execute_binary_arith(graph, node, id, BinaryArith::Mod, *mode),

            Op::ArithNegate(mode) => self.execute_negate(graph, node, id, *mode),
            Op::ArithAbs(mode) => self.execute_abs(graph, node, id, *mode),
            Op::ArithMin => self.execute_min_max(graph, node, id, clobber_limit, false),
            Op::ArithMax => self.execute_min_max(graph, node, id, clobber_limit, true),

            Op::ArithSqrt => match self.child_constant(node, 0).and_then(Value::as_number) {
                Some(x) => self.set_constant(graph, id, FrozenValue::primitive(Value::Double(x.sqrt()))),
                None => self.set_type(graph, id, DOUBLE_RESULT),
            },

            Op::ArithRound(mode) => self.execute_round(graph, node, id, *mode),

            Op::ValueAdd => {
                let left = self.child_constant(node, 0).and_then(Value::as_number);
                let right = self.child_constant(node, 1).and_then(Value::as_number);
                if let (Some(a), Some(b)) = (left, right) {
                    self.set_constant(graph, id, FrozenValue::primitive(js_number(a + b)));
                } else {
                    self.clobber_world(graph, clobber_limit);
                    self.set_type(
                        graph,
                        id,
                        SpeculatedType::STRING | SpeculatedType::BYTECODE_NUMBER,
                    );
                }
            }

            Op::BitAnd => self.execute_bit_op(graph, node, id, clobber_limit, BitOp::And),
            Op::BitOr => self.execute_bit_op(graph, node, id, clobber_limit, BitOp::Or),
            Op::BitXor => self.execute_bit_op(graph, node, id, clobber_limit, BitOp::Xor),
            Op::BitLShift => self.execute_bit_op(graph, node, id, clobber_limit, BitOp::LShift),
            Op::BitRShift => self.execute_bit_op(graph, node, id, clobber_limit, BitOp::RShift),
            Op::BitURShift => self.execute_bit_op(graph, node, id, clobber_limit, BitOp::URShift),

            Op::UInt32ToNumber(mode) => {
                let constant = self.child_constant(node, 0).and_then(Value::as_int32);
                match (constant, *mode) {
                    (Some(x), ArithMode::DoOverflow) => self.set_constant(
                        graph,
                        id,
                        FrozenValue::primitive(js_number(f64::from(x as u32))),
                    ),
                    (Some(x), _) if x >= 0 => {
                        self.set_constant(graph, id, FrozenValue::primitive(Value::Int32(x)));
                    }
                    (_, ArithMode::DoOverflow) => self.set_type(
                        graph,
                        id,
                        SpeculatedType::INT32 | SpeculatedType::INT52_AS_DOUBLE,
                    ),
                    _ => self.set_type(graph, id, SpeculatedType::INT32),
                }
            }

            Op::ValueToInt32 => {
                let child = self.child_value(node, 0);
                let folded = child.value.and_then(|value| match value {
                    Value::Int32(_) | Value::Double(_) => value.as_number().map(to_int32),
                    Value::Boolean(b) => Some(i32::from(b)),
                    Value::Undefined | Value::Null => Some(0),
                    _ => None,
                });
                if folded.is_none() && converts_untyped_operands(node) {
                    self.clobber_world(graph, clobber_limit);
                }
                match folded {
                    Some(i) => self.set_constant(graph, id, FrozenValue::primitive(Value::Int32(i))),
                    None if child.is_type(SpeculatedType::BOOLEAN) => {
                        self.set_type(graph, id, SpeculatedType::BOOL_INT32);
                    }
                    None => self.set_type(graph, id, SpeculatedType::INT32),
                }
            }

            Op::DoubleRep => self.execute_double_rep(graph, node, id),

            Op::ValueRep => {
                let child = self.child_value(node, 0);
                if let Some(d) = child.value.and_then(Value::as_number) {
                    let d = if d.is_nan() { f64::NAN } else { d };
                    self.set_constant(graph, id, FrozenValue::primitive(Value::Double(d)));
                } else {
                    let mut ty = child.ty;
                    if ty.intersects(SpeculatedType::DOUBLE_IMPURE_NAN) {
                        ty = (ty & !SpeculatedType::DOUBLE_IMPURE_NAN) | SpeculatedType::DOUBLE_PURE_NAN;
                    }
                    self.set_type(graph, id, ty);
                }
            }

            Op::CompareLess
            | Op::CompareLessEq
            | Op::CompareGreater
            | Op::CompareGreaterEq
            | Op::CompareEq => self.execute_compare(graph, node, id, clobber_limit),

            Op::CompareStrictEq => {
                let left = self.child_value(node, 0);
                let right = self.child_value(node, 1);
                let decided = match (left.value, right.value) {
                    (Some(a), Some(b)) => strict_equal(a, b),
                    _ => None,
                };
                let decided = decided.or_else(|| {
                    let disjoint = left.is_set()
                        && right.is_set()
                        && !strict_equality_class(left.ty).intersects(strict_equality_class(right.ty));
                    disjoint.then_some(false)
                });
                match decided {
                    Some(b) => self.set_constant(graph, id, FrozenValue::primitive(Value::Boolean(b))),
                    None => self.set_type(graph, id, SpeculatedType::BOOLEAN),
                }
            }

            Op::LogicalNot => match boolean_result(&self.child_value(node, 0)) {
                Some(b) => self.set_constant(graph, id, FrozenValue::primitive(Value::Boolean(!b))),
                None => self.set_type(graph, id, SpeculatedType::BOOLEAN),
            },

            Op::CheckStructure(set) => {
                if let Some(base) = node.child1() {
                    let value = self.state.for_node(base.node);
                    if value.structure.is_finite() && value.structure.is_subset_of(set) {
                        self.state.set_found_constants(true);
                    } else {
                        self.filter(base.node, |v| v.filter_structures(set, SpeculatedType::NONE));
                    }
                }
            }

            Op::CheckCell(cell) => {
                if let Some(child) = node.child1() {
                    if self.state.for_node(child.node).value == Some(cell.value) {
                        self.state.set_found_constants(true);
                    } else {
                        self.filter(child.node, |v| v.filter_by_value(*cell));
                    }
                }
            }

            Op::CheckArray(mode) => {
                if let Some(base) = node.child1() {
                    if mode.already_checked(self.state.for_node(base.node)) {
                        self.state.set_found_constants(true);
                    } else {
                        match mode.array_type {
                            ArrayType::String => {
                                self.filter(base.node, |v| v.filter_type(SpeculatedType::STRING));
                            }
                            ArrayType::DirectArguments => {
                                self.filter(base.node, |v| {
                                    v.filter_type(SpeculatedType::DIRECT_ARGUMENTS)
                                });
                            }
                            _ => {}
                        }
                        let modes = mode.array_modes_that_pass_filtering();
                        self.filter(base.node, |v| v.filter_array_modes(modes));
                    }
                }
            }

            Op::CheckInBounds => {
                let index = self.child_constant(node, 0).and_then(Value::as_int32);
                let length = self.child_constant(node, 1).and_then(Value::as_int32);
                if let (Some(index), Some(length)) = (index, length) {
                    if (index as u32) < (length as u32) {
                        self.state.set_found_constants(true);
                    }
                }
            }

            Op::GetById(identifier) => {
                let base = self.child_value(node, 0);
                if let Some(status) = self.get_by_id_status(&base, *identifier) {
                    let mut result = AbstractValue::default();
                    for variant in &status {
                        let structures = StructureAbstractValue::from_set(variant.structure_set.clone());
                        match self.ctx.try_get_constant_property(
                            &graph.watchpoints,
                            base.value,
                            &structures,
                            variant.offset,
                        ) {
                            Some(value) => {
                                let mut this = AbstractValue::default();
                                let registrar = self.ctx.registrar(&graph.watchpoints);
                                this.set_constant(
                                    self.ctx.freeze(value),
                                    self.state.structure_clobber_state(),
                                    &registrar,
                                );
                                result.merge(&this);
                            }
                            None => {
                                result.make_heap_top();
                                break;
                            }
                        }
                    }
                    *self.state.for_node(id) = result;
                    self.state.set_found_constants(true);
                } else {
                    self.clobber_world(graph, clobber_limit);
                    self.state.for_node(id).make_heap_top();
                }
            }

            Op::PutById(identifier) => {
                let base_edge = node.child1();
                let base = self.child_value(node, 0);
                match self.put_by_id_status(&base, *identifier) {
                    Some(variants) => {
                        let registrar = self.ctx.registrar(&graph.watchpoints);
                        let mut new_set = StructureSet::new();
                        let mut transitions = Vec::new();
                        for variant in &variants {
                            match (variant.kind, variant.as_transition()) {
                                (PutByIdVariantKind::Transition, Some(transition)) => {
                                    registrar.register_structure(transition.next);
                                    new_set.add(transition.next);
                                    transitions.push(transition);
                                }
                                _ => {
                                    new_set.merge(&variant.old_structure);
                                }
                            }
                        }
                        self.observe_transitions(graph, clobber_limit, &transitions);
                        if let Some(base) = base_edge {
                            self.filter(base.node, |v| v.change_structure(&new_set));
                        }
                        self.state.set_found_constants(true);
                    }
                    None => self.clobber_world(graph, clobber_limit),
                }
            }

            Op::GetByOffset(data) => {
                let base = self.child_value(node, 1);
                match self.ctx.try_get_constant_property(
                    &graph.watchpoints,
                    base.value,
                    &base.structure,
                    data.offset,
                ) {
                    Some(value) => {
                        let frozen = self.ctx.freeze(value);
                        self.set_constant(graph, id, frozen);
                    }
                    None => self.state.for_node(id).make_heap_top(),
                }
            }

            Op::PutByOffset(_) | Op::PutToArguments(_) => {}

            Op::MultiGetByOffset(data) => {
                let Some(base_edge) = node.child1() else {
                    return self.state.is_valid();
                };
                let base = self.child_value(node, 0);
                let registrar = self.ctx.registrar(&graph.watchpoints);
                let clobber_state = self.state.structure_clobber_state();
                let mut result = AbstractValue::default();
                let mut base_set = StructureSet::new();
                for case in &data.cases {
                    let mut set = case.set.clone();
                    set.filter_by_value(&base);
                    if set.is_empty() {
                        continue;
                    }
                    base_set.merge(&set);
                    match &case.method {
                        GetByOffsetMethod::Constant(constant) => {
                            let mut this = AbstractValue::default();
                            this.set_constant(*constant, clobber_state, &registrar);
                            result.merge(&this);
                        }
                        GetByOffsetMethod::Load(_) => result.make_heap_top(),
                    }
                }
                self.state.set_found_constants(true);
                if self.filter(base_edge.node, |v| v.change_structure(&base_set))
                    == FiltrationResult::Contradiction
                {
                    return false;
                }
                *self.state.for_node(id) = result;
            }

            Op::MultiPutByOffset(data) => {
                let Some(base_edge) = node.child1() else {
                    return self.state.is_valid();
                };
                let base = self.child_value(node, 0);
                let registrar = self.ctx.registrar(&graph.watchpoints);
                let mut new_set = StructureSet::new();
                let mut transitions = Vec::new();
                for variant in &data.variants {
                    let mut set = variant.old_structure.clone();
                    set.filter_by_value(&base);
                    if set.is_empty() {
                        continue;
                    }
                    match (variant.kind, variant.new_structure) {
                        (PutByIdVariantKind::Transition, Some(next)) => {
                            registrar.register_structure(next);
                            if set.only_structure() != Some(next) {
                                if let Some(previous) = variant.old_structure_for_transition() {
                                    transitions.push(Transition { previous, next });
                                }
                            }
                            new_set.add(next);
                        }
                        _ => {
                            new_set.merge(&set);
                        }
                    }
                }
                self.state.set_found_constants(true);
                self.observe_transitions(graph, clobber_limit, &transitions);
                self.filter(base_edge.node, |v| v.change_structure(&new_set));
            }

            Op::PutStructure(transition) => {
                if let Some(base) = node.child1() {
                    let structure = &self.state.for_node(base.node).structure;
                    if !structure.is_clear() {
                        if structure.is_finite() && structure.only_structure() == Some(transition.next) {
                            self.state.set_found_constants(true);
                        } else {
                            self.observe_transitions(graph, clobber_limit, &[*transition]);
                            let next = StructureSet::single(transition.next);
                            self.filter(base.node, |v| v.change_structure(&next));
                        }
                    }
                }
            }

            Op::GetButterfly => self.state.for_node(id).clear(),

            Op::GetByVal(mode) => {
                let out_of_bounds = mode.is_out_of_bounds();
                let in_bounds_type = match mode.array_type {
                    ArrayType::ForceExit => {
                        self.state.set_is_valid(false);
                        return false;
                    }
                    ArrayType::Generic => {
                        self.clobber_world(graph, clobber_limit);
                        None
                    }
                    ArrayType::DirectArguments => None,
                    ArrayType::String => Some(SpeculatedType::STRING),
                    ArrayType::Int32 => Some(SpeculatedType::INT32),
                    ArrayType::Double => Some(SpeculatedType::DOUBLE_REAL),
                    ArrayType::Contiguous | ArrayType::ArrayStorage => None,
                };
                let result = if out_of_bounds && mode.array_type != ArrayType::Generic {
                    // A hole or a missing index reads the prototype chain.
                    self.clobber_world(graph, clobber_limit);
                    None
                } else {
                    in_bounds_type
                };
                match result {
                    Some(ty) => self.set_type(graph, id, ty),
                    None => self.state.for_node(id).make_heap_top(),
                }
            }

            Op::PutByVal(mode) => {
                let mode = mode.for_put();
                match mode.array_type {
                    ArrayType::ForceExit => {
                        self.state.set_is_valid(false);
                        return false;
                    }
                    ArrayType::Generic => self.clobber_world(graph, clobber_limit),
                    _ if mode.is_out_of_bounds() => self.clobber_world(graph, clobber_limit),
                    _ => {}
                }
            }

            Op::GetArrayLength(_) => self.set_type(graph, id, SpeculatedType::INT32),

            Op::NewObject(structure) => self.state.for_node(id).set_structure(*structure),
            Op::CreateDirectArguments => self.set_type(graph, id, SpeculatedType::DIRECT_ARGUMENTS),
            Op::CreateClonedArguments => self.set_type(graph, id, SpeculatedType::OBJECT_OTHER),

            Op::GetFromArguments(_) => self.state.for_node(id).make_heap_top(),

            Op::GetMyArgumentByVal => self.execute_get_my_argument_by_val(graph, node, id),

            Op::LoadVarargs(data) | Op::ForwardVarargs(data) => {
                if matches!(node.op, Op::LoadVarargs(_)) {
                    self.clobber_world(graph, clobber_limit);
                }
                let variables = self.state.variables();
                if let Some(count) = variables.operand_mut(data.count) {
                    *count = AbstractValue::of_type(SpeculatedType::INT32);
                }
                for i in 0..data.limit.saturating_sub(1) {
                    if let Some(slot) = variables.operand_mut(data.start.offset(i as i32)) {
                        slot.make_heap_top();
                    }
                }
            }

            Op::Call
            | Op::Construct
            | Op::CallVarargs(_)
            | Op::ConstructVarargs(_)
            | Op::CallForwardVarargs(_)
            | Op::ConstructForwardVarargs(_) => {
                self.clobber_world(graph, clobber_limit);
                self.state.for_node(id).make_heap_top();
            }

            Op::TailCall | Op::TailCallVarargs(_) | Op::TailCallForwardVarargs(_) => {
                self.clobber_world(graph, clobber_limit);
                self.state.set_is_valid(false);
            }

            Op::Jump(_) | Op::LoopHint => {}

            Op::Branch(_) => {
                let direction = match boolean_result(&self.child_value(node, 0)) {
                    Some(b) => BranchDirection::from_bool(b),
                    None => BranchDirection::TakeBoth,
                };
                self.state.set_branch_direction(direction);
            }

            Op::Return | Op::Unreachable | Op::ForceOSRExit => self.state.set_is_valid(false),

            Op::InvalidationPoint => {
                self.state
                    .for_all_values(graph, clobber_limit, &mut |value| value.observe_invalidation_point());
                self.state
                    .set_structure_clobber_state(StructureClobberState::StructuresAreWatched);
            }
        }
        self.state.is_valid()
    }

    // ── Effects ─────────────────────────────────────────────────────────

    /// Accounts for an effect that may write any heap location.
    pub fn clobber_world(&mut self, graph: &Graph, clobber_limit: usize) {
        self.clobber_structures(graph, clobber_limit);
    }

    fn clobber_structures(&mut self, graph: &Graph, clobber_limit: usize) {
        let registrar = self.ctx.registrar(&graph.watchpoints);
        self.state
            .for_all_values(graph, clobber_limit, &mut |value| value.clobber_structures(&registrar));
        self.state
            .set_structure_clobber_state(StructureClobberState::StructuresAreClobbered);
        self.state.set_did_clobber(true);
    }

    fn observe_transitions(&mut self, graph: &Graph, clobber_limit: usize, transitions: &[Transition]) {
        if transitions.is_empty() {
            return;
        }
        self.state
            .for_all_values(graph, clobber_limit, &mut |value| value.observe_transitions(transitions));
    }

    // ── Value helpers ───────────────────────────────────────────────────

    fn child_value(&mut self, node: &Node, index: usize) -> AbstractValue {
        node.child(index)
            .map(|edge| self.state.for_node(edge.node).clone())
            .unwrap_or_default()
    }

    fn child_constant(&mut self, node: &Node, index: usize) -> Option<Value> {
        let edge = node.child(index)?;
        self.state.for_node(edge.node).value
    }

    fn set_constant(&mut self, graph: &Graph, id: NodeId, value: FrozenValue) {
        let clobber_state = self.state.structure_clobber_state();
        let registrar = self.ctx.registrar(&graph.watchpoints);
        let out = self.state.for_node(id);
        out.set_constant(value, clobber_state, &registrar);
        if graph.node(id).result_is_double() {
            out.fix_type_for_double_representation();
        }
        self.state.set_found_constants(true);
    }

    fn set_type(&mut self, graph: &Graph, id: NodeId, ty: SpeculatedType) {
        let out = self.state.for_node(id);
        out.set_type(ty);
        if graph.node(id).result_is_double() {
            out.fix_type_for_double_representation();
        }
    }

    fn filter(
        &mut self,
        node: NodeId,
        filter: impl FnOnce(&mut AbstractValue) -> FiltrationResult,
    ) -> FiltrationResult {
        let result = filter(self.state.for_node(node));
        if result == FiltrationResult::Contradiction {
            self.state.set_is_valid(false);
        }
        result
    }

    fn can_use_structures(base: &AbstractValue) -> bool {
        base.ty.is_cell() && base.structure.is_finite() && !base.structure.is_empty()
    }

    fn get_by_id_status(
        &self,
        base: &AbstractValue,
        identifier: PropertyId,
    ) -> Option<Vec<GetByIdVariant>> {
        if !Self::can_use_structures(base) {
            return None;
        }
        match self
            .ctx
            .oracle()
            .get_by_id_status(&self.ctx.registry, base.structure.set(), identifier)
        {
            GetByIdStatus::Simple(variants) if !variants.is_empty() => Some(variants),
            _ => None,
        }
    }

    fn put_by_id_status(
        &self,
        base: &AbstractValue,
        identifier: PropertyId,
    ) -> Option<Vec<PutByIdVariant>> {
        if !Self::can_use_structures(base) {
            return None;
        }
        match self
            .ctx
            .oracle()
            .put_by_id_status(&self.ctx.registry, base.structure.set(), identifier)
        {
            PutByIdStatus::Simple(variants) if !variants.is_empty() => Some(variants),
            _ => None,
        }
    }

    // ── Transfer functions ──────────────────────────────────────────────

    fn execute_binary_arith(
        &mut self,
        graph: &Graph,
        node: &Node,
        id: NodeId,
        op: BinaryArith,
        mode: ArithMode,
    ) {
        let use_kind = node.child1().map_or(UseKind::Untyped, |edge| edge.use_kind);
        let left = self.child_constant(node, 0);
        let right = self.child_constant(node, 1);
        match use_kind {
            UseKind::Int32 | UseKind::KnownInt32 => {
                let folded = match (left.and_then(Value::as_int32), right.and_then(Value::as_int32)) {
                    (Some(a), Some(b)) => op.fold_int32(mode, a, b),
                    _ => None,
                };
                match folded {
                    Some(value) => self.set_constant(graph, id, FrozenValue::primitive(value)),
                    None if mode == ArithMode::DoOverflow => {
                        self.set_type(graph, id, SpeculatedType::BYTECODE_NUMBER);
                    }
                    None => self.set_type(graph, id, SpeculatedType::INT32),
                }
            }
            UseKind::DoubleRep => {
                match (left.and_then(Value::as_number), right.and_then(Value::as_number)) {
                    (Some(a), Some(b)) => self.set_constant(
                        graph,
                        id,
                        FrozenValue::primitive(Value::Double(op.apply(a, b))),
                    ),
                    _ => self.set_type(graph, id, DOUBLE_RESULT),
                }
            }
            _ => match (left.and_then(Value::as_number), right.and_then(Value::as_number)) {
                (Some(a), Some(b)) => {
                    self.set_constant(graph, id, FrozenValue::primitive(js_number(op.apply(a, b))));
                }
                _ => self.set_type(graph, id, SpeculatedType::BYTECODE_NUMBER),
            },
        }
    }

    fn execute_negate(&mut self, graph: &Graph, node: &Node, id: NodeId, mode: ArithMode) {
        let use_kind = node.child1().map_or(UseKind::Untyped, |edge| edge.use_kind);
        let constant = self.child_constant(node, 0);
        match use_kind {
            UseKind::Int32 | UseKind::KnownInt32 => {
                let folded = constant.and_then(Value::as_int32).and_then(|x| {
                    if !mode.should_check_overflow() {
                        return Some(x.wrapping_neg());
                    }
                    let d = if mode.should_check_negative_zero() {
                        -f64::from(x)
                    } else {
                        0.0 - f64::from(x)
                    };
                    match js_number(d) {
                        Value::Int32(i) => Some(i),
                        _ => None,
                    }
                });
                match folded {
                    Some(i) => self.set_constant(graph, id, FrozenValue::primitive(Value::Int32(i))),
                    None => self.set_type(graph, id, SpeculatedType::INT32),
                }
            }
            _ => match constant.and_then(Value::as_number) {
                Some(x) if use_kind == UseKind::DoubleRep => {
                    self.set_constant(graph, id, FrozenValue::primitive(Value::Double(-x)));
                }
                Some(x) => self.set_constant(graph, id, FrozenValue::primitive(js_number(-x))),
                None if use_kind == UseKind::DoubleRep => self.set_type(graph, id, DOUBLE_RESULT),
                None => self.set_type(graph, id, SpeculatedType::BYTECODE_NUMBER),
            },
        }
    }

    fn execute_abs(&mut self, graph: &Graph, node: &Node, id: NodeId, mode: ArithMode) {
        let use_kind = node.child1().map_or(UseKind::Untyped, |edge| edge.use_kind);
        let constant = self.child_constant(node, 0);
        match use_kind {
            UseKind::Int32 | UseKind::KnownInt32 => {
                let folded = constant.and_then(Value::as_int32).and_then(|x| {
                    if mode.should_check_overflow() {
                        x.checked_abs()
                    } else {
                        Some(x.wrapping_abs())
                    }
                });
                match folded {
                    Some(i) => self.set_constant(graph, id, FrozenValue::primitive(Value::Int32(i))),
                    None => self.set_type(graph, id, SpeculatedType::INT32),
                }
            }
            _ => match constant.and_then(Value::as_number) {
                Some(x) => self.set_constant(graph, id, FrozenValue::primitive(Value::Double(x.abs()))),
                None => self.set_type(graph, id, DOUBLE_RESULT),
            },
        }
    }

    fn execute_min_max(
        &mut self,
        graph: &Graph,
        node: &Node,
        id: NodeId,
        clobber_limit: usize,
        is_max: bool,
    ) {
        let use_kind = node.child1().map_or(UseKind::Untyped, |edge| edge.use_kind);
        let left = self.child_constant(node, 0);
        let right = self.child_constant(node, 1);
        match use_kind {
            UseKind::Int32 | UseKind::KnownInt32 => {
                match (left.and_then(Value::as_int32), right.and_then(Value::as_int32)) {
                    (Some(a), Some(b)) => {
                        let result = if is_max { a.max(b) } else { a.min(b) };
                        self.set_constant(graph, id, FrozenValue::primitive(Value::Int32(result)));
                    }
                    _ => self.set_type(graph, id, SpeculatedType::INT32),
                }
            }
            _ => match (left.and_then(Value::as_number), right.and_then(Value::as_number)) {
                (Some(a), Some(b)) => {
                    // NaN propagates through the final sum.
                    let result = if is_max {
                        if a > b {
                            a
                        } else if b >= a {
                            b
                        } else {
                            a + b
                        }
                    } else if a < b {
                        a
                    } else if b <= a {
                        b
                    } else {
                        a + b
                    };
                    self.set_constant(graph, id, FrozenValue::primitive(Value::Double(result)));
                }
                _ => {
                    if converts_untyped_operands(node) {
                        self.clobber_world(graph, clobber_limit);
                    }
                    self.set_type(graph, id, DOUBLE_RESULT);
                }
            },
        }
    }

    fn execute_round(&mut self, graph: &Graph, node: &Node, id: NodeId, mode: RoundingMode) {
        let constant = self.child_constant(node, 0).and_then(Value::as_number);
        let Some(x) = constant else {
            let ty = if mode.produces_integer()
                || node.child1().is_some_and(|edge| edge.use_kind == UseKind::Int32)
            {
                SpeculatedType::INT32
            } else {
                DOUBLE_RESULT
            };
            self.set_type(graph, id, ty);
            return;
        };
        let rounded = js_round(x);
        if mode.produces_integer() {
            let fits = f64::from(rounded as i32) == rounded;
            let negative_zero = mode == RoundingMode::Int32WithNegativeZeroCheck
                && is_negative_zero(rounded);
            if fits && !negative_zero {
                let value = Value::Int32(rounded as i32);
                self.set_constant(graph, id, FrozenValue::primitive(value));
            } else {
                self.set_type(graph, id, SpeculatedType::INT32);
            }
        } else if node.result_is_double() {
            self.set_constant(graph, id, FrozenValue::primitive(Value::Double(rounded)));
        } else {
            self.set_constant(graph, id, FrozenValue::primitive(js_number(rounded)));
        }
    }

    fn execute_bit_op(
        &mut self,
        graph: &Graph,
        node: &Node,
        id: NodeId,
        clobber_limit: usize,
        op: BitOp,
    ) {
        let left = self.child_value(node, 0);
        let right = self.child_value(node, 1);
        let as_int = |value: &AbstractValue| value.value.and_then(Value::as_number).map(to_int32);
        if let (Some(a), Some(b)) = (as_int(&left), as_int(&right)) {
            self.set_constant(graph, id, FrozenValue::primitive(Value::Int32(op.apply(a, b))));
            return;
        }
        if converts_untyped_operands(node) {
            self.clobber_world(graph, clobber_limit);
        }
        let ty = if op == BitOp::And
            && (left.is_type(SpeculatedType::BOOL_INT32) || right.is_type(SpeculatedType::BOOL_INT32))
            && left.is_set()
            && right.is_set()
        {
            SpeculatedType::BOOL_INT32
        } else {
            SpeculatedType::INT32
        };
        self.set_type(graph, id, ty);
    }

    fn execute_double_rep(&mut self, graph: &Graph, node: &Node, id: NodeId) {
        let not_cell = node.child1().is_some_and(|edge| edge.use_kind == UseKind::NotCell);
        let child = self.child_value(node, 0);
        let constant = child.value.and_then(|value| match value {
            Value::Int32(_) | Value::Double(_) => value.as_number(),
            Value::Undefined if not_cell => Some(f64::NAN),
            Value::Null if not_cell => Some(0.0),
            Value::Boolean(b) if not_cell => Some(f64::from(u8::from(b))),
            _ => None,
        });
        if let Some(d) = constant {
            self.set_constant(graph, id, FrozenValue::primitive(Value::Double(d)));
            return;
        }
        let mut ty = child.ty;
        if not_cell {
            if ty.intersects(SpeculatedType::OTHER) {
                ty = (ty & !SpeculatedType::OTHER)
                    | SpeculatedType::DOUBLE_PURE_NAN
                    | SpeculatedType::BOOL_INT32;
            }
            if ty.intersects(SpeculatedType::BOOLEAN) {
                ty = (ty & !SpeculatedType::BOOLEAN) | SpeculatedType::BOOL_INT32;
            }
        }
        self.set_type(graph, id, ty & SpeculatedType::FULL_NUMBER);
    }

    fn execute_compare(&mut self, graph: &Graph, node: &Node, id: NodeId, clobber_limit: usize) {
        let left = self.child_value(node, 0);
        let right = self.child_value(node, 1);
        let numbers = (
            left.value.and_then(Value::as_number),
            right.value.and_then(Value::as_number),
        );
        let decided = match (&node.op, numbers) {
            (Op::CompareLess, (Some(a), Some(b))) => Some(a < b),
            (Op::CompareLessEq, (Some(a), Some(b))) => Some(a <= b),
            (Op::CompareGreater, (Some(a), Some(b))) => Some(a > b),
            (Op::CompareGreaterEq, (Some(a), Some(b))) => Some(a >= b),
            (Op::CompareEq, (Some(a), Some(b))) => Some(a == b),
            (Op::CompareEq, _) => {
                // `null` and `undefined` are only loosely equal to each other.
                let other_only = |v: &AbstractValue| v.is_set() && v.is_type(SpeculatedType::OTHER);
                let never_other = |v: &AbstractValue| v.is_set() && !v.could_be_type(SpeculatedType::OTHER);
                if other_only(&left) && other_only(&right) {
                    Some(true)
                } else if (other_only(&left) && never_other(&right))
                    || (other_only(&right) && never_other(&left))
                {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(b) = decided {
            self.set_constant(graph, id, FrozenValue::primitive(Value::Boolean(b)));
            return;
        }
        if converts_untyped_operands(node) {
            self.clobber_world(graph, clobber_limit);
        }
        self.set_type(graph, id, SpeculatedType::BOOLEAN);
    }

    fn execute_get_my_argument_by_val(&mut self, graph: &Graph, node: &Node, id: NodeId) {
        let frame = node
            .child1()
            .and_then(|args| graph.inline_call_frame(graph.node(args.node).origin.semantic))
            .cloned();
        if frame.as_ref().is_some_and(|frame| frame.is_varargs) {
            self.state.for_node(id).make_heap_top();
            return;
        }

        if let Some(index) = self.child_constant(node, 1).and_then(Value::as_uint32) {
            let index = index as usize + 1;
            let register = match &frame {
                Some(frame) => (index < frame.argument_count_including_this)
                    .then(|| frame.argument_register(index)),
                None => (index < graph.num_arguments()).then(|| VirtualRegister::argument(index)),
            };
            if let Some(register) = register {
                let mut value = self
                    .state
                    .variables()
                    .operand(register)
                    .cloned()
                    .unwrap_or_default();
                if value.is_clear() {
                    value.make_heap_top();
                }
                *self.state.for_node(id) = value;
                self.state.set_found_constants(true);
                return;
            }
        }

        let mut result = AbstractValue::default();
        if let Some(frame) = &frame {
            for index in 1..frame.argument_count_including_this {
                let value = self
                    .state
                    .variables()
                    .operand(frame.argument_register(index))
                    .cloned()
                    .unwrap_or_else(AbstractValue::heap_top);
                result.merge(&value);
            }
        }
        if result.is_clear() {
            result.make_heap_top();
        }
        *self.state.for_node(id) = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{structure::StructureSet, InPlaceAbstractState},
        graph::{BlockIndex, Edge, GraphBuilder, IndexingShape, IndexingType, ProofStatus},
    };

    fn run_block(ctx: &CompilationContext, graph: &mut Graph) -> InPlaceAbstractState {
        let mut state = InPlaceAbstractState::new(graph);
        state.initialize(graph).unwrap();
        state.begin_basic_block(graph, BlockIndex::ROOT).unwrap();
        let mut interpreter = AbstractInterpreter::new(ctx, state);
        let len = graph.block(BlockIndex::ROOT).unwrap().len();
        for index in 0..len {
            if !interpreter.execute(graph, index).unwrap() {
                break;
            }
        }
        interpreter.into_state()
    }

    #[test]
    fn test_checked_add_of_constants_folds() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let four = builder.int32(4);
        let five = builder.int32(5);
        let sum = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(four, UseKind::Int32), Edge::new(five, UseKind::Int32)],
        );
        builder.ret(Edge::untyped(sum));
        let mut graph = builder.finish().unwrap();

        let mut state = run_block(&ctx, &mut graph);
        assert_eq!(state.for_node(sum).value, Some(Value::Int32(9)));
        assert!(graph.node(sum).children.iter().all(|e| e.proof == ProofStatus::IsProved));
    }

    #[test]
    fn test_overflow_blocks_folding() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let max = builder.int32(i32::MAX);
        let one = builder.int32(1);
        let sum = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(max, UseKind::Int32), Edge::new(one, UseKind::Int32)],
        );
        let wrapped = builder.add(
            Op::ArithAdd(ArithMode::Unchecked),
            [Edge::new(max, UseKind::Int32), Edge::new(one, UseKind::Int32)],
        );
        builder.ret(Edge::untyped(sum));
        let _ = wrapped;
        let mut graph = builder.finish().unwrap();

        let mut state = run_block(&ctx, &mut graph);
        assert_eq!(state.for_node(sum).value, None);
        assert_eq!(state.for_node(sum).ty, SpeculatedType::INT32);
        assert_eq!(state.for_node(wrapped).value, Some(Value::Int32(i32::MIN)));
    }

    #[test]
    fn test_negative_zero_product_is_not_folded() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let minus_one = builder.int32(-1);
        let zero = builder.int32(0);
        let edges = [Edge::new(minus_one, UseKind::Int32), Edge::new(zero, UseKind::Int32)];
        let checked = builder.add(Op::ArithMul(ArithMode::CheckOverflowAndNegativeZero), edges);
        let unchecked = builder.add(Op::ArithMul(ArithMode::CheckOverflow), edges);
        builder.ret(Edge::untyped(checked));
        let _ = unchecked;
        let mut graph = builder.finish().unwrap();

        let mut state = run_block(&ctx, &mut graph);
        assert_eq!(state.for_node(checked).value, None);
        assert_eq!(state.for_node(unchecked).value, Some(Value::Int32(0)));
    }

    #[test]
    fn test_call_clobbers_unwatchable_structures() {
        let ctx = CompilationContext::new();
        let structure = ctx
            .registry
            .create_structure(CellKind::FinalObject, IndexingType::non_array(IndexingShape::None));
        ctx.registry.set_watchable(structure, false);

        let mut builder = GraphBuilder::new(1, 0);
        let object = builder.add(Op::NewObject(structure), []);
        let callee = builder.add(Op::GetCallee, []);
        let call = builder.add(Op::Call, [Edge::untyped(callee)]);
        let check = builder.add(
            Op::CheckStructure(StructureSet::single(structure)),
            [Edge::new(object, UseKind::Cell)],
        );
        builder.ret(Edge::untyped(call));
        let _ = check;
        let mut graph = builder.finish().unwrap();

        let mut state = run_block(&ctx, &mut graph);
        assert_eq!(state.structure_clobber_state(), StructureClobberState::StructuresAreWatched);
        // The check re-established the set after the call widened it.
        assert_eq!(state.for_node(object).structure.only_structure(), Some(structure));
        assert!(state.for_node(call).is_heap_top());
    }

    #[test]
    fn test_branch_direction_from_constant() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let taken = builder.block();
        let not_taken = builder.block();
        let flag = builder.constant(Value::Boolean(false));
        builder.branch(Edge::new(flag, UseKind::Boolean), taken, not_taken);
        for block in [taken, not_taken] {
            builder.switch_to(block);
            let zero = builder.int32(0);
            builder.ret(Edge::untyped(zero));
        }
        let mut graph = builder.finish().unwrap();

        let mut state = run_block(&ctx, &mut graph);
        state.end_basic_block(&mut graph, true).unwrap();
        let root = graph.block(BlockIndex::ROOT).unwrap();
        assert_eq!(root.cfa_branch_direction, BranchDirection::TakeFalse);
        assert!(graph.block(not_taken).unwrap().cfa_should_revisit);
        assert!(!graph.block(taken).unwrap().cfa_should_revisit);
    }

    #[test]
    fn test_contradiction_invalidates_state() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let string_like = builder.constant(Value::Boolean(true));
        let use_as_int = builder.add(Op::Check, [Edge::new(string_like, UseKind::Int32)]);
        let zero = builder.int32(0);
        builder.ret(Edge::untyped(zero));
        let _ = use_as_int;
        let mut graph = builder.finish().unwrap();

        let state = run_block(&ctx, &mut graph);
        assert!(!state.is_valid());
    }

    #[test]
    fn test_round_keeps_negative_zero_check() {
        let ctx = CompilationContext::new();
        let mut builder = GraphBuilder::new(1, 0);
        let x = builder.constant(Value::Double(-0.2));
        let checked = builder.add(
            Op::ArithRound(RoundingMode::Int32WithNegativeZeroCheck),
            [Edge::new(x, UseKind::DoubleRep)],
        );
        let unchecked = builder.add(
            Op::ArithRound(RoundingMode::Int32),
            [Edge::new(x, UseKind::DoubleRep)],
        );
        builder.ret(Edge::untyped(checked));
        let _ = unchecked;
        let mut graph = builder.finish().unwrap();

        let mut state = run_block(&ctx, &mut graph);
        assert_eq!(state.for_node(checked).value, None);
        assert_eq!(state.for_node(unchecked).value, Some(Value::Int32(0)));
    }
}
