//! Whether a node can be executed at an arbitrary point described by an abstract state.
//!
//! A `true` answer means that, if the node is moved to that point, it will neither
//! crash nor produce a malformed value. It does not mean the node computes what
//! it would have computed at its original position: checks that guard the uses of
//! its result still have to dominate those uses.

use crate::{
    analysis::{AbstractState, SpeculatedType},
    compiler::StructureRegistry,
    graph::{Graph, NodeId, Op, UseKind},
};

/// `true` if `node` may be executed in `state`.
///
/// Answers conservatively: nodes whose safety cannot be decided from the abstract
/// state alone report `false`.
pub fn safe_to_execute<S: AbstractState>(
    state: &mut S,
    graph: &Graph,
    registry: &StructureRegistry,
    node: NodeId,
) -> bool {
    let node = graph.node(node);

    // Edges whose use kind asserts a type without checking it.
    for edge in &node.children {
        let asserted = match edge.use_kind {
            UseKind::KnownInt32 => SpeculatedType::INT32,
            UseKind::KnownCell => SpeculatedType::CELL,
            _ => continue,
        };
        if !state.for_node(edge.node).is_type(asserted) {
            return false;
        }
    }

    match &node.op {
        Op::Phi
        | Op::Upsilon { .. }
        | Op::GetStack(_)
        | Op::PutStack(_)
        | Op::MovHint(_)
        | Op::KillStack(_)
        | Op::LoadVarargs(_)
        | Op::ForwardVarargs(_)
        | Op::PhantomDirectArguments
        | Op::PhantomClonedArguments
        | Op::BottomValue
        | Op::ForceOSRExit
        | Op::Unreachable
        | Op::InvalidationPoint
        | Op::LoopHint
        | Op::MultiPutByOffset(_)
        | Op::PutToArguments(_)
        | Op::Jump(_)
        | Op::Branch(_)
        | Op::Return
        | Op::TailCall
        | Op::TailCallVarargs(_)
        | Op::TailCallForwardVarargs(_) => false,

        Op::CheckArray(mode) | Op::GetByVal(mode) | Op::GetArrayLength(mode) => node
            .child1()
            .is_some_and(|base| mode.already_checked(state.for_node(base.node))),

        Op::PutByVal(mode) => node
            .child1()
            .is_some_and(|base| mode.for_put().already_checked(state.for_node(base.node))),

        Op::GetButterfly => node
            .child1()
            .is_some_and(|base| state.for_node(base.node).is_type(SpeculatedType::OBJECT)),

        Op::PutStructure(transition) => node.child1().is_some_and(|base| {
            let structure = &state.for_node(base.node).structure;
            structure.is_finite()
                && !structure.is_empty()
                && structure.iter().all(|s| s == transition.previous)
        }),

        Op::GetByOffset(data) | Op::PutByOffset(data) => node.child2().is_some_and(|base| {
            let structure = &state.for_node(base.node).structure;
            !structure.is_top()
                && !structure.is_empty()
                && structure
                    .iter()
                    .all(|s| registry.property_offset(s, data.identifier) == Some(data.offset))
        }),

        Op::JSConstant(_)
        | Op::Identity
        | Op::Check
        | Op::GetCallee
        | Op::GetArgumentCount
        | Op::ArithAdd(_)
        | Op::ArithSub(_)
        | Op::ArithMul(_)
        | Op::ArithDiv(_)
        | Op::ArithMod(_)
        | Op::ArithNegate(_)
        | Op::ArithAbs(_)
        | Op::ArithMin
        | Op::ArithMax
        | Op::ArithSqrt
        | Op::ArithRound(_)
        | Op::ValueAdd
        | Op::BitAnd
        | Op::BitOr
        | Op::BitXor
        | Op::BitLShift
        | Op::BitRShift
        | Op::BitURShift
        | Op::UInt32ToNumber(_)
        | Op::ValueToInt32
        | Op::DoubleRep
        | Op::ValueRep
        | Op::CompareLess
        | Op::CompareLessEq
        | Op::CompareGreater
        | Op::CompareGreaterEq
        | Op::CompareEq
        | Op::CompareStrictEq
        | Op::LogicalNot
        | Op::CheckStructure(_)
        | Op::CheckCell(_)
        | Op::CheckInBounds
        | Op::GetById(_)
        | Op::PutById(_)
        | Op::MultiGetByOffset(_)
        | Op::NewObject(_)
        | Op::CreateDirectArguments
        | Op::CreateClonedArguments
        | Op::GetFromArguments(_)
        | Op::GetMyArgumentByVal
        | Op::Call
        | Op::Construct
        | Op::CallVarargs(_)
        | Op::ConstructVarargs(_)
        | Op::CallForwardVarargs(_)
        | Op::ConstructForwardVarargs(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{structure::PropertyId, AbstractValue, AtTailAbstractState, CellKind},
        graph::{ArithMode, Edge, GraphBuilder, IndexingShape, IndexingType, StorageAccessData},
    };

    #[test]
    fn test_known_int32_requires_proof() {
        let mut builder = GraphBuilder::new(2, 0);
        let x = builder.add(Op::GetArgumentCount, []);
        let add = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(x, UseKind::KnownInt32), Edge::new(x, UseKind::KnownInt32)],
        );
        builder.ret(Edge::untyped(add));
        let graph = builder.finish().unwrap();
        let registry = StructureRegistry::new();

        let mut state = AtTailAbstractState::new();
        assert!(!safe_to_execute(&mut state, &graph, &registry, add));

        *state.for_node(x) = AbstractValue::of_type(SpeculatedType::INT32);
        assert!(safe_to_execute(&mut state, &graph, &registry, add));
    }

    #[test]
    fn test_get_by_offset_needs_valid_offset() {
        let registry = StructureRegistry::new();
        let indexing = IndexingType::non_array(IndexingShape::None);
        let with_x = registry.create_structure(CellKind::FinalObject, indexing);
        let without_x = registry.create_structure(CellKind::FinalObject, indexing);
        registry.add_property(with_x, PropertyId(1), 0);

        let mut builder = GraphBuilder::new(2, 0);
        let base = builder.add(Op::GetCallee, []);
        let butterfly = builder.add(Op::GetButterfly, [Edge::new(base, UseKind::KnownCell)]);
        let load = builder.add(
            Op::GetByOffset(StorageAccessData {
                offset: 0,
                identifier: PropertyId(1),
            }),
            [Edge::untyped(butterfly), Edge::new(base, UseKind::KnownCell)],
        );
        builder.ret(Edge::untyped(load));
        let graph = builder.finish().unwrap();

        let mut state = AtTailAbstractState::new();
        state.for_node(base).set_structure(with_x);
        assert!(safe_to_execute(&mut state, &graph, &registry, load));

        state.for_node(base).structure.add(without_x);
        assert!(!safe_to_execute(&mut state, &graph, &registry, load));
    }

    #[test]
    fn test_terminals_and_exits_are_never_safe() {
        let mut builder = GraphBuilder::new(1, 0);
        let count = builder.add(Op::GetArgumentCount, []);
        let exit = builder.add(Op::ForceOSRExit, []);
        let root = builder.add(Op::ArithSqrt, [Edge::new(count, UseKind::DoubleRep)]);
        let ret = builder.ret(Edge::untyped(root));
        let graph = builder.finish().unwrap();
        let registry = StructureRegistry::new();

        let mut state = AtTailAbstractState::new();
        assert!(!safe_to_execute(&mut state, &graph, &registry, exit));
        assert!(!safe_to_execute(&mut state, &graph, &registry, ret));
        assert!(safe_to_execute(&mut state, &graph, &registry, root));
    }
}
