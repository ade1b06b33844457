//! Whether a node may allocate or otherwise trigger a garbage collection.

use crate::{
    analysis::clobberize::clobbers_heap,
    graph::{Graph, NodeId, Op},
};

/// `true` if executing `node` may trigger a GC.
///
/// Anything that may run arbitrary code may allocate. Otherwise only allocations
/// and butterfly reallocation collect.
#[must_use]
pub fn does_gc(graph: &Graph, node: NodeId) -> bool {
    if clobbers_heap(graph, node) {
        return true;
    }
    match &graph.node(node).op {
        Op::NewObject(_) | Op::CreateDirectArguments | Op::CreateClonedArguments => true,
        Op::MultiPutByOffset(data) => data.reallocates_storage(),

        // Collect only through the heap clobber handled above.
        Op::GetById(_)
        | Op::PutById(_)
        | Op::Call
        | Op::Construct
        | Op::CallVarargs(_)
        | Op::ConstructVarargs(_)
        | Op::CallForwardVarargs(_)
        | Op::ConstructForwardVarargs(_)
        | Op::TailCall
        | Op::TailCallVarargs(_)
        | Op::TailCallForwardVarargs(_)
        | Op::ValueAdd
        | Op::LoadVarargs(_)
        | Op::GetByVal(_)
        | Op::PutByVal(_)
        | Op::BitAnd
        | Op::BitOr
        | Op::BitXor
        | Op::BitLShift
        | Op::BitRShift
        | Op::BitURShift
        | Op::ArithMin
        | Op::ArithMax
        | Op::ValueToInt32
        | Op::CompareLess
        | Op::CompareLessEq
        | Op::CompareGreater
        | Op::CompareGreaterEq
        | Op::CompareEq => false,

        Op::JSConstant(_)
        | Op::Identity
        | Op::Phi
        | Op::Upsilon { .. }
        | Op::BottomValue
        | Op::Check
        | Op::GetCallee
        | Op::GetArgumentCount
        | Op::GetStack(_)
        | Op::PutStack(_)
        | Op::MovHint(_)
        | Op::KillStack(_)
        | Op::ArithAdd(_)
        | Op::ArithSub(_)
        | Op::ArithMul(_)
        | Op::ArithDiv(_)
        | Op::ArithMod(_)
        | Op::ArithNegate(_)
        | Op::ArithAbs(_)
        | Op::ArithSqrt
        | Op::ArithRound(_)
        | Op::UInt32ToNumber(_)
        | Op::DoubleRep
        | Op::ValueRep
        | Op::CompareStrictEq
        | Op::LogicalNot
        | Op::CheckStructure(_)
        | Op::CheckCell(_)
        | Op::CheckArray(_)
        | Op::CheckInBounds
        | Op::GetByOffset(_)
        | Op::PutByOffset(_)
        | Op::MultiGetByOffset(_)
        | Op::PutStructure(_)
        | Op::GetButterfly
        | Op::GetArrayLength(_)
        | Op::PhantomDirectArguments
        | Op::PhantomClonedArguments
        | Op::GetFromArguments(_)
        | Op::PutToArguments(_)
        | Op::GetMyArgumentByVal
        | Op::ForwardVarargs(_)
        | Op::Jump(_)
        | Op::Branch(_)
        | Op::Return
        | Op::Unreachable
        | Op::ForceOSRExit
        | Op::InvalidationPoint
        | Op::LoopHint => false,
    }
}
