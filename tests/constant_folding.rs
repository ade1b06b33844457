//! Constant folding integration tests.
//!
//! These tests build graphs with the public `GraphBuilder`, run the analysis and
//! the folding pass (directly or through the scheduler) and inspect the result.

use dfgopt::{
    analysis::{AbstractInterpreter, AbstractState, CellKind, InPlaceAbstractState},
    graph::{BranchDirection, IndexingShape, IndexingType},
    prelude::*,
    Result,
};

fn node_types(graph: &Graph) -> Vec<NodeType> {
    graph
        .blocks()
        .flat_map(|block| block.nodes.iter())
        .map(|&id| graph.node(id).node_type())
        .collect()
}

fn fold(graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
    CfaPass::analyze(graph, ctx)?;
    ConstantFoldingPass::new().run(graph, ctx)
}

#[test]
fn test_checked_add_of_constants_folds_without_guard() -> Result<()> {
    let ctx = CompilationContext::new();
    let mut builder = GraphBuilder::new(1, 0);
    let four = builder.int32(4);
    let five = builder.int32(5);
    let sum = builder.add(
        Op::ArithAdd(ArithMode::CheckOverflow),
        [Edge::new(four, UseKind::Int32), Edge::new(five, UseKind::Int32)],
    );
    builder.ret(Edge::untyped(sum));
    let mut graph = builder.finish()?;

    assert!(fold(&mut graph, &ctx)?);

    assert_eq!(
        graph.node(sum).constant().map(|frozen| frozen.value),
        Some(Value::Int32(9))
    );
    assert!(
        !node_types(&graph).contains(&NodeType::Check),
        "both inputs were proved int32, no residual check"
    );
    assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 1);
    Ok(())
}

#[test]
fn test_subsumed_structure_check_is_removed_and_keeps_narrow_set() -> Result<()> {
    let ctx = CompilationContext::new();
    let indexing = IndexingType::non_array(IndexingShape::None);
    let s1 = ctx.registry.create_structure(CellKind::FinalObject, indexing);
    let s2 = ctx.registry.create_structure(CellKind::FinalObject, indexing);

    let mut builder = GraphBuilder::new(1, 0);
    let object = builder.add(Op::NewObject(s1), []);
    let check = builder.add(
        Op::CheckStructure([s1, s2].into_iter().collect()),
        [Edge::new(object, UseKind::Cell)],
    );
    builder.ret(Edge::untyped(object));
    let mut graph = builder.finish()?;

    // The check's post-state keeps the tracked set rather than the checked one.
    let mut state = InPlaceAbstractState::new(&graph);
    state.initialize(&mut graph)?;
    state.begin_basic_block(&mut graph, BlockIndex::ROOT)?;
    let mut interpreter = AbstractInterpreter::new(&ctx, state);
    for index in 0..graph.block(BlockIndex::ROOT).map_or(0, |block| block.len()) {
        assert!(interpreter.execute(&mut graph, index)?);
    }
    let structure = &interpreter.state_mut().for_node(object).structure;
    assert_eq!(structure.only_structure(), Some(s1));

    assert!(fold(&mut graph, &ctx)?);
    assert_ne!(graph.node(check).node_type(), NodeType::CheckStructure);
    assert!(ctx.events.has(EventKind::CheckRemoved));
    Ok(())
}

#[test]
fn test_unknown_structure_check_survives() -> Result<()> {
    let ctx = CompilationContext::new();
    let indexing = IndexingType::non_array(IndexingShape::None);
    let s1 = ctx.registry.create_structure(CellKind::FinalObject, indexing);

    let mut builder = GraphBuilder::new(1, 0);
    let callee = builder.add(Op::GetCallee, []);
    let check = builder.add(
        Op::CheckStructure(StructureSet::single(s1)),
        [Edge::new(callee, UseKind::Cell)],
    );
    builder.ret(Edge::untyped(callee));
    let mut graph = builder.finish()?;

    fold(&mut graph, &ctx)?;
    assert_eq!(graph.node(check).node_type(), NodeType::CheckStructure);
    assert!(!ctx.events.has(EventKind::CheckRemoved));
    Ok(())
}

#[test]
fn test_known_branch_removes_dead_block() -> Result<()> {
    let ctx = CompilationContext::new();
    let mut builder = GraphBuilder::new(1, 0);
    let taken = builder.block();
    let not_taken = builder.block();
    let flag = builder.constant(Value::Boolean(false));
    let branch = builder.branch(Edge::new(flag, UseKind::Boolean), taken, not_taken);
    for block in [taken, not_taken] {
        builder.switch_to(block);
        let value = builder.int32(block.0 as i32);
        builder.ret(Edge::untyped(value));
    }
    let mut graph = builder.finish()?;

    CfaPass::analyze(&mut graph, &ctx)?;
    assert_eq!(
        graph.block(BlockIndex::ROOT).map(|block| block.cfa_branch_direction),
        Some(BranchDirection::TakeFalse)
    );
    assert!(ConstantFoldingPass::new().run(&mut graph, &ctx)?);

    assert_eq!(graph.node(branch).op, Op::Jump(not_taken));
    assert!(graph.block(taken).is_none());
    assert!(ctx.events.has(EventKind::BlockRemoved));
    Ok(())
}

#[test]
fn test_fold_only_pipeline_reaches_fixpoint() -> Result<()> {
    let ctx = CompilationContext::new().with_config(OptimizerConfig::fold_only());
    let mut builder = GraphBuilder::new(1, 0);
    let two = builder.int32(2);
    let three = builder.int32(3);
    let product = builder.add(
        Op::ArithMul(ArithMode::CheckOverflow),
        [Edge::new(two, UseKind::Int32), Edge::new(three, UseKind::Int32)],
    );
    let negated = builder.add(
        Op::ArithNegate(ArithMode::CheckOverflow),
        [Edge::new(product, UseKind::Int32)],
    );
    builder.ret(Edge::untyped(negated));
    let id = ctx.add_graph(builder.finish()?);

    let mut scheduler = PassScheduler::with_default_pipeline(&ctx.config);
    assert!(!scheduler.pass_names().contains(&"licm"));
    scheduler.run_pipeline(&ctx)?;

    let graph = ctx.take_graph(id).expect("graph stays registered");
    assert_eq!(
        graph.node(negated).constant().map(|frozen| frozen.value),
        Some(Value::Int32(-6))
    );
    Ok(())
}
