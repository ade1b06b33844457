//! Loop invariant code motion integration tests.
//!
//! Every test builds the same loop shape:
//!
//! ```text
//! pre-header: object = NewObject(S), jump header
//! header:     i = phi, branch (i < argc), body, exit
//! body:       ...test specific..., i' = i + 1, jump header
//! exit:       return i
//! ```

use dfgopt::{
    analysis::CellKind,
    graph::{IndexingShape, IndexingType},
    prelude::*,
    Result,
};

const X: PropertyId = PropertyId(1);
const Y: PropertyId = PropertyId(2);

struct LoopGraph {
    graph: Graph,
    pre_header: BlockIndex,
    body: BlockIndex,
    nodes: Vec<NodeId>,
}

fn object_structure(ctx: &CompilationContext) -> Structure {
    let structure = ctx.registry.create_structure(
        CellKind::FinalObject,
        IndexingType::non_array(IndexingShape::None),
    );
    ctx.registry.add_property(structure, X, 0);
    ctx.registry.add_property(structure, Y, 1);
    structure
}

fn build_loop(
    structure: Structure,
    body: impl FnOnce(&mut GraphBuilder, NodeId, NodeId) -> Vec<NodeId>,
) -> Result<LoopGraph> {
    let mut builder = GraphBuilder::new(1, 0);
    let pre_header = builder.current();
    let header = builder.block();
    let body_block = builder.block();
    let exit = builder.block();

    let object = builder.add(Op::NewObject(structure), []);
    let zero = builder.int32(0);
    let phi = builder.graph_mut().add_node(Op::Phi, vec![], NodeOrigin::default());
    builder.add(Op::Upsilon { phi }, [Edge::untyped(zero)]);
    builder.jump(header);

    builder.switch_to(header);
    builder.graph_mut().append(header, phi)?;
    let count = builder.add(Op::GetArgumentCount, []);
    let less = builder.add(
        Op::CompareLess,
        [Edge::new(phi, UseKind::Int32), Edge::new(count, UseKind::Int32)],
    );
    builder.branch(Edge::new(less, UseKind::Boolean), body_block, exit);

    builder.switch_to(body_block);
    let nodes = body(&mut builder, object, phi);
    let one = builder.int32(1);
    let next = builder.add(
        Op::ArithAdd(ArithMode::CheckOverflow),
        [Edge::new(phi, UseKind::Int32), Edge::new(one, UseKind::Int32)],
    );
    builder.add(Op::Upsilon { phi }, [Edge::untyped(next)]);
    builder.jump(header);

    builder.switch_to(exit);
    builder.ret(Edge::untyped(phi));

    Ok(LoopGraph {
        graph: builder.finish()?,
        pre_header,
        body: body_block,
        nodes,
    })
}

fn read(builder: &mut GraphBuilder, object: NodeId, property: PropertyId) -> NodeId {
    builder.add(
        Op::GetByOffset(StorageAccessData {
            offset: 0,
            identifier: property,
        }),
        [
            Edge::new(object, UseKind::KnownCell),
            Edge::new(object, UseKind::KnownCell),
        ],
    )
}

fn write(builder: &mut GraphBuilder, object: NodeId, property: PropertyId, offset: u32, value: NodeId) {
    builder.add(
        Op::PutByOffset(StorageAccessData {
            offset,
            identifier: property,
        }),
        [
            Edge::new(object, UseKind::KnownCell),
            Edge::new(object, UseKind::KnownCell),
            Edge::untyped(value),
        ],
    );
}

fn run_licm(graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
    CfaPass::analyze(graph, ctx)?;
    LicmPass::new().run(graph, ctx)
}

#[test]
fn test_read_of_unwritten_property_is_hoisted() -> Result<()> {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);
    let mut test = build_loop(structure, |builder, object, phi| {
        let load = read(builder, object, X);
        write(builder, object, Y, 1, phi);
        vec![load]
    })?;
    let load = test.nodes[0];

    assert!(run_licm(&mut test.graph, &ctx)?);

    assert_eq!(test.graph.node(load).owner, Some(test.pre_header));
    let pre_header = test.graph.block(test.pre_header).expect("pre-header is live");
    assert!(pre_header.nodes.contains(&load));
    assert_eq!(
        test.graph.terminal(test.pre_header).map(|t| test.graph.node(t).node_type()),
        Some(NodeType::Jump)
    );
    assert!(!test.graph.block(test.body).expect("body is live").nodes.contains(&load));
    assert!(ctx.events.has(EventKind::NodeHoisted));
    Ok(())
}

#[test]
fn test_read_of_written_property_stays() -> Result<()> {
    let ctx = CompilationContext::new().with_config(OptimizerConfig::verbose());
    let structure = object_structure(&ctx);
    let mut test = build_loop(structure, |builder, object, phi| {
        let load = read(builder, object, X);
        write(builder, object, X, 0, phi);
        vec![load]
    })?;
    let load = test.nodes[0];

    run_licm(&mut test.graph, &ctx)?;

    assert_eq!(test.graph.node(load).owner, Some(test.body));
    assert!(test.graph.block(test.body).expect("body is live").nodes.contains(&load));
    assert!(ctx
        .events
        .filter_kind(EventKind::HoistRejected)
        .any(|event| event.message.contains("reads what the loop writes")));
    Ok(())
}

#[test]
fn test_hoisted_node_leaves_check_behind() -> Result<()> {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);
    let mut test = build_loop(structure, |builder, _, _| {
        let count = builder.add(Op::GetArgumentCount, []);
        let doubled = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(count, UseKind::Int32), Edge::new(count, UseKind::Int32)],
        );
        vec![doubled]
    })?;
    let doubled = test.nodes[0];

    assert!(run_licm(&mut test.graph, &ctx)?);

    assert_eq!(test.graph.node(doubled).owner, Some(test.pre_header));
    let body = test.graph.block(test.body).expect("body is live");
    let checks = body
        .nodes
        .iter()
        .filter(|&&id| test.graph.node(id).op == Op::Check)
        .count();
    assert!(checks >= 1);
    Ok(())
}

#[test]
fn test_untyped_bit_op_on_object_stays_in_loop() -> Result<()> {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);
    let mut test = build_loop(structure, |builder, object, _| {
        let zero = builder.int32(0);
        // Converting the object may call its `valueOf` on every iteration.
        let bits = builder.add(Op::BitOr, [Edge::untyped(object), Edge::untyped(zero)]);
        vec![bits]
    })?;
    let bits = test.nodes[0];

    run_licm(&mut test.graph, &ctx)?;

    assert_eq!(test.graph.node(bits).owner, Some(test.body));
    assert!(test.graph.block(test.body).expect("body is live").nodes.contains(&bits));
    assert!(!ctx
        .events
        .filter_kind(EventKind::NodeHoisted)
        .any(|event| event.node == Some(bits)));
    Ok(())
}

#[test]
fn test_disabled_licm_does_not_run() -> Result<()> {
    let ctx = CompilationContext::new().with_config(OptimizerConfig::fold_only());
    assert!(!LicmPass::new().should_run(&Graph::new(1, 0), &ctx));
    Ok(())
}
