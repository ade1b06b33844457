//! Structure registration.
//!
//! Registers every structure the graph refers to with the shared registry, so that
//! later passes can rely on the registry knowing (and, for watchable structures,
//! watching) everything the compiled code depends on. Allocation structures,
//! transition endpoints, structures of frozen constants and the sets of
//! multi-variant accesses are registered; structure checks must only name
//! structures the registry created.

use crate::{
    analysis::structure::{Structure, StructureRegistrar, StructureSet},
    compiler::{CompilationContext, EventKind, GraphPass, Registrar},
    error::invariant_error,
    graph::{Graph, NodeId, Op, PutByIdVariantKind, StructureRegistrationState},
    Result,
};

/// Registers the graph's structures. Runs once per graph.
pub struct StructureRegistrationPass;

impl Default for StructureRegistrationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureRegistrationPass {
    /// Creates a new structure registration pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct Registration<'a> {
    ctx: &'a CompilationContext,
    registrar: Registrar<'a>,
    graph: &'a Graph,
    registered: usize,
}

impl Registration<'_> {
    fn register(&mut self, node: NodeId, structure: Structure) {
        if self.ctx.registry.is_registered(structure) {
            return;
        }
        self.registrar.register_structure(structure);
        self.registered += 1;
        if self.ctx.config.verbose_events {
            self.ctx
                .events
                .record(EventKind::StructureRegistered)
                .at(self.graph, node)
                .pass("structure-registration")
                .message(format!("registered {structure}"));
        }
    }

    fn register_set(&mut self, node: NodeId, set: &StructureSet) {
        for structure in set.iter() {
            self.register(node, structure);
        }
    }

    fn assert_known(&self, node: NodeId, set: &StructureSet) -> Result<()> {
        for structure in set.iter() {
            if self.ctx.registry.structure(structure.id).is_none() {
                return Err(invariant_error!(
                    "{} checks unknown structure {}",
                    node,
                    structure
                ));
            }
        }
        Ok(())
    }
}

impl GraphPass for StructureRegistrationPass {
    fn name(&self) -> &'static str {
        "structure-registration"
    }

    fn description(&self) -> &'static str {
        "Registers every structure the graph refers to"
    }

    fn should_run(&self, graph: &Graph, _ctx: &CompilationContext) -> bool {
        graph.structure_registration_state == StructureRegistrationState::HaveNotStartedRegistering
    }

    fn run(&self, graph: &mut Graph, ctx: &CompilationContext) -> Result<bool> {
        let mut registration = Registration {
            ctx,
            registrar: ctx.registrar(&graph.watchpoints),
            graph,
            registered: 0,
        };

        for block in graph.blocks() {
            for &id in &block.nodes {
                let node = graph.node(id);
                match &node.op {
                    Op::JSConstant(frozen) | Op::CheckCell(frozen) => {
                        if let Some(structure) = frozen.structure {
                            registration.register(id, structure);
                        }
                    }
                    Op::CheckStructure(set) => {
                        registration.assert_known(id, set)?;
                        registration.register_set(id, set);
                    }
                    Op::NewObject(structure) => registration.register(id, *structure),
                    Op::PutStructure(transition) => {
                        registration.register(id, transition.previous);
                        registration.register(id, transition.next);
                    }
                    Op::MultiGetByOffset(data) => {
                        for case in &data.cases {
                            registration.register_set(id, &case.set);
                        }
                    }
                    Op::MultiPutByOffset(data) => {
                        for variant in &data.variants {
                            registration.register_set(id, &variant.old_structure);
                            if let (PutByIdVariantKind::Transition, Some(next)) =
                                (variant.kind, variant.new_structure)
                            {
                                registration.register(id, next);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let registered = registration.registered;
        graph.structure_registration_state = StructureRegistrationState::AllStructuresAreRegistered;
        if registered > 0 {
            ctx.events
                .record(EventKind::Info)
                .graph(graph)
                .pass(self.name())
                .message(format!("registered {registered} structures"));
        }
        // Registration records dependencies; the code is untouched.
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            structure::{StructureId, Transition},
            CellKind,
        },
        graph::{Edge, GraphBuilder, IndexingShape, IndexingType, UseKind},
    };

    #[test]
    fn test_registers_allocation_and_transition_structures() {
        let ctx = CompilationContext::new();
        let indexing = IndexingType::non_array(IndexingShape::None);
        let empty = ctx.registry.create_structure(CellKind::FinalObject, indexing);
        let with_x = ctx.registry.create_structure(CellKind::FinalObject, indexing);

        let mut builder = GraphBuilder::new(1, 0);
        let object = builder.add(Op::NewObject(empty), []);
        builder.add(
            Op::PutStructure(Transition {
                previous: empty,
                next: with_x,
            }),
            [Edge::new(object, UseKind::KnownCell)],
        );
        builder.ret(Edge::untyped(object));
        let mut graph = builder.finish().unwrap();

        let pass = StructureRegistrationPass::new();
        assert!(pass.should_run(&graph, &ctx));
        assert!(!pass.run(&mut graph, &ctx).unwrap());
        assert!(ctx.registry.is_registered(empty));
        assert!(ctx.registry.is_registered(with_x));
        assert!(graph.watchpoints.len() >= 2);
        assert!(!pass.should_run(&graph, &ctx));
    }

    #[test]
    fn test_unknown_checked_structure_is_fatal() {
        let ctx = CompilationContext::new();
        let bogus = Structure {
            id: StructureId(4242),
            kind: CellKind::FinalObject,
            indexing: IndexingType::non_array(IndexingShape::None),
        };

        let mut builder = GraphBuilder::new(1, 0);
        let callee = builder.add(Op::GetCallee, []);
        builder.add(
            Op::CheckStructure(StructureSet::single(bogus)),
            [Edge::new(callee, UseKind::Cell)],
        );
        builder.ret(Edge::untyped(callee));
        let mut graph = builder.finish().unwrap();

        let result = StructureRegistrationPass::new().run(&mut graph, &ctx);
        assert!(matches!(result, Err(crate::Error::InvariantViolation { .. })));
    }
}
