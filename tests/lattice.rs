//! Abstract value lattice tests against a live structure registry.

use dfgopt::{
    analysis::{
        structure::POLYMORPHISM_LIMIT, CellKind, FiltrationResult, StructureClobberState,
    },
    compiler::{DesiredWatchpoints, Watchpoint},
    graph::{IndexingShape, IndexingType},
    prelude::*,
};

fn object_structure(ctx: &CompilationContext) -> Structure {
    ctx.registry
        .create_structure(CellKind::FinalObject, IndexingType::non_array(IndexingShape::None))
}

fn constant_object(ctx: &CompilationContext, structure: Structure) -> FrozenValue {
    let cell = ctx.registry.create_object(structure);
    ctx.freeze(Value::Cell(cell))
}

#[test]
fn test_watchable_constant_records_structure_and_watchpoint() {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);
    let frozen = constant_object(&ctx, structure);
    let watchpoints = DesiredWatchpoints::new();

    let mut value = AbstractValue::default();
    value.set_constant(
        frozen,
        StructureClobberState::StructuresAreWatched,
        &ctx.registrar(&watchpoints),
    );

    assert_eq!(value.structure.only_structure(), Some(structure));
    assert_eq!(value.value, Some(frozen.value));
    assert!(ctx.registry.is_registered(structure));
    assert!(watchpoints.contains(Watchpoint::StructureStable(structure.id)));
}

#[test]
fn test_unwatchable_constant_has_unknown_structure() {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);
    ctx.registry.set_watchable(structure, false);
    let frozen = constant_object(&ctx, structure);
    let watchpoints = DesiredWatchpoints::new();

    let mut value = AbstractValue::default();
    value.set_constant(
        frozen,
        StructureClobberState::StructuresAreWatched,
        &ctx.registrar(&watchpoints),
    );

    assert!(value.structure.is_top());
    assert!(value.value.is_some());
    assert!(watchpoints.is_empty());
}

#[test]
fn test_clobbered_constant_is_trusted_after_invalidation_point() {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);
    let frozen = constant_object(&ctx, structure);
    let watchpoints = DesiredWatchpoints::new();

    let mut value = AbstractValue::default();
    value.set_constant(
        frozen,
        StructureClobberState::StructuresAreClobbered,
        &ctx.registrar(&watchpoints),
    );
    assert!(value.structure.is_clobbered());
    assert_eq!(value.structure.only_structure(), None);

    value.observe_invalidation_point();
    assert_eq!(value.structure.only_structure(), Some(structure));
}

#[test]
fn test_disjoint_type_filter_is_contradiction() {
    let mut value = AbstractValue::of_type(SpeculatedType::INT32);
    assert_eq!(
        value.filter_type(SpeculatedType::STRING),
        FiltrationResult::Contradiction
    );
    assert!(value.is_clear());

    // Bottom is the identity of the join.
    let mut other = AbstractValue::of_type(SpeculatedType::INT32);
    assert!(!other.merge(&value));
    assert_eq!(other.ty, SpeculatedType::INT32);
}

#[test]
fn test_structure_filter_narrows_heap_top_to_cells() {
    let ctx = CompilationContext::new();
    let structure = object_structure(&ctx);

    let mut value = AbstractValue::heap_top();
    assert_eq!(
        value.filter_structures(&StructureSet::single(structure), SpeculatedType::NONE),
        FiltrationResult::FiltrationOk
    );

    assert!(value.ty.is_cell());
    assert_eq!(value.structure.only_structure(), Some(structure));
    assert!(value.could_have_structure(structure));
}

#[test]
fn test_merge_beyond_polymorphism_limit_widens_to_top() {
    let ctx = CompilationContext::new();
    let mut merged = AbstractValue::default();
    for _ in 0..POLYMORPHISM_LIMIT {
        let mut one = AbstractValue::default();
        one.set_structure(object_structure(&ctx));
        merged.merge(&one);
    }
    assert_eq!(merged.structure.len(), POLYMORPHISM_LIMIT);

    let mut last = AbstractValue::default();
    last.set_structure(object_structure(&ctx));
    assert!(merged.merge(&last));
    assert!(merged.structure.is_top());
}

fn join(a: &AbstractValue, b: &AbstractValue) -> AbstractValue {
    let mut joined = a.clone();
    joined.merge(b);
    joined
}

/// Values covering every shape the join has to combine: bottom, plain types,
/// distinct constants, heap top, watched and clobbered structure sets, and a
/// top structure.
fn lattice_samples(ctx: &CompilationContext) -> Vec<AbstractValue> {
    let watchpoints = DesiredWatchpoints::new();
    let registrar = ctx.registrar(&watchpoints);
    let constant = |frozen: FrozenValue, clobber_state| {
        let mut value = AbstractValue::default();
        value.set_constant(frozen, clobber_state, &registrar);
        value
    };
    let watched = StructureClobberState::StructuresAreWatched;
    let clobbered = StructureClobberState::StructuresAreClobbered;

    let first = object_structure(ctx);
    let second = object_structure(ctx);
    let unwatchable = object_structure(ctx);
    ctx.registry.set_watchable(unwatchable, false);
    let object = constant_object(ctx, first);

    let mut with_second = AbstractValue::default();
    with_second.set_structure(second);

    vec![
        AbstractValue::default(),
        AbstractValue::of_type(SpeculatedType::INT32),
        constant(FrozenValue::primitive(Value::Int32(5)), watched),
        constant(FrozenValue::primitive(Value::Int32(7)), watched),
        AbstractValue::heap_top(),
        constant(object, watched),
        constant(object, clobbered),
        with_second,
        constant(constant_object(ctx, unwatchable), watched),
    ]
}

#[test]
fn test_merge_is_commutative() {
    let ctx = CompilationContext::new();
    let samples = lattice_samples(&ctx);
    for a in &samples {
        for b in &samples {
            assert_eq!(join(a, b), join(b, a), "{a:?} and {b:?} join differently");
        }
    }
}

#[test]
fn test_merge_is_associative() {
    let ctx = CompilationContext::new();
    let samples = lattice_samples(&ctx);
    for a in &samples {
        for b in &samples {
            for c in &samples {
                assert_eq!(
                    join(&join(a, b), c),
                    join(a, &join(b, c)),
                    "joining {a:?}, {b:?} and {c:?} depends on grouping"
                );
            }
        }
    }
}

#[test]
fn test_merge_is_idempotent_and_reports_changes() {
    let ctx = CompilationContext::new();
    let samples = lattice_samples(&ctx);
    for a in &samples {
        let mut same = a.clone();
        assert!(!same.merge(a));
        assert_eq!(&same, a);
        for b in &samples {
            let mut joined = a.clone();
            let changed = joined.merge(b);
            assert_eq!(changed, &joined != a);
        }
    }
}
