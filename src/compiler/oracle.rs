//! Profiling oracle for property accesses.
//!
//! Constant folding asks the oracle how a `GetById`/`PutById` would behave for the
//! structures the abstract interpreter proved the base can have. The answer is
//! either "nothing known", a list of offset-keyed variants, or "takes the slow
//! path". [`StructureOracle`] answers from the [`StructureRegistry`] alone;
//! embedders with richer profiling install their own [`ProfilingOracle`].

use std::collections::BTreeMap;

use crate::{
    analysis::structure::{PropertyId, PropertyOffset, StructureSet},
    compiler::StructureRegistry,
    graph::PutByIdVariant,
};

/// One way a property load can be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetByIdVariant {
    /// Structures that store the property at `offset`.
    pub structure_set: StructureSet,
    /// Slot of the property.
    pub offset: PropertyOffset,
}

/// What the oracle knows about a property load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetByIdStatus {
    /// Nothing is known.
    NoInformation,
    /// The load can be performed directly for every structure.
    Simple(Vec<GetByIdVariant>),
    /// Some structure needs the generic path.
    TakesSlowPath,
}

/// What the oracle knows about a property store.
#[derive(Debug, Clone, PartialEq)]
pub enum PutByIdStatus {
    /// Nothing is known.
    NoInformation,
    /// The store can be performed directly for every structure.
    Simple(Vec<PutByIdVariant>),
    /// Some structure needs the generic path.
    TakesSlowPath,
}

/// Source of property-access profiling.
pub trait ProfilingOracle: Send + Sync {
    /// Classifies a load of `id` from objects with one of `structures`.
    fn get_by_id_status(
        &self,
        registry: &StructureRegistry,
        structures: &StructureSet,
        id: PropertyId,
    ) -> GetByIdStatus;

    /// Classifies a store to `id` on objects with one of `structures`.
    fn put_by_id_status(
        &self,
        registry: &StructureRegistry,
        structures: &StructureSet,
        id: PropertyId,
    ) -> PutByIdStatus;
}

/// Answers from the registry's property tables and transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureOracle;

impl ProfilingOracle for StructureOracle {
    fn get_by_id_status(
        &self,
        registry: &StructureRegistry,
        structures: &StructureSet,
        id: PropertyId,
    ) -> GetByIdStatus {
        if structures.is_empty() {
            return GetByIdStatus::NoInformation;
        }
        let mut by_offset: BTreeMap<PropertyOffset, StructureSet> = BTreeMap::new();
        for structure in structures.iter() {
            if !structure.kind.is_object() {
                return GetByIdStatus::TakesSlowPath;
            }
            let Some(offset) = registry.property_offset(structure, id) else {
                return GetByIdStatus::TakesSlowPath;
            };
            by_offset.entry(offset).or_default().add(structure);
        }
        GetByIdStatus::Simple(
            by_offset
                .into_iter()
                .map(|(offset, structure_set)| GetByIdVariant {
                    structure_set,
                    offset,
                })
                .collect(),
        )
    }

    fn put_by_id_status(
        &self,
        registry: &StructureRegistry,
        structures: &StructureSet,
        id: PropertyId,
    ) -> PutByIdStatus {
        if structures.is_empty() {
            return PutByIdStatus::NoInformation;
        }
        let mut replaces: BTreeMap<PropertyOffset, StructureSet> = BTreeMap::new();
        let mut variants = Vec::new();
        for structure in structures.iter() {
            if !structure.kind.is_object() {
                return PutByIdStatus::TakesSlowPath;
            }
            if let Some(offset) = registry.property_offset(structure, id) {
                replaces.entry(offset).or_default().add(structure);
            } else if let Some(transition) = registry.transition(structure, id) {
                variants.push(PutByIdVariant::transition(
                    structure,
                    transition.next,
                    transition.offset,
                    transition.reallocates_storage,
                ));
            } else {
                return PutByIdStatus::TakesSlowPath;
            }
        }
        let mut all: Vec<PutByIdVariant> = replaces
            .into_iter()
            .map(|(offset, set)| PutByIdVariant::replace(set, offset))
            .collect();
        all.extend(variants);
        PutByIdStatus::Simple(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::CellKind,
        graph::{IndexingShape, IndexingType, PutByIdVariantKind},
    };

    #[test]
    fn test_get_groups_by_offset() {
        let registry = StructureRegistry::new();
        let none = IndexingType::non_array(IndexingShape::None);
        let s1 = registry.create_structure(CellKind::FinalObject, none);
        let s2 = registry.create_structure(CellKind::FinalObject, none);
        let s3 = registry.create_structure(CellKind::FinalObject, none);
        registry.add_property(s1, PropertyId(7), 0);
        registry.add_property(s2, PropertyId(7), 0);
        registry.add_property(s3, PropertyId(7), 2);

        let set: StructureSet = [s1, s2, s3].into_iter().collect();
        let GetByIdStatus::Simple(variants) = StructureOracle.get_by_id_status(&registry, &set, PropertyId(7))
        else {
            panic!("expected a simple status");
        };
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].structure_set.len(), 2);
        assert_eq!(variants[1].offset, 2);

        assert_eq!(
            StructureOracle.get_by_id_status(&registry, &set, PropertyId(8)),
            GetByIdStatus::TakesSlowPath
        );
    }

    #[test]
    fn test_put_uses_transitions() {
        let registry = StructureRegistry::new();
        let s1 = registry.create_structure(CellKind::FinalObject, IndexingType::non_array(IndexingShape::None));
        let transition = registry.add_transition(s1, PropertyId(1), 0);

        let status = StructureOracle.put_by_id_status(&registry, &StructureSet::single(s1), PropertyId(1));
        let PutByIdStatus::Simple(variants) = status else {
            panic!("expected a simple status");
        };
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].kind, PutByIdVariantKind::Transition);
        assert_eq!(variants[0].new_structure, Some(transition.next));

        let status = StructureOracle.put_by_id_status(
            &registry,
            &StructureSet::single(transition.next),
            PropertyId(1),
        );
        assert!(matches!(status, PutByIdStatus::Simple(ref v) if v[0].kind == PutByIdVariantKind::Replace));
    }
}
