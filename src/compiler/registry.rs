//! The shared structure registry.
//!
//! The registry is the compiler's view of the runtime's hidden classes: which
//! structures exist, which can still be watched for transitions, which properties
//! they lay out at which offsets, what adding a property transitions them to, and
//! the structure and constant property values of the heap cells that graphs freeze
//! as constants.
//!
//! Every table is a `DashMap`, so the registry can be shared by compilations running
//! on different threads. A [`Registrar`] pairs the registry with one graph's
//! [`DesiredWatchpoints`] and is what the abstract interpreter registers structures
//! through.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::{
        structure::{
            is_inline_offset, PropertyId, PropertyOffset, Structure, StructureId,
            StructureRegistrar, StructureRegistrationResult,
        },
        CellId, CellKind, CellRef, Value,
    },
    compiler::DesiredWatchpoints,
    graph::IndexingType,
};

/// Out-of-line storage grows in steps of this many slots.
const OUT_OF_LINE_GROWTH: u32 = 4;

/// What adding a property to a structure transitions it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionInfo {
    /// The structure after the transition.
    pub next: Structure,
    /// Slot the new property is stored at.
    pub offset: PropertyOffset,
    /// `true` if the out-of-line storage must grow.
    pub reallocates_storage: bool,
}

#[derive(Debug, Clone)]
struct StructureEntry {
    structure: Structure,
    watchable: bool,
    properties: HashMap<PropertyId, PropertyOffset>,
    replaced: Vec<PropertyOffset>,
}

impl StructureEntry {
    fn out_of_line_capacity(&self) -> u32 {
        let used = self
            .properties
            .values()
            .filter(|&&offset| !is_inline_offset(offset))
            .count() as u32;
        used.div_ceil(OUT_OF_LINE_GROWTH) * OUT_OF_LINE_GROWTH
    }
}

#[derive(Debug, Clone)]
struct CellEntry {
    cell: CellRef,
    structure: Option<Structure>,
    properties: HashMap<PropertyOffset, Value>,
}

/// The structures, transitions and known cells of the runtime.
#[derive(Debug, Default)]
pub struct StructureRegistry {
    structures: DashMap<StructureId, StructureEntry>,
    transitions: DashMap<(StructureId, PropertyId), TransitionInfo>,
    cells: DashMap<CellId, CellEntry>,
    registered: DashSet<StructureId>,
    next_structure: AtomicU32,
    next_cell: AtomicU32,
}

impl StructureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Structures ──────────────────────────────────────────────────────

    /// Creates a watchable structure with no properties.
    pub fn create_structure(&self, kind: CellKind, indexing: IndexingType) -> Structure {
        let id = StructureId(self.next_structure.fetch_add(1, Ordering::Relaxed));
        let structure = Structure { id, kind, indexing };
        self.structures.insert(
            id,
            StructureEntry {
                structure,
                watchable: true,
                properties: HashMap::new(),
                replaced: Vec::new(),
            },
        );
        structure
    }

    /// The structure with the given id.
    #[must_use]
    pub fn structure(&self, id: StructureId) -> Option<Structure> {
        self.structures.get(&id).map(|entry| entry.structure)
    }

    /// Number of structures.
    #[must_use]
    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    /// Marks whether transitions away from `structure` can be watched. A structure
    /// that has been observed to transition unpredictably ("dictionary mode")
    /// cannot.
    pub fn set_watchable(&self, structure: Structure, watchable: bool) {
        if let Some(mut entry) = self.structures.get_mut(&structure.id) {
            entry.watchable = watchable;
        }
    }

    /// `true` if transitions away from `structure` can be watched.
    #[must_use]
    pub fn is_watchable(&self, structure: Structure) -> bool {
        self.structures
            .get(&structure.id)
            .is_some_and(|entry| entry.watchable)
    }

    /// Lays out property `id` of `structure` at `offset`.
    pub fn add_property(&self, structure: Structure, id: PropertyId, offset: PropertyOffset) {
        if let Some(mut entry) = self.structures.get_mut(&structure.id) {
            entry.properties.insert(id, offset);
        }
    }

    /// Where `structure` stores property `id`.
    #[must_use]
    pub fn property_offset(&self, structure: Structure, id: PropertyId) -> Option<PropertyOffset> {
        self.structures
            .get(&structure.id)
            .and_then(|entry| entry.properties.get(&id).copied())
    }

    /// Records that the property at `offset` of `structure` was overwritten at run
    /// time, so its value can no longer be assumed constant.
    pub fn mark_property_replaced(&self, structure: Structure, offset: PropertyOffset) {
        if let Some(mut entry) = self.structures.get_mut(&structure.id) {
            if !entry.replaced.contains(&offset) {
                entry.replaced.push(offset);
            }
        }
    }

    /// `true` if the property at `offset` of `structure` exists, has never been
    /// replaced, and the structure is watchable.
    #[must_use]
    pub fn is_property_replacement_watchable(
        &self,
        structure: Structure,
        offset: PropertyOffset,
    ) -> bool {
        self.structures.get(&structure.id).is_some_and(|entry| {
            entry.watchable
                && entry.properties.values().any(|&o| o == offset)
                && !entry.replaced.contains(&offset)
        })
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Creates the structure `from` transitions to when property `id` is added.
    ///
    /// The new structure inherits `from`'s properties and lays `id` out at `offset`.
    /// Calling this twice for the same pair returns the existing transition.
    pub fn add_transition(
        &self,
        from: Structure,
        id: PropertyId,
        offset: PropertyOffset,
    ) -> TransitionInfo {
        if let Some(existing) = self.transitions.get(&(from.id, id)) {
            return *existing;
        }
        let (properties, old_capacity) = self
            .structures
            .get(&from.id)
            .map(|entry| (entry.properties.clone(), entry.out_of_line_capacity()))
            .unwrap_or_default();

        let next = self.create_structure(from.kind, from.indexing);
        let new_capacity = if let Some(mut entry) = self.structures.get_mut(&next.id) {
            entry.properties = properties;
            entry.properties.insert(id, offset);
            entry.out_of_line_capacity()
        } else {
            old_capacity
        };

        let info = TransitionInfo {
            next,
            offset,
            reallocates_storage: new_capacity > old_capacity,
        };
        self.transitions.insert((from.id, id), info);
        info
    }

    /// The transition adding property `id` to `from`, if one exists.
    #[must_use]
    pub fn transition(&self, from: Structure, id: PropertyId) -> Option<TransitionInfo> {
        self.transitions.get(&(from.id, id)).map(|info| *info)
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Records that some compilation depends on `structure`.
    pub fn register(&self, structure: Structure) {
        self.registered.insert(structure.id);
    }

    /// `true` if `structure` was registered.
    #[must_use]
    pub fn is_registered(&self, structure: Structure) -> bool {
        self.registered.contains(&structure.id)
    }

    // ── Cells ───────────────────────────────────────────────────────────

    /// Creates an object cell with the given structure.
    pub fn create_object(&self, structure: Structure) -> CellRef {
        self.create_cell(structure.kind, Some(structure))
    }

    /// Creates a cell of `kind` with no known structure, such as a string.
    pub fn create_cell(&self, kind: CellKind, structure: Option<Structure>) -> CellRef {
        let cell = CellRef {
            id: CellId(self.next_cell.fetch_add(1, Ordering::Relaxed)),
            kind,
        };
        self.cells.insert(
            cell.id,
            CellEntry {
                cell,
                structure,
                properties: HashMap::new(),
            },
        );
        cell
    }

    /// The current structure of `cell`.
    #[must_use]
    pub fn cell_structure(&self, cell: CellRef) -> Option<Structure> {
        self.cells.get(&cell.id).and_then(|entry| entry.structure)
    }

    /// Stores `value` at `offset` of `cell`.
    pub fn put_direct(&self, cell: CellRef, offset: PropertyOffset, value: Value) {
        if let Some(mut entry) = self.cells.get_mut(&cell.id) {
            entry.properties.insert(offset, value);
        }
    }

    /// The value stored at `offset` of `cell`.
    #[must_use]
    pub fn get_direct(&self, cell: CellRef, offset: PropertyOffset) -> Option<Value> {
        self.cells
            .get(&cell.id)
            .filter(|entry| entry.cell == cell)
            .and_then(|entry| entry.properties.get(&offset).copied())
    }
}

/// Registers structures on behalf of one graph.
///
/// Watchable structures are also recorded in the graph's desired watchpoints, since
/// the compiled code will rely on them not transitioning.
#[derive(Debug, Clone, Copy)]
pub struct Registrar<'a> {
    registry: &'a StructureRegistry,
    watchpoints: &'a DesiredWatchpoints,
}

impl<'a> Registrar<'a> {
    /// Pairs `registry` with a graph's `watchpoints`.
    #[must_use]
    pub fn new(registry: &'a StructureRegistry, watchpoints: &'a DesiredWatchpoints) -> Self {
        Self {
            registry,
            watchpoints,
        }
    }
}

impl StructureRegistrar for Registrar<'_> {
    fn register_structure(&self, structure: Structure) -> StructureRegistrationResult {
        self.registry.register(structure);
        if self.registry.is_watchable(structure) {
            self.watchpoints.consider(structure);
            StructureRegistrationResult::RegisteredAndWatched
        } else {
            StructureRegistrationResult::RegisteredNormally
        }
    }

    fn should_watch(&self, structure: Structure) -> bool {
        self.registry.is_watchable(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::structure::FIRST_OUT_OF_LINE_OFFSET, compiler::Watchpoint, graph::IndexingShape,
    };

    fn object(registry: &StructureRegistry) -> Structure {
        registry.create_structure(CellKind::FinalObject, IndexingType::non_array(IndexingShape::None))
    }

    #[test]
    fn test_transition_inherits_properties() {
        let registry = StructureRegistry::new();
        let s1 = object(&registry);
        registry.add_property(s1, PropertyId(1), 0);

        let inline = registry.add_transition(s1, PropertyId(2), 1);
        assert!(!inline.reallocates_storage);
        assert_eq!(registry.property_offset(inline.next, PropertyId(1)), Some(0));
        assert_eq!(registry.property_offset(inline.next, PropertyId(2)), Some(1));
        assert_eq!(registry.transition(s1, PropertyId(2)), Some(inline));

        let out_of_line = registry.add_transition(inline.next, PropertyId(3), FIRST_OUT_OF_LINE_OFFSET);
        assert!(out_of_line.reallocates_storage);
    }

    #[test]
    fn test_replacement_watchability() {
        let registry = StructureRegistry::new();
        let s1 = object(&registry);
        registry.add_property(s1, PropertyId(1), 0);
        assert!(registry.is_property_replacement_watchable(s1, 0));
        assert!(!registry.is_property_replacement_watchable(s1, 1));
        registry.mark_property_replaced(s1, 0);
        assert!(!registry.is_property_replacement_watchable(s1, 0));
    }

    #[test]
    fn test_registrar_watches_watchable_structures() {
        let registry = StructureRegistry::new();
        let watched = object(&registry);
        let dictionary = object(&registry);
        registry.set_watchable(dictionary, false);

        let desired = DesiredWatchpoints::new();
        let registrar = Registrar::new(&registry, &desired);
        assert_eq!(
            registrar.register_structure(watched),
            StructureRegistrationResult::RegisteredAndWatched
        );
        assert_eq!(
            registrar.register_structure(dictionary),
            StructureRegistrationResult::RegisteredNormally
        );
        assert!(registry.is_registered(dictionary));
        assert!(desired.contains(Watchpoint::StructureStable(watched.id)));
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_cells() {
        let registry = StructureRegistry::new();
        let s1 = object(&registry);
        let cell = registry.create_object(s1);
        registry.put_direct(cell, 0, Value::Int32(7));
        assert_eq!(registry.cell_structure(cell), Some(s1));
        assert_eq!(registry.get_direct(cell, 0), Some(Value::Int32(7)));
        assert_eq!(registry.get_direct(cell, 1), None);
    }
}
