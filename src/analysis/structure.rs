//! Hidden-class descriptors ("structures") and the structure component of the
//! abstract value lattice.
//!
//! A [`Structure`] is a cheap, copyable handle: its identity plus the immutable
//! facts the compiler needs without a registry lookup (cell class and indexing
//! type). Mutable facts, such as whether a structure may still transition, live
//! in the [`crate::compiler::StructureRegistry`] and are reached through the
//! [`StructureRegistrar`] trait.
//!
//! [`StructureAbstractValue`] tracks a finite [`StructureSet`] until it grows past
//! [`POLYMORPHISM_LIMIT`], at which point it becomes top. A set can also be
//! *clobbered*: after an effect that may have transitioned objects, the set is only
//! trustworthy again once an invalidation point has been passed.

use std::fmt;

use crate::{
    analysis::SpeculatedType,
    graph::{ArrayModes, IndexingType},
};

/// Largest structure set tracked before the abstract value widens to top.
pub const POLYMORPHISM_LIMIT: usize = 10;

/// A clobbered set is replaced by a filter set only if that set is at most this
/// much larger.
const CLOBBERED_SUPREMACY_THRESHOLD: usize = 2;

/// Offsets below this live inline in the object cell; the rest live in the
/// out-of-line property storage.
pub const FIRST_OUT_OF_LINE_OFFSET: PropertyOffset = 100;

/// Slot index of a named property within an object's storage.
pub type PropertyOffset = u32;

/// Returns `true` if `offset` is stored inline in the cell.
#[must_use]
pub fn is_inline_offset(offset: PropertyOffset) -> bool {
    offset < FIRST_OUT_OF_LINE_OFFSET
}

/// Identifier of a structure in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(pub u32);

/// Identifier of a property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id{}", self.0)
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A hidden-class descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Structure {
    /// Registry identity.
    pub id: StructureId,
    /// Class of the cells that have this structure.
    pub kind: crate::analysis::CellKind,
    /// Indexed storage layout of those cells.
    pub indexing: IndexingType,
}

impl Structure {
    /// The speculated type of cells with this structure.
    #[must_use]
    pub fn speculation(&self) -> SpeculatedType {
        self.kind.speculation()
    }

    /// The array modes admitted by cells with this structure.
    #[must_use]
    pub fn array_modes(&self) -> ArrayModes {
        ArrayModes::from_indexing(self.indexing)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A structure transition, as performed by `PutStructure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    /// Structure before the transition.
    pub previous: Structure,
    /// Structure after the transition.
    pub next: Structure,
}

/// Outcome of registering a structure with the compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureRegistrationResult {
    /// The structure is registered and its transitions are watched.
    RegisteredAndWatched,
    /// The structure is registered but may transition without notice.
    RegisteredNormally,
}

/// Access to the mutable side of the structure registry.
///
/// Lattice operations that depend on whether a structure can still transition go
/// through this trait so that the lattice itself stays free of shared state.
pub trait StructureRegistrar {
    /// Registers `structure` with the current compilation, adding a transition
    /// watchpoint when the structure is watchable.
    fn register_structure(&self, structure: Structure) -> StructureRegistrationResult;

    /// Returns `true` if the structure's transitions can be watched.
    fn should_watch(&self, structure: Structure) -> bool;
}

/// A small, sorted, deduplicated set of structures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StructureSet {
    structures: Vec<Structure>,
}

impl StructureSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding one structure.
    #[must_use]
    pub fn single(structure: Structure) -> Self {
        Self {
            structures: vec![structure],
        }
    }

    /// Adds a structure. Returns `true` if it was not already present.
    pub fn add(&mut self, structure: Structure) -> bool {
        match self.structures.binary_search(&structure) {
            Ok(_) => false,
            Err(position) => {
                self.structures.insert(position, structure);
                true
            }
        }
    }

    /// Removes a structure. Returns `true` if it was present.
    pub fn remove(&mut self, structure: Structure) -> bool {
        match self.structures.binary_search(&structure) {
            Ok(position) => {
                self.structures.remove(position);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns `true` if `structure` is in the set.
    #[must_use]
    pub fn contains(&self, structure: Structure) -> bool {
        self.structures.binary_search(&structure).is_ok()
    }

    /// Adds every structure of `other`. Returns `true` if the set grew.
    pub fn merge(&mut self, other: &StructureSet) -> bool {
        let mut changed = false;
        for &structure in &other.structures {
            changed |= self.add(structure);
        }
        changed
    }

    /// Keeps only the structures also in `other`.
    pub fn filter(&mut self, other: &StructureSet) {
        self.structures.retain(|s| other.contains(*s));
    }

    /// Keeps only the structures an abstract value may have.
    pub fn filter_by_value(&mut self, value: &crate::analysis::AbstractValue) {
        self.structures.retain(|s| value.could_have_structure(*s));
    }

    /// Keeps only the structures for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&Structure) -> bool) {
        self.structures.retain(keep);
    }

    /// Returns `true` if every structure of `self` is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &StructureSet) -> bool {
        self.structures.iter().all(|s| other.contains(*s))
    }

    /// Returns `true` if every structure of `other` is in `self`.
    #[must_use]
    pub fn is_superset_of(&self, other: &StructureSet) -> bool {
        other.is_subset_of(self)
    }

    /// Returns the structure if the set holds exactly one.
    #[must_use]
    pub fn only_structure(&self) -> Option<Structure> {
        match self.structures.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Number of structures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Iterates over the structures in id order.
    pub fn iter(&self) -> impl Iterator<Item = Structure> + '_ {
        self.structures.iter().copied()
    }

    /// Union of the speculated types of the member structures.
    #[must_use]
    pub fn speculation(&self) -> SpeculatedType {
        self.iter()
            .fold(SpeculatedType::NONE, |acc, s| acc | s.speculation())
    }

    /// Union of the array modes of the member structures.
    #[must_use]
    pub fn array_modes(&self) -> ArrayModes {
        self.iter()
            .fold(ArrayModes::empty(), |acc, s| acc | s.array_modes())
    }
}

impl FromIterator<Structure> for StructureSet {
    fn from_iter<I: IntoIterator<Item = Structure>>(iter: I) -> Self {
        let mut set = StructureSet::new();
        for structure in iter {
            set.add(structure);
        }
        set
    }
}

impl fmt::Display for StructureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, structure) in self.structures.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{structure}")?;
        }
        f.write_str("]")
    }
}

/// The structure component of an abstract value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureAbstractValue {
    set: StructureSet,
    top: bool,
    clobbered: bool,
}

impl StructureAbstractValue {
    /// The empty (bottom) value.
    #[must_use]
    pub fn clear_value() -> Self {
        Self::default()
    }

    /// The top value.
    #[must_use]
    pub fn top() -> Self {
        Self {
            set: StructureSet::new(),
            top: true,
            clobbered: false,
        }
    }

    /// A value holding exactly the given set.
    #[must_use]
    pub fn from_set(set: StructureSet) -> Self {
        let mut value = Self {
            set,
            top: false,
            clobbered: false,
        };
        if value.set.len() > POLYMORPHISM_LIMIT {
            value.make_top();
        }
        value
    }

    /// Resets to bottom.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Widens to top.
    pub fn make_top(&mut self) {
        self.set = StructureSet::new();
        self.top = true;
        self.clobbered = false;
    }

    /// Returns `true` for top.
    #[must_use]
    pub fn is_top(&self) -> bool {
        self.top
    }

    /// Returns `true` for bottom.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        !self.top && self.set.is_empty()
    }

    /// Returns `true` if the set is awaiting an invalidation point.
    #[must_use]
    pub fn is_clobbered(&self) -> bool {
        self.clobbered
    }

    /// Top or clobbered: the finite set cannot be relied on right now.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.top || self.clobbered
    }

    /// Returns `true` if the value is a finite, unclobbered set.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        !self.is_infinite()
    }

    /// The tracked set (meaningless when top).
    #[must_use]
    pub fn set(&self) -> &StructureSet {
        &self.set
    }

    /// Number of tracked structures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no structure is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Iterates over the tracked structures.
    pub fn iter(&self) -> impl Iterator<Item = Structure> + '_ {
        self.set.iter()
    }

    /// Marks the set as possibly stale. Sets containing a structure that cannot
    /// be watched widen to top, since nothing would tell us it transitioned.
    pub fn clobber(&mut self, registrar: &dyn StructureRegistrar) {
        if self.top {
            return;
        }
        self.clobbered = true;
        if self.set.iter().any(|s| !registrar.should_watch(s)) {
            self.make_top();
        }
    }

    /// An invalidation point re-validates a clobbered set.
    pub fn observe_invalidation_point(&mut self) {
        if !self.top {
            self.clobbered = false;
        }
    }

    /// Accounts for a transition from `from` to `to` on some object.
    pub fn observe_transition(&mut self, from: Structure, to: Structure) {
        if self.top || !self.set.contains(from) {
            return;
        }
        if self.set.add(to) && self.set.len() > POLYMORPHISM_LIMIT {
            self.make_top();
        }
    }

    /// Accounts for several transitions.
    pub fn observe_transitions(&mut self, transitions: &[Transition]) {
        if self.top {
            return;
        }
        let mut additions = StructureSet::new();
        for transition in transitions {
            if self.set.contains(transition.previous) {
                additions.add(transition.next);
            }
        }
        if self.set.merge(&additions) && self.set.len() > POLYMORPHISM_LIMIT {
            self.make_top();
        }
    }

    /// Adds one structure. Returns `true` if the value changed.
    pub fn add(&mut self, structure: Structure) -> bool {
        if self.top || !self.set.add(structure) {
            return false;
        }
        if self.set.len() > POLYMORPHISM_LIMIT {
            self.make_top();
        }
        true
    }

    /// Joins `other` into `self`. Returns `true` if `self` changed.
    pub fn merge(&mut self, other: &StructureAbstractValue) -> bool {
        if other.is_clear() || self.top {
            return false;
        }
        if other.top {
            self.make_top();
            return true;
        }
        let mut changed = false;
        if !self.clobbered && other.clobbered {
            self.clobbered = true;
            changed = true;
        }
        changed |= self.set.merge(&other.set);
        if self.set.len() > POLYMORPHISM_LIMIT {
            self.make_top();
            return true;
        }
        changed
    }

    /// Narrows to the structures in `other`.
    pub fn filter(&mut self, other: &StructureSet) {
        if self.top {
            self.set = other.clone();
            self.top = false;
            self.clobbered = false;
            return;
        }
        if self.clobbered {
            if other.len() > self.set.len() + CLOBBERED_SUPREMACY_THRESHOLD {
                return;
            }
            self.set = other.clone();
            self.clobbered = false;
            return;
        }
        self.set.filter(other);
    }

    /// Narrows to the structures whose class is admitted by `ty`.
    pub fn filter_type(&mut self, ty: SpeculatedType) {
        if (ty & SpeculatedType::CELL).is_empty() {
            self.clear();
            return;
        }
        if self.top {
            return;
        }
        self.set.retain(|s| !(s.speculation() & ty).is_empty());
    }

    /// Returns `true` if an object with `structure` may be described by this value.
    #[must_use]
    pub fn contains(&self, structure: Structure) -> bool {
        self.is_infinite() || self.set.contains(structure)
    }

    /// Returns `true` if this value is known to be within `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &StructureSet) -> bool {
        !self.is_infinite() && self.set.is_subset_of(other)
    }

    /// Returns the single structure, if the value is a finite singleton.
    #[must_use]
    pub fn only_structure(&self) -> Option<Structure> {
        if self.is_infinite() {
            return None;
        }
        self.set.only_structure()
    }
}

impl From<Structure> for StructureAbstractValue {
    fn from(structure: Structure) -> Self {
        Self::from_set(StructureSet::single(structure))
    }
}

impl fmt::Display for StructureAbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.top {
            return f.write_str("TOP");
        }
        if self.clobbered {
            f.write_str("Clobbered:")?;
        }
        write!(f, "{}", self.set)
    }
}
