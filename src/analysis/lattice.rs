//! The abstract value lattice.
//!
//! An [`AbstractValue`] is the product of four components, each over-approximating
//! what a node may produce at run time:
//!
//! - `ty`: the [`SpeculatedType`] set
//! - `array_modes`: the indexing types an object may have
//! - `structure`: the [`StructureAbstractValue`]
//! - `value`: the exact value, when known
//!
//! Bottom ("clear") means no value can flow here. The components are kept consistent
//! by *normalizing clarity*: as soon as one component proves the value impossible,
//! every component is cleared and the filter reports a contradiction.

use std::fmt;

use crate::{
    analysis::{
        structure::{
            Structure, StructureAbstractValue, StructureRegistrar, StructureRegistrationResult,
            StructureSet, Transition,
        },
        FrozenValue, SpeculatedType, Value,
    },
    graph::ArrayModes,
};

/// Whether structure sets recorded in abstract values can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructureClobberState {
    /// No effect since the last invalidation point could have transitioned objects.
    #[default]
    StructuresAreWatched,
    /// Objects may have transitioned; finite sets are clobbered.
    StructuresAreClobbered,
}

impl StructureClobberState {
    /// Join: clobbered if either side is.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if self == Self::StructuresAreClobbered || other == Self::StructuresAreClobbered {
            Self::StructuresAreClobbered
        } else {
            Self::StructuresAreWatched
        }
    }
}

/// Outcome of narrowing an abstract value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiltrationResult {
    /// Some value survived the filter.
    FiltrationOk,
    /// No value survives: the code is unreachable under current assumptions.
    Contradiction,
}

/// An over-approximation of the values a node may produce.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbstractValue {
    /// Possible type classes.
    pub ty: SpeculatedType,
    /// Possible indexing types of an object.
    pub array_modes: ArrayModes,
    /// Possible structures of a cell.
    pub structure: StructureAbstractValue,
    /// The exact value, when known.
    pub value: Option<Value>,
}

impl AbstractValue {
    /// The bottom value.
    #[must_use]
    pub fn clear_value() -> Self {
        Self::default()
    }

    /// The top value for heap-resident values.
    #[must_use]
    pub fn heap_top() -> Self {
        let mut value = Self::default();
        value.make_heap_top();
        value
    }

    /// A value of exactly type `ty` with nothing else known.
    #[must_use]
    pub fn of_type(ty: SpeculatedType) -> Self {
        let mut value = Self::default();
        value.set_type(ty);
        value
    }

    /// Resets to bottom.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// `true` for bottom.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.ty.is_empty()
    }

    /// `true` if at least one value is possible.
    #[must_use]
    pub fn is_set(&self) -> bool {
        !self.is_clear()
    }

    fn make_top(&mut self, top: SpeculatedType) {
        self.ty |= top;
        self.array_modes = ArrayModes::ALL;
        self.structure.make_top();
        self.value = None;
    }

    /// Widens to any heap value.
    pub fn make_heap_top(&mut self) {
        self.make_top(SpeculatedType::HEAP_TOP);
    }

    /// Widens to any value, including the empty marker.
    pub fn make_bytecode_top(&mut self) {
        self.make_top(SpeculatedType::BYTECODE_TOP);
    }

    /// `true` if the value admits every heap value and nothing more is known.
    #[must_use]
    pub fn is_heap_top(&self) -> bool {
        self.ty.contains(SpeculatedType::HEAP_TOP)
            && self.array_modes == ArrayModes::ALL
            && self.structure.is_top()
            && self.value.is_none()
    }

    /// Sets exactly type `ty`, forgetting everything else.
    pub fn set_type(&mut self, ty: SpeculatedType) {
        if ty.intersects(SpeculatedType::CELL) {
            self.structure.make_top();
            self.array_modes = ArrayModes::ALL;
        } else {
            self.structure.clear();
            self.array_modes = ArrayModes::empty();
        }
        self.ty = ty;
        self.value = None;
    }

    /// Sets the value to exactly the frozen constant.
    ///
    /// A cell's structure is only recorded when it can be watched; otherwise the
    /// cell may transition behind the compiler's back and the structure is top.
    pub fn set_constant(
        &mut self,
        value: FrozenValue,
        clobber_state: StructureClobberState,
        registrar: &dyn StructureRegistrar,
    ) {
        match (value.value, value.structure) {
            (Value::Cell(_), Some(structure)) => {
                if registrar.register_structure(structure)
                    == StructureRegistrationResult::RegisteredAndWatched
                {
                    self.structure = StructureAbstractValue::from(structure);
                    if clobber_state == StructureClobberState::StructuresAreClobbered {
                        self.array_modes = ArrayModes::ALL;
                        self.structure.clobber(registrar);
                    } else {
                        self.array_modes = structure.array_modes();
                    }
                } else {
                    self.structure.make_top();
                    self.array_modes = ArrayModes::ALL;
                }
            }
            (Value::Cell(_), None) => {
                self.structure.make_top();
                self.array_modes = ArrayModes::ALL;
            }
            _ => {
                self.structure.clear();
                self.array_modes = ArrayModes::empty();
            }
        }
        self.ty = SpeculatedType::from_value(value.value);
        self.value = (value.value != Value::Empty).then_some(value.value);
    }

    /// Sets the value to any object with exactly `structure`.
    pub fn set_structure(&mut self, structure: Structure) {
        self.structure = StructureAbstractValue::from(structure);
        self.array_modes = structure.array_modes();
        self.ty = structure.speculation();
        self.value = None;
    }

    /// Joins a type into the value.
    pub fn merge_type(&mut self, ty: SpeculatedType) {
        self.ty |= ty;
        if ty.intersects(SpeculatedType::CELL) {
            self.structure.make_top();
            self.array_modes = ArrayModes::ALL;
        }
        self.value = None;
    }

    /// Joins `other` into `self`. Returns `true` if `self` changed.
    pub fn merge(&mut self, other: &AbstractValue) -> bool {
        if other.is_clear() {
            return false;
        }
        if self.is_clear() {
            *self = other.clone();
            return true;
        }
        let mut changed = false;
        let ty = self.ty | other.ty;
        if ty != self.ty {
            self.ty = ty;
            changed = true;
        }
        changed |= self.structure.merge(&other.structure);
        let modes = self.array_modes | other.array_modes;
        if modes != self.array_modes {
            self.array_modes = modes;
            changed = true;
        }
        if self.value != other.value {
            changed |= self.value.is_some();
            self.value = None;
        }
        changed
    }

    /// `true` if every possible value is in `ty`.
    #[must_use]
    pub fn is_type(&self, ty: SpeculatedType) -> bool {
        self.ty.is_subset_of(ty)
    }

    /// `true` if some possible value is in `ty`.
    #[must_use]
    pub fn could_be_type(&self, ty: SpeculatedType) -> bool {
        self.ty.intersects(ty)
    }

    /// `true` if an object with `structure` may be described by this value.
    #[must_use]
    pub fn could_have_structure(&self, structure: Structure) -> bool {
        self.could_be_type(structure.speculation())
            && self.array_modes.intersects(structure.array_modes())
            && self.structure.contains(structure)
    }

    /// Narrows to the values in `ty`.
    pub fn filter_type(&mut self, ty: SpeculatedType) -> FiltrationResult {
        if self.ty.is_subset_of(ty) {
            return FiltrationResult::FiltrationOk;
        }
        if !self.ty.intersects(SpeculatedType::CELL) {
            self.ty &= ty;
            if self.ty.is_empty() {
                self.clear();
                return FiltrationResult::Contradiction;
            }
            return FiltrationResult::FiltrationOk;
        }
        self.ty &= ty;
        self.structure.filter_type(self.ty);
        self.filter_array_modes_by_type();
        self.filter_value_by_type();
        self.normalize_clarity()
    }

    /// Narrows a cell to the structures in `set`; non-cells are admitted only if
    /// their type is in `admitted`.
    pub fn filter_structures(
        &mut self,
        set: &StructureSet,
        admitted: SpeculatedType,
    ) -> FiltrationResult {
        if self.is_clear() {
            return FiltrationResult::FiltrationOk;
        }
        self.ty &= set.speculation() | admitted;
        self.array_modes &= set.array_modes();
        self.structure.filter(set);
        self.structure.filter_type(self.ty);
        self.filter_array_modes_by_type();
        self.filter_value_by_type();
        self.normalize_clarity()
    }

    /// Narrows to objects with one of the given array modes.
    pub fn filter_array_modes(&mut self, modes: ArrayModes) -> FiltrationResult {
        if self.is_clear() {
            return FiltrationResult::FiltrationOk;
        }
        self.ty &= SpeculatedType::CELL;
        self.array_modes &= modes;
        self.normalize_clarity()
    }

    /// Narrows to exactly `value`.
    pub fn filter_by_value(&mut self, value: FrozenValue) -> FiltrationResult {
        let result = self.filter_type(SpeculatedType::from_value(value.value));
        if !self.ty.is_empty() {
            self.value = Some(value.value);
        }
        result
    }

    /// Replaces the structure set, as after a store that transitions the object.
    pub fn change_structure(&mut self, set: &StructureSet) -> FiltrationResult {
        self.ty &= set.speculation();
        self.array_modes = set.array_modes();
        self.structure = StructureAbstractValue::from_set(set.clone());
        self.filter_value_by_type();
        self.normalize_clarity()
    }

    /// Accounts for an effect that may have transitioned any object.
    pub fn clobber_structures(&mut self, registrar: &dyn StructureRegistrar) {
        if self.ty.intersects(SpeculatedType::CELL) {
            self.structure.clobber(registrar);
            self.array_modes = ArrayModes::ALL;
        }
    }

    /// Accounts for a transition from `from` to `to` on some object.
    pub fn observe_transition(&mut self, from: Structure, to: Structure) {
        if self.ty.intersects(SpeculatedType::CELL) {
            self.structure.observe_transition(from, to);
            if self.array_modes.intersects(from.array_modes()) {
                self.array_modes |= to.array_modes();
            }
        }
    }

    /// Accounts for several transitions.
    pub fn observe_transitions(&mut self, transitions: &[Transition]) {
        if self.ty.intersects(SpeculatedType::CELL) {
            self.structure.observe_transitions(transitions);
            let mut added = ArrayModes::empty();
            for transition in transitions {
                if self.array_modes.intersects(transition.previous.array_modes()) {
                    added |= transition.next.array_modes();
                }
            }
            self.array_modes |= added;
        }
    }

    /// An invalidation point re-validates clobbered structure sets.
    pub fn observe_invalidation_point(&mut self) {
        self.structure.observe_invalidation_point();
    }

    /// Adjusts the value for an unboxed double result: integers are held as doubles.
    pub fn fix_type_for_double_representation(&mut self) {
        if let Some(Value::Int32(i)) = self.value {
            self.value = Some(Value::Double(f64::from(i)));
        }
        if self.ty.intersects(SpeculatedType::INT32) {
            self.ty &= !SpeculatedType::INT32;
            self.ty |= SpeculatedType::INT52_AS_DOUBLE;
        }
    }

    fn filter_array_modes_by_type(&mut self) {
        if !self.ty.intersects(SpeculatedType::CELL) {
            self.array_modes = ArrayModes::empty();
        } else if self.ty.is_subset_of(SpeculatedType::ARRAY) {
            self.array_modes &= ArrayModes::ALL_ARRAY;
        }
    }

    fn validate_type(&self, value: Value) -> bool {
        if self.is_heap_top() {
            return true;
        }
        (self.ty | SpeculatedType::from_value(value)) == self.ty
    }

    fn filter_value_by_type(&mut self) {
        if !self.ty.is_empty() {
            if let Some(value) = self.value {
                if !self.validate_type(value) {
                    self.clear();
                }
            }
            return;
        }
        self.value = None;
    }

    fn should_be_clear(&self) -> bool {
        if self.ty.is_empty() {
            return true;
        }
        self.ty.is_subset_of(SpeculatedType::CELL)
            && (self.array_modes.is_empty() || self.structure.is_clear())
    }

    fn normalize_clarity(&mut self) -> FiltrationResult {
        if self.should_be_clear() {
            self.clear();
            FiltrationResult::Contradiction
        } else {
            FiltrationResult::FiltrationOk
        }
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.ty)?;
        if self.ty.intersects(SpeculatedType::CELL) {
            write!(f, ", {:#x}, {}", self.array_modes.bits(), self.structure)?;
        }
        if let Some(value) = self.value {
            write!(f, ", {value}")?;
        }
        f.write_str(")")
    }
}
