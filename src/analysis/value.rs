//! Concrete runtime values as seen by the compiler.
//!
//! A [`Value`] is the exactly-known constant component of an abstract value. Heap
//! cells are referenced by [`CellId`] together with their coarse [`CellKind`]; their
//! structure and constant properties live in the
//! [`crate::compiler::StructureRegistry`]. A [`FrozenValue`] is a value captured by
//! the graph (a constant node payload) together with the structure the cell had when
//! it was frozen.
//!
//! The numeric helpers in this module reproduce the language's arithmetic edge
//! cases: [`to_int32`] wraps modulo 2^32, [`js_number`] canonicalizes integral
//! doubles to int32 (except `-0`), and [`js_round`] rounds half-way cases toward
//! positive infinity.

use std::{fmt, hash::Hash};

use crate::analysis::{speculation::is_negative_zero, structure::Structure, SpeculatedType};

/// Identifier of a heap cell known to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell{}", self.0)
    }
}

/// The coarse class of a heap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellKind {
    /// A plain object.
    FinalObject,
    /// An array.
    Array,
    /// A function.
    Function,
    /// A `DirectArguments` object.
    DirectArguments,
    /// Any other object, including cloned arguments.
    OtherObject,
    /// A string.
    String,
    /// A symbol.
    Symbol,
    /// Any other cell.
    Other,
}

impl CellKind {
    /// The speculated type of cells of this kind.
    #[must_use]
    pub fn speculation(self) -> SpeculatedType {
        match self {
            CellKind::FinalObject => SpeculatedType::FINAL_OBJECT,
            CellKind::Array => SpeculatedType::ARRAY,
            CellKind::Function => SpeculatedType::FUNCTION,
            CellKind::DirectArguments => SpeculatedType::DIRECT_ARGUMENTS,
            CellKind::OtherObject => SpeculatedType::OBJECT_OTHER,
            CellKind::String => SpeculatedType::STRING_VAR,
            CellKind::Symbol => SpeculatedType::SYMBOL,
            CellKind::Other => SpeculatedType::CELL_OTHER,
        }
    }

    /// Returns `true` for object kinds.
    #[must_use]
    pub fn is_object(self) -> bool {
        self.speculation().is_object()
    }
}

/// A reference to a heap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    /// The cell's identity.
    pub id: CellId,
    /// The cell's class.
    pub kind: CellKind,
}

/// An exactly-known runtime value.
///
/// Equality is identity: doubles compare by bit pattern, so `NaN == NaN` and
/// `0.0 != -0.0`. Use [`strict_equal`] for the language's `===`.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    /// The empty-value marker.
    Empty,
    /// A boxed int32.
    Int32(i32),
    /// A boxed double.
    Double(f64),
    /// `true` or `false`.
    Boolean(bool),
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A heap cell.
    Cell(CellRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty)
            | (Value::Undefined, Value::Undefined)
            | (Value::Null, Value::Null) => true,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Cell(a), Value::Cell(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl Value {
    /// Returns `true` for int32 and double values.
    #[must_use]
    pub fn is_number(self) -> bool {
        matches!(self, Value::Int32(_) | Value::Double(_))
    }

    /// Returns `true` for heap cells.
    #[must_use]
    pub fn is_cell(self) -> bool {
        matches!(self, Value::Cell(_))
    }

    /// Returns the int32 payload, if this is a boxed int32.
    #[must_use]
    pub fn as_int32(self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the payload as a non-negative int32, if it is one.
    #[must_use]
    pub fn as_uint32(self) -> Option<u32> {
        self.as_int32().and_then(|i| u32::try_from(i).ok())
    }

    /// Returns the numeric value, if this is a number.
    #[must_use]
    pub fn as_number(self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(f64::from(i)),
            Value::Double(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the cell reference, if this is a cell.
    #[must_use]
    pub fn as_cell(self) -> Option<CellRef> {
        match self {
            Value::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    /// A stable 64-bit encoding used for hashing and pure-value keys.
    #[must_use]
    pub fn bits(self) -> u64 {
        match self {
            Value::Empty => 0,
            Value::Int32(i) => (1 << 60) | u64::from(i as u32),
            Value::Double(d) => d.to_bits() ^ (2 << 60),
            Value::Boolean(b) => (3 << 60) | u64::from(b),
            Value::Undefined => 4 << 60,
            Value::Null => 5 << 60,
            Value::Cell(cell) => (6 << 60) | u64::from(cell.id.0),
        }
    }

    /// The value's truthiness, when it can be decided without consulting the heap.
    ///
    /// Strings are truthy when non-empty, which the compiler cannot see, and objects
    /// may masquerade as undefined, so cells yield `None`.
    #[must_use]
    pub fn to_boolean(self) -> Option<bool> {
        match self {
            Value::Empty | Value::Undefined | Value::Null => Some(false),
            Value::Int32(i) => Some(i != 0),
            Value::Double(d) => Some(!(d == 0.0 || d.is_nan())),
            Value::Boolean(b) => Some(b),
            Value::Cell(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("<empty>"),
            Value::Int32(i) => write!(f, "Int32: {i}"),
            Value::Double(d) => write!(f, "Double: {d:?}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Cell(cell) => write!(f, "{:?}: {}", cell.kind, cell.id),
        }
    }
}

/// A value frozen into the graph as a constant, with the structure its cell had at
/// freeze time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrozenValue {
    /// The frozen value.
    pub value: Value,
    /// The cell's structure, for cell values.
    pub structure: Option<Structure>,
}

impl FrozenValue {
    /// Freezes a non-cell value.
    #[must_use]
    pub fn primitive(value: Value) -> Self {
        Self {
            value,
            structure: None,
        }
    }

    /// Freezes a cell together with its structure.
    #[must_use]
    pub fn cell(cell: CellRef, structure: Structure) -> Self {
        Self {
            value: Value::Cell(cell),
            structure: Some(structure),
        }
    }
}

impl fmt::Display for FrozenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.structure {
            Some(structure) => write!(f, "{} ({})", self.value, structure),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Converts a double to the canonical number value: int32 when exactly
/// representable and not `-0`, double otherwise.
#[must_use]
pub fn js_number(d: f64) -> Value {
    match exact_int32(d) {
        Some(i) => Value::Int32(i),
        None => Value::Double(d),
    }
}

/// Returns the int32 equal to `d` if there is one (rejecting `-0`).
#[must_use]
pub fn exact_int32(d: f64) -> Option<i32> {
    if is_negative_zero(d) {
        return None;
    }
    let i = d as i32;
    (f64::from(i) == d).then_some(i)
}

/// ToInt32: truncate toward zero and wrap modulo 2^32; NaN and infinities map to 0.
#[must_use]
pub fn to_int32(d: f64) -> i32 {
    if !d.is_finite() {
        return 0;
    }
    let truncated = d.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    modulo as u32 as i32
}

/// `Math.round`: round half-way cases toward positive infinity, keeping `-0`.
#[must_use]
pub fn js_round(d: f64) -> f64 {
    let ceil = d.ceil();
    if ceil - 0.5 > d {
        ceil - 1.0
    } else {
        ceil
    }
}

/// The language's strict equality, when decidable from the two values alone.
///
/// Two distinct string cells may still hold equal contents, so that comparison is
/// undecided.
#[must_use]
pub fn strict_equal(a: Value, b: Value) -> Option<bool> {
    match (a, b) {
        (Value::Cell(x), Value::Cell(y)) => {
            if x.id == y.id {
                Some(true)
            } else if x.kind == CellKind::String && y.kind == CellKind::String {
                None
            } else {
                Some(false)
            }
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Some(x == y),
            (None, None) => Some(a == b),
            _ => Some(false),
        },
    }
}
