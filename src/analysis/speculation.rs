//! Speculated types: the type-tag component of the abstract value lattice.
//!
//! A [`SpeculatedType`] is a set of disjoint runtime type classes encoded as bits.
//! The empty set means "no value can flow here"; [`SpeculatedType::HEAP_TOP`] admits
//! every value that can live in the heap. Join is bitwise union, meet is bitwise
//! intersection, so the lattice laws (commutative, associative, idempotent join)
//! hold by construction.

use std::fmt;

use bitflags::bitflags;

use crate::analysis::value::Value;

bitflags! {
    /// A set of possible runtime type classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpeculatedType: u32 {
        /// A plain object with no special class.
        const FINAL_OBJECT = 0x0000_0001;
        /// An array object.
        const ARRAY = 0x0000_0002;
        /// A function object.
        const FUNCTION = 0x0000_0004;
        /// A typed array view of any element kind.
        const TYPED_ARRAY_VIEW = 0x0000_0ff8;
        /// A `DirectArguments` object (arguments aliasing the frame's parameters).
        const DIRECT_ARGUMENTS = 0x0000_1000;
        /// A `ScopedArguments` object.
        const SCOPED_ARGUMENTS = 0x0000_2000;
        /// A boxed string object.
        const STRING_OBJECT = 0x0000_4000;
        /// Any other object, including cloned arguments.
        const OBJECT_OTHER = 0x0000_8000;
        /// Any object.
        const OBJECT = 0x0000_ffff;
        /// A string that is an identifier.
        const STRING_IDENT = 0x0001_0000;
        /// A string that is not an identifier.
        const STRING_VAR = 0x0002_0000;
        /// Any string.
        const STRING = 0x0003_0000;
        /// A symbol.
        const SYMBOL = 0x0004_0000;
        /// A cell that is neither an object, a string nor a symbol.
        const CELL_OTHER = 0x0008_0000;
        /// Any heap cell.
        const CELL = 0x000f_ffff;
        /// An int32 that is 0 or 1.
        const BOOL_INT32 = 0x0010_0000;
        /// An int32 other than 0 or 1.
        const NON_BOOL_INT32 = 0x0020_0000;
        /// Any int32.
        const INT32 = 0x0030_0000;
        /// An integer beyond int32 range held in a double.
        const INT52_AS_DOUBLE = 0x0080_0000;
        /// Any integer.
        const INTEGER = 0x00b0_0000;
        /// A non-integral, non-NaN double.
        const NON_INT_AS_DOUBLE = 0x0100_0000;
        /// Any non-NaN double.
        const DOUBLE_REAL = 0x0180_0000;
        /// A NaN that is safe to box.
        const DOUBLE_PURE_NAN = 0x0200_0000;
        /// A NaN that must be purified before boxing.
        const DOUBLE_IMPURE_NAN = 0x0400_0000;
        /// Any NaN.
        const DOUBLE_NAN = 0x0600_0000;
        /// Any double a bytecode value can hold.
        const BYTECODE_DOUBLE = 0x0380_0000;
        /// Any double.
        const FULL_DOUBLE = 0x0780_0000;
        /// An int32 or a real double.
        const BYTECODE_REAL_NUMBER = 0x01b0_0000;
        /// Any number a bytecode value can hold.
        const BYTECODE_NUMBER = 0x03b0_0000;
        /// Any number.
        const FULL_NUMBER = 0x07b0_0000;
        /// A boolean.
        const BOOLEAN = 0x1000_0000;
        /// `null` or `undefined`.
        const OTHER = 0x2000_0000;
        /// A boolean, `null` or `undefined`.
        const MISC = 0x3000_0000;
        /// Any value that can live in the heap.
        const HEAP_TOP = 0x33bf_ffff;
        /// The empty-value marker (holes, uninitialized slots).
        const EMPTY = 0x4000_0000;
        /// Any value including the empty marker.
        const BYTECODE_TOP = 0x73bf_ffff;
    }
}

impl SpeculatedType {
    /// The empty set.
    pub const NONE: Self = Self::empty();

    /// Returns `true` if every possible value is a cell.
    #[must_use]
    pub fn is_cell(self) -> bool {
        !self.is_empty() && (self & !Self::CELL).is_empty()
    }

    /// Returns `true` if no possible value is a cell.
    #[must_use]
    pub fn is_not_cell(self) -> bool {
        (self & Self::CELL).is_empty()
    }

    /// Returns `true` if every possible value is an int32.
    #[must_use]
    pub fn is_int32(self) -> bool {
        !self.is_empty() && (self & !Self::INT32).is_empty()
    }

    /// Returns `true` if every possible value is a number.
    #[must_use]
    pub fn is_number(self) -> bool {
        !self.is_empty() && (self & !Self::FULL_NUMBER).is_empty()
    }

    /// Returns `true` if every possible value is a string.
    #[must_use]
    pub fn is_string(self) -> bool {
        !self.is_empty() && (self & !Self::STRING).is_empty()
    }

    /// Returns `true` if every possible value is an object.
    #[must_use]
    pub fn is_object(self) -> bool {
        !self.is_empty() && (self & !Self::OBJECT).is_empty()
    }

    /// Returns `true` if `self` admits nothing outside `other`.
    #[must_use]
    pub fn is_subset_of(self, other: Self) -> bool {
        (self & !other).is_empty()
    }

    /// Returns the type class of a concrete value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Empty => Self::EMPTY,
            Value::Int32(i) => {
                if i == 0 || i == 1 {
                    Self::BOOL_INT32
                } else {
                    Self::NON_BOOL_INT32
                }
            }
            Value::Double(d) => Self::from_double(d),
            Value::Boolean(_) => Self::BOOLEAN,
            Value::Undefined | Value::Null => Self::OTHER,
            Value::Cell(cell) => cell.kind.speculation(),
        }
    }

    /// Returns the type class of a double.
    #[must_use]
    pub fn from_double(d: f64) -> Self {
        if d.is_nan() {
            Self::DOUBLE_PURE_NAN
        } else if d == d.trunc() && d.abs() <= (1u64 << 52) as f64 && !is_negative_zero(d) {
            Self::INT52_AS_DOUBLE
        } else {
            Self::NON_INT_AS_DOUBLE
        }
    }
}

impl fmt::Display for SpeculatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMED: &[(SpeculatedType, &str)] = &[
            (SpeculatedType::BYTECODE_TOP, "Top"),
            (SpeculatedType::HEAP_TOP, "HeapTop"),
            (SpeculatedType::CELL, "Cell"),
            (SpeculatedType::OBJECT, "Object"),
            (SpeculatedType::FULL_NUMBER, "Number"),
            (SpeculatedType::BYTECODE_NUMBER, "BytecodeNumber"),
            (SpeculatedType::FULL_DOUBLE, "Double"),
            (SpeculatedType::DOUBLE_REAL, "DoubleReal"),
            (SpeculatedType::INT32, "Int32"),
            (SpeculatedType::STRING, "String"),
            (SpeculatedType::MISC, "Misc"),
        ];

        if self.is_empty() {
            return f.write_str("None");
        }
        if let Some((_, name)) = NAMED.iter().find(|(ty, _)| ty == self) {
            return f.write_str(name);
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        if first {
            write!(f, "{:#x}", self.bits())?;
        }
        Ok(())
    }
}

/// Returns `true` for `-0.0`.
#[must_use]
pub fn is_negative_zero(d: f64) -> bool {
    d == 0.0 && d.is_sign_negative()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_classification() {
        assert_eq!(SpeculatedType::from_value(Value::Int32(1)), SpeculatedType::BOOL_INT32);
        assert_eq!(
            SpeculatedType::from_value(Value::Int32(7)),
            SpeculatedType::NON_BOOL_INT32
        );
        assert_eq!(
            SpeculatedType::from_value(Value::Double(4.0)),
            SpeculatedType::INT52_AS_DOUBLE
        );
        assert_eq!(
            SpeculatedType::from_value(Value::Double(-0.0)),
            SpeculatedType::NON_INT_AS_DOUBLE
        );
        assert_eq!(
            SpeculatedType::from_value(Value::Double(f64::NAN)),
            SpeculatedType::DOUBLE_PURE_NAN
        );
    }

    #[test]
    fn test_predicates() {
        assert!(SpeculatedType::BOOL_INT32.is_int32());
        assert!(!SpeculatedType::NONE.is_int32());
        assert!((SpeculatedType::STRING | SpeculatedType::FINAL_OBJECT).is_cell());
        assert!(SpeculatedType::MISC.is_not_cell());
        assert!(SpeculatedType::DOUBLE_REAL.is_subset_of(SpeculatedType::BYTECODE_NUMBER));
    }

    #[test]
    fn test_display() {
        assert_eq!(SpeculatedType::INT32.to_string(), "Int32");
        assert_eq!(SpeculatedType::NONE.to_string(), "None");
        assert_eq!(SpeculatedType::BOOLEAN.to_string(), "BOOLEAN");
    }
}
