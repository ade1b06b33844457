//! Indexed-storage layouts and the array-access modes speculated for them.

use std::fmt;

use bitflags::bitflags;

use crate::analysis::{AbstractValue, SpeculatedType};

/// Shape of an object's indexed storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexingShape {
    /// No indexed storage.
    None,
    /// Unboxed int32 elements.
    Int32,
    /// Unboxed double elements.
    Double,
    /// Boxed elements.
    Contiguous,
    /// Sparse or exotic storage.
    ArrayStorage,
}

/// Indexing type of a structure: a storage shape plus whether the object is an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexingType {
    /// Storage shape.
    pub shape: IndexingShape,
    /// Whether the object is an array (has a magic `length`).
    pub is_array: bool,
}

impl IndexingType {
    /// A non-array object with the given storage.
    #[must_use]
    pub fn non_array(shape: IndexingShape) -> Self {
        Self {
            shape,
            is_array: false,
        }
    }

    /// An array with the given storage.
    #[must_use]
    pub fn array(shape: IndexingShape) -> Self {
        Self {
            shape,
            is_array: true,
        }
    }
}

bitflags! {
    /// A set of indexing types, one bit per (shape, is-array) pair.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArrayModes: u16 {
        /// Non-array without indexed storage.
        const NON_ARRAY = 1 << 0;
        /// Array without indexed storage.
        const ARRAY_WITH_NONE = 1 << 1;
        /// Non-array with int32 storage.
        const NON_ARRAY_WITH_INT32 = 1 << 2;
        /// Array with int32 storage.
        const ARRAY_WITH_INT32 = 1 << 3;
        /// Non-array with double storage.
        const NON_ARRAY_WITH_DOUBLE = 1 << 4;
        /// Array with double storage.
        const ARRAY_WITH_DOUBLE = 1 << 5;
        /// Non-array with contiguous storage.
        const NON_ARRAY_WITH_CONTIGUOUS = 1 << 6;
        /// Array with contiguous storage.
        const ARRAY_WITH_CONTIGUOUS = 1 << 7;
        /// Non-array with array storage.
        const NON_ARRAY_WITH_ARRAY_STORAGE = 1 << 8;
        /// Array with array storage.
        const ARRAY_WITH_ARRAY_STORAGE = 1 << 9;
        /// Every array mode.
        const ALL = 0x3ff;
        /// Every mode whose object is an array.
        const ALL_ARRAY = 0x2aa;
    }
}

impl ArrayModes {
    /// The single mode of an indexing type.
    #[must_use]
    pub fn from_indexing(indexing: IndexingType) -> Self {
        let shape = match indexing.shape {
            IndexingShape::None => 0,
            IndexingShape::Int32 => 1,
            IndexingShape::Double => 2,
            IndexingShape::Contiguous => 3,
            IndexingShape::ArrayStorage => 4,
        };
        Self::from_bits_truncate(1 << (shape * 2 + u16::from(indexing.is_array)))
    }

    /// Both the array and non-array modes of a shape.
    #[must_use]
    pub fn with_shape(shape: IndexingShape) -> Self {
        Self::from_indexing(IndexingType::non_array(shape))
            | Self::from_indexing(IndexingType::array(shape))
    }

    /// `true` if a value proven to have `self` modes needs no check for `expected`.
    #[must_use]
    pub fn already_checked(self, expected: ArrayModes) -> bool {
        (self & expected) == self
    }
}

/// Storage type an indexed access speculates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayType {
    /// No speculation; the access is a full generic call.
    Generic,
    /// The access has never executed; reaching it exits.
    ForceExit,
    /// A string.
    String,
    /// A `DirectArguments` object.
    DirectArguments,
    /// Int32 storage.
    Int32,
    /// Double storage.
    Double,
    /// Contiguous storage.
    Contiguous,
    /// Array storage.
    ArrayStorage,
}

/// Whether the accessed object is speculated to be an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayClass {
    /// Known to be an array.
    Array,
    /// Known not to be an array.
    NonArray,
    /// Either.
    PossiblyArray,
}

/// Bounds behaviour an indexed access speculates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySpeculation {
    /// Always within the public length.
    InBounds,
    /// May store one past the end or into a hole.
    ToHole,
    /// May access out of bounds.
    OutOfBounds,
}

/// The speculation attached to an indexed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayMode {
    /// Storage speculated on.
    pub array_type: ArrayType,
    /// Array-ness speculated on.
    pub class: ArrayClass,
    /// Bounds behaviour speculated on.
    pub speculation: ArraySpeculation,
}

impl ArrayMode {
    /// An in-bounds, possibly-array access of the given type.
    #[must_use]
    pub fn new(array_type: ArrayType) -> Self {
        Self {
            array_type,
            class: ArrayClass::PossiblyArray,
            speculation: ArraySpeculation::InBounds,
        }
    }

    /// Returns a copy with a different array class.
    #[must_use]
    pub fn with_class(mut self, class: ArrayClass) -> Self {
        self.class = class;
        self
    }

    /// Returns a copy with a different bounds speculation.
    #[must_use]
    pub fn with_speculation(mut self, speculation: ArraySpeculation) -> Self {
        self.speculation = speculation;
        self
    }

    /// `true` if the access is speculated in bounds.
    #[must_use]
    pub fn is_in_bounds(&self) -> bool {
        self.speculation == ArraySpeculation::InBounds
    }

    /// `true` if the access may go out of bounds.
    #[must_use]
    pub fn is_out_of_bounds(&self) -> bool {
        self.speculation == ArraySpeculation::OutOfBounds
    }

    /// `true` if a store may write a hole or grow the array.
    #[must_use]
    pub fn may_store_to_hole(&self) -> bool {
        !self.is_in_bounds()
    }

    /// Storage shape accessed by int32, double, contiguous and array-storage modes.
    #[must_use]
    pub fn indexing_shape(&self) -> Option<IndexingShape> {
        match self.array_type {
            ArrayType::Int32 => Some(IndexingShape::Int32),
            ArrayType::Double => Some(IndexingShape::Double),
            ArrayType::Contiguous => Some(IndexingShape::Contiguous),
            ArrayType::ArrayStorage => Some(IndexingShape::ArrayStorage),
            _ => None,
        }
    }

    /// The mode used when the same access stores rather than loads.
    #[must_use]
    pub fn for_put(self) -> Self {
        match self.array_type {
            ArrayType::String | ArrayType::DirectArguments => ArrayMode::new(ArrayType::Generic),
            _ => self,
        }
    }

    /// Array modes of the objects this access accepts without exiting.
    #[must_use]
    pub fn array_modes_that_pass_filtering(&self) -> ArrayModes {
        match self.array_type {
            ArrayType::Generic => ArrayModes::ALL,
            ArrayType::Int32 | ArrayType::Double | ArrayType::Contiguous | ArrayType::ArrayStorage => {
                let shape = self.indexing_shape().unwrap_or(IndexingShape::None);
                match self.class {
                    ArrayClass::Array => ArrayModes::from_indexing(IndexingType::array(shape)),
                    ArrayClass::NonArray => ArrayModes::from_indexing(IndexingType::non_array(shape)),
                    ArrayClass::PossiblyArray => ArrayModes::with_shape(shape),
                }
            }
            ArrayType::ForceExit | ArrayType::String | ArrayType::DirectArguments => {
                ArrayModes::NON_ARRAY
            }
        }
    }

    /// Returns `true` if the abstract value already satisfies this mode's check.
    #[must_use]
    pub fn already_checked(&self, value: &AbstractValue) -> bool {
        match self.array_type {
            ArrayType::Generic => true,
            ArrayType::ForceExit => false,
            ArrayType::String => value.ty.is_subset_of(SpeculatedType::STRING),
            ArrayType::DirectArguments => value.ty.is_subset_of(SpeculatedType::DIRECT_ARGUMENTS),
            ArrayType::Int32 | ArrayType::Double | ArrayType::Contiguous | ArrayType::ArrayStorage => {
                let shape = self.indexing_shape().unwrap_or(IndexingShape::None);
                let expected = match self.class {
                    ArrayClass::Array => ArrayModes::from_indexing(IndexingType::array(shape)),
                    _ => ArrayModes::with_shape(shape),
                };
                if value.array_modes.already_checked(expected) {
                    return true;
                }
                if value.structure.is_top() {
                    return false;
                }
                value.structure.iter().all(|structure| {
                    structure.indexing.shape == shape
                        && (self.class != ArrayClass::Array || structure.indexing.is_array)
                })
            }
        }
    }
}

impl fmt::Display for ArrayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}::{:?}::{:?}", self.array_type, self.class, self.speculation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_from_indexing() {
        assert_eq!(
            ArrayModes::from_indexing(IndexingType::array(IndexingShape::Int32)),
            ArrayModes::ARRAY_WITH_INT32
        );
        assert_eq!(
            ArrayModes::with_shape(IndexingShape::Double),
            ArrayModes::ARRAY_WITH_DOUBLE | ArrayModes::NON_ARRAY_WITH_DOUBLE
        );
        assert!(ArrayModes::ALL_ARRAY.contains(ArrayModes::ARRAY_WITH_NONE));
        assert!(!ArrayModes::ALL_ARRAY.contains(ArrayModes::NON_ARRAY));
    }

    #[test]
    fn test_already_checked_modes() {
        assert!(ArrayModes::ARRAY_WITH_INT32.already_checked(ArrayModes::with_shape(IndexingShape::Int32)));
        assert!(!ArrayModes::ALL.already_checked(ArrayModes::ARRAY_WITH_INT32));
        assert!(ArrayModes::empty().already_checked(ArrayModes::ARRAY_WITH_INT32));
    }

    #[test]
    fn test_for_put() {
        let mode = ArrayMode::new(ArrayType::DirectArguments);
        assert_eq!(mode.for_put().array_type, ArrayType::Generic);
        let mode = ArrayMode::new(ArrayType::Int32);
        assert_eq!(mode.for_put(), mode);
    }
}
