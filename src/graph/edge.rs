//! Use edges: a reference to a child node plus the check the use performs.

use std::fmt;

use crate::{analysis::SpeculatedType, graph::NodeId};

/// The speculation check a use performs on its child.
///
/// The `Known*` kinds assert a fact that an earlier check already established, so
/// they never emit a check of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseKind {
    /// No check.
    Untyped,
    /// Checks for an int32.
    Int32,
    /// Asserts an int32.
    KnownInt32,
    /// Checks for any number.
    Number,
    /// Checks for a non-NaN number.
    RealNumber,
    /// Consumes an unboxed double.
    DoubleRep,
    /// Checks for a boolean.
    Boolean,
    /// Checks for a cell.
    Cell,
    /// Asserts a cell.
    KnownCell,
    /// Checks for an object.
    Object,
    /// Checks for a string.
    String,
    /// Checks for a string object, which reads its structure.
    StringObject,
    /// Checks for a non-cell.
    NotCell,
}

impl UseKind {
    /// The set of types that pass this use's check.
    #[must_use]
    pub fn type_filter(self) -> SpeculatedType {
        match self {
            UseKind::Untyped => SpeculatedType::BYTECODE_TOP,
            UseKind::Int32 | UseKind::KnownInt32 => SpeculatedType::INT32,
            UseKind::Number => SpeculatedType::BYTECODE_NUMBER,
            UseKind::RealNumber => SpeculatedType::BYTECODE_REAL_NUMBER,
            UseKind::DoubleRep => SpeculatedType::FULL_DOUBLE,
            UseKind::Boolean => SpeculatedType::BOOLEAN,
            UseKind::Cell | UseKind::KnownCell => SpeculatedType::CELL,
            UseKind::Object => SpeculatedType::OBJECT,
            UseKind::String => SpeculatedType::STRING,
            UseKind::StringObject => SpeculatedType::STRING_OBJECT,
            UseKind::NotCell => SpeculatedType::BYTECODE_TOP & !SpeculatedType::CELL,
        }
    }

    /// `true` for kinds that never emit a check.
    #[must_use]
    pub fn should_not_have_type_check(self) -> bool {
        matches!(
            self,
            UseKind::Untyped | UseKind::KnownInt32 | UseKind::KnownCell | UseKind::DoubleRep
        )
    }

    /// `true` if the check consults the child's structure.
    #[must_use]
    pub fn uses_structure(self) -> bool {
        matches!(self, UseKind::StringObject)
    }

    /// `true` if passing this check already implies the value is in `ty`.
    #[must_use]
    pub fn already_checked(self, ty: SpeculatedType) -> bool {
        ty.is_subset_of(self.type_filter())
    }
}

impl fmt::Display for UseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}Use")
    }
}

/// Whether the abstract interpreter proved a use's check redundant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProofStatus {
    /// The check must be emitted.
    #[default]
    NeedsCheck,
    /// The check is proven to pass.
    IsProved,
}

/// A use of a child node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The child.
    pub node: NodeId,
    /// The check performed on the child.
    pub use_kind: UseKind,
    /// Whether the check is proven redundant.
    pub proof: ProofStatus,
}

impl Edge {
    /// An edge with an unproven check.
    #[must_use]
    pub fn new(node: NodeId, use_kind: UseKind) -> Self {
        Self {
            node,
            use_kind,
            proof: ProofStatus::NeedsCheck,
        }
    }

    /// An untyped edge.
    #[must_use]
    pub fn untyped(node: NodeId) -> Self {
        Self::new(node, UseKind::Untyped)
    }

    /// `true` if the check is proven redundant.
    #[must_use]
    pub fn is_proved(&self) -> bool {
        self.proof == ProofStatus::IsProved
    }

    /// `true` if code generation will not emit a check for this edge.
    #[must_use]
    pub fn will_not_have_check(&self) -> bool {
        self.is_proved() || self.use_kind.should_not_have_type_check()
    }

    /// `true` if code generation will emit a check for this edge.
    #[must_use]
    pub fn will_have_check(&self) -> bool {
        !self.will_not_have_check()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.use_kind, self.proof) {
            (UseKind::Untyped, _) => write!(f, "{}", self.node),
            (kind, ProofStatus::IsProved) => write!(f, "{:?}:!{}", kind, self.node),
            (kind, ProofStatus::NeedsCheck) => write!(f, "{:?}:{}", kind, self.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_emission() {
        let mut edge = Edge::new(NodeId(1), UseKind::Int32);
        assert!(edge.will_have_check());
        edge.proof = ProofStatus::IsProved;
        assert!(edge.will_not_have_check());
        assert!(Edge::new(NodeId(1), UseKind::KnownCell).will_not_have_check());
    }

    #[test]
    fn test_already_checked_object() {
        assert!(UseKind::Object.already_checked(SpeculatedType::OBJECT));
        assert!(UseKind::Cell.already_checked(SpeculatedType::OBJECT));
        assert!(!UseKind::Int32.already_checked(SpeculatedType::OBJECT));
        assert!(!UseKind::String.already_checked(SpeculatedType::OBJECT));
    }
}
