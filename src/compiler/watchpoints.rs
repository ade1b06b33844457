//! Watchpoints a compilation depends on.
//!
//! Optimizations that rely on a structure not transitioning, or on a property not
//! being replaced, record a [`Watchpoint`] in the graph's [`DesiredWatchpoints`].
//! When the compilation finishes, the driver hands them to the shared
//! [`WatchpointTable`] and receives one token per watchpoint. A compilation whose
//! watchpoints were fired in the meantime is invalid.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, DashSet};

use crate::analysis::structure::{PropertyOffset, Structure, StructureId};

/// An invariant compiled code depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Watchpoint {
    /// Objects with this structure never transition away from it.
    StructureStable(StructureId),
    /// The property at this offset of this structure is never replaced.
    PropertyReplacement(StructureId, PropertyOffset),
}

impl fmt::Display for Watchpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watchpoint::StructureStable(id) => write!(f, "stable({id})"),
            Watchpoint::PropertyReplacement(id, offset) => write!(f, "replacement({id}, {offset})"),
        }
    }
}

/// The watchpoints one graph depends on.
#[derive(Debug, Default)]
pub struct DesiredWatchpoints {
    set: DashSet<Watchpoint>,
}

impl DesiredWatchpoints {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the compilation relies on `structure` staying stable.
    pub fn consider(&self, structure: Structure) {
        self.set.insert(Watchpoint::StructureStable(structure.id));
    }

    /// Records a watchpoint.
    pub fn add_lazily(&self, watchpoint: Watchpoint) {
        self.set.insert(watchpoint);
    }

    /// `true` if `watchpoint` was recorded.
    #[must_use]
    pub fn contains(&self, watchpoint: Watchpoint) -> bool {
        self.set.contains(&watchpoint)
    }

    /// Number of recorded watchpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// The recorded watchpoints, sorted.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Watchpoint> {
        let mut all: Vec<Watchpoint> = self.set.iter().map(|w| *w).collect();
        all.sort();
        all
    }

    /// `true` if no recorded watchpoint has fired in `table`.
    #[must_use]
    pub fn are_still_valid(&self, table: &WatchpointTable) -> bool {
        self.set.iter().all(|w| table.is_valid(*w))
    }
}

/// Token returned for a registered watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchpointToken(pub u64);

/// The process-wide watchpoint table.
///
/// Shared between compilations; every operation is safe to call concurrently.
#[derive(Debug, Default)]
pub struct WatchpointTable {
    fired: DashSet<Watchpoint>,
    registered: DashMap<Watchpoint, Vec<WatchpointToken>>,
    next_token: AtomicU64,
}

impl WatchpointTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `watchpoint` has not fired.
    #[must_use]
    pub fn is_valid(&self, watchpoint: Watchpoint) -> bool {
        !self.fired.contains(&watchpoint)
    }

    /// Marks `watchpoint` as fired. Returns the tokens of the compilations that
    /// depended on it.
    pub fn fire(&self, watchpoint: Watchpoint) -> Vec<WatchpointToken> {
        self.fired.insert(watchpoint);
        self.registered
            .remove(&watchpoint)
            .map(|(_, tokens)| tokens)
            .unwrap_or_default()
    }

    /// Registers a dependency on every watchpoint in `desired`. Returns `None` if
    /// one of them already fired.
    pub fn register(&self, desired: &DesiredWatchpoints) -> Option<Vec<WatchpointToken>> {
        if !desired.are_still_valid(self) {
            return None;
        }
        let tokens = desired
            .to_vec()
            .into_iter()
            .map(|watchpoint| {
                let token = WatchpointToken(self.next_token.fetch_add(1, Ordering::Relaxed));
                self.registered.entry(watchpoint).or_default().push(token);
                token
            })
            .collect();
        Some(tokens)
    }

    /// Number of watchpoints with at least one registered dependency.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_fire() {
        let desired = DesiredWatchpoints::new();
        desired.add_lazily(Watchpoint::StructureStable(StructureId(1)));
        desired.add_lazily(Watchpoint::PropertyReplacement(StructureId(1), 0));
        desired.add_lazily(Watchpoint::StructureStable(StructureId(1)));
        assert_eq!(desired.len(), 2);

        let table = WatchpointTable::new();
        let tokens = table.register(&desired).expect("valid");
        assert_eq!(tokens.len(), 2);

        let dependents = table.fire(Watchpoint::StructureStable(StructureId(1)));
        assert_eq!(dependents.len(), 1);
        assert!(!desired.are_still_valid(&table));
        assert!(table.register(&desired).is_none());
    }
}
