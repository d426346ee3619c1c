//! Cycle guard for a single record traversal

use std::collections::{HashMap, HashSet};

/// Identity of a record visited during one traversal
///
/// Records are identified by the address of their first non-zero-sized field
/// together with the record's name and that field's type. Two different
/// records can share an address (an embedded record sits at offset zero of
/// its parent), so the address alone is never enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Visit {
    addr: usize,
    record: &'static str,
    field_type: &'static str,
}

impl Visit {
    pub fn new<T: ?Sized>(first_field: &T, record: &'static str) -> Self {
        Visit {
            addr: first_field as *const T as *const () as usize,
            record,
            field_type: std::any::type_name::<T>(),
        }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }
}

/// Records seen so far, keyed by address
///
/// One guard lives for exactly one traversal: one header pass or one row.
/// Nothing is removed on the way back up, so siblings see each other's
/// visits.
#[derive(Debug, Default)]
pub struct VisitGuard {
    visited: HashMap<usize, HashSet<Visit>>,
}

impl VisitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit; returns `false` if the same record was already entered
    pub fn enter(&mut self, visit: Visit) -> bool {
        self.visited.entry(visit.addr).or_default().insert(visit)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.visited.values().map(HashSet::len).sum()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
