//! Valid class-serial set.
//!
//! Compiled code guards method dispatch on class serials; this set holds
//! every serial that is still a live class identity. Guard reads are
//! sharded-lock lookups with no engine-lock involvement, so a guard may
//! observe a serial that is concurrently being retired. That staleness
//! is safe: the only decision point is absence, and a stale *absence*
//! merely sends the call back through the interpreter's slow path.
//!
//! Locking contract (deliberately asymmetric, enforced by the engine):
//! insertion happens from interpreter-lock-holding contexts and must not
//! touch the engine lock; removal may race with worker reads and goes
//! through the engine lock.

use beryl_core::ClassSerial;
use dashmap::DashSet;

/// Concurrent set of currently valid class serials.
#[derive(Debug, Default)]
pub struct ValidSerials {
    set: DashSet<ClassSerial>,
}

impl ValidSerials {
    /// Create an empty set.
    pub fn new() -> Self {
        ValidSerials {
            set: DashSet::new(),
        }
    }

    /// Insert a serial. Returns `false` if it was already present.
    #[inline]
    pub fn insert(&self, serial: ClassSerial) -> bool {
        self.set.insert(serial)
    }

    /// Remove a serial. Returns `true` if it was present.
    #[inline]
    pub fn remove(&self, serial: ClassSerial) -> bool {
        self.set.remove(&serial).is_some()
    }

    /// Guard check: is this serial still a live class identity?
    #[inline]
    pub fn contains(&self, serial: ClassSerial) -> bool {
        self.set.contains(&serial)
    }

    /// Number of valid serials.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Check whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let serials = ValidSerials::new();
        assert!(serials.insert(ClassSerial(1)));
        assert!(!serials.insert(ClassSerial(1)));
        assert!(serials.contains(ClassSerial(1)));
        assert!(serials.remove(ClassSerial(1)));
        assert!(!serials.contains(ClassSerial(1)));
        assert!(!serials.remove(ClassSerial(1)));
    }

    #[test]
    fn test_remove_then_readd_restores_presence() {
        let serials = ValidSerials::new();
        for raw in 1..=4 {
            serials.insert(ClassSerial(raw));
        }
        serials.remove(ClassSerial(3));
        serials.insert(ClassSerial(3));
        for raw in 1..=4 {
            assert!(serials.contains(ClassSerial(raw)));
        }
        assert_eq!(serials.len(), 4);
    }
}
