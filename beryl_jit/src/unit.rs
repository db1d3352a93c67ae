//! Compilation units and the unit arena.
//!
//! One unit exists per iseq ever admitted to the JIT. The arena owns
//! every unit and indexes them by iseq; the coordinator's three lists
//! (queue, active, compact) hold unit ids, never units, so a unit is a
//! member of exactly one list at a time and the iseq↔unit relation
//! stays acyclic: the iseq body stores the unit id, the unit holds the
//! iseq `Arc` until the interpreter reclaims the iseq and severs it.

use std::sync::Arc;

use beryl_core::{Iseq, IseqId};
use rustc_hash::FxHashMap;

use crate::backend::LoadedArtifact;

// =============================================================================
// Unit
// =============================================================================

/// Identifier of one compilation unit. Ids are assigned monotonically
/// starting at 1; `0` is reserved as the detached sentinel in the iseq
/// body's `jit_unit` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl UnitId {
    /// Raw id value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// The coordinator's handle on one JIT compilation attempt.
pub struct Unit {
    /// Monotonic unit id.
    pub id: UnitId,
    /// Source iseq; severed when the interpreter reclaims the iseq
    /// while the unit is still queued or loaded.
    pub iseq: Option<Arc<Iseq>>,
    /// Loaded artifact; `None` until compiled.
    pub handle: Option<Arc<dyn LoadedArtifact>>,
    /// Set by the eviction liveness scan when the unit's entry may be
    /// on an execution stack.
    pub used_code: bool,
}

impl Unit {
    /// Create a unit for the given iseq.
    pub fn new(id: UnitId, iseq: Arc<Iseq>) -> Self {
        Unit {
            id,
            iseq: Some(iseq),
            handle: None,
            used_code: false,
        }
    }

    /// Create an iseq-less unit that only keeps an artifact alive
    /// (shutdown compaction).
    pub fn synthetic(id: UnitId, handle: Arc<dyn LoadedArtifact>) -> Self {
        Unit {
            id,
            iseq: None,
            handle: Some(handle),
            used_code: false,
        }
    }

    /// Unload this unit: reopen the iseq for admission and release the
    /// artifact. The iseq itself is untouched.
    pub fn unload(self) {
        if let Some(iseq) = &self.iseq {
            iseq.body.jit_func.reset();
            iseq.body.set_jit_unit(0);
        }
        // handle drops here, releasing the loaded artifact
    }
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("iseq", &self.iseq.as_ref().map(|iseq| iseq.id))
            .field("loaded", &self.handle.is_some())
            .field("used_code", &self.used_code)
            .finish()
    }
}

// =============================================================================
// UnitArena
// =============================================================================

/// Owner of all live units, indexed by iseq.
#[derive(Debug, Default)]
pub struct UnitArena {
    units: FxHashMap<UnitId, Unit>,
    by_iseq: FxHashMap<IseqId, UnitId>,
}

impl UnitArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        UnitArena::default()
    }

    /// Insert a unit, indexing it by its iseq when one is attached.
    pub fn insert(&mut self, unit: Unit) {
        if let Some(iseq) = &unit.iseq {
            iseq.body.set_jit_unit(unit.id.raw());
            self.by_iseq.insert(iseq.id, unit.id);
        }
        self.units.insert(unit.id, unit);
    }

    /// Look up a unit.
    #[inline]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Look up a unit mutably.
    #[inline]
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Unit admitted for the given iseq, if any.
    #[inline]
    pub fn unit_for_iseq(&self, iseq: IseqId) -> Option<UnitId> {
        self.by_iseq.get(&iseq).copied()
    }

    /// Sever the iseq backlink of its unit. Called when the interpreter
    /// reclaims an iseq; the unit stays in whatever list holds it.
    pub fn detach_iseq(&mut self, iseq: IseqId) {
        if let Some(id) = self.by_iseq.remove(&iseq) {
            if let Some(unit) = self.units.get_mut(&id) {
                unit.iseq = None;
            }
        }
    }

    /// Remove a unit from the arena, dropping its index entry. The
    /// caller decides what happens to the iseq's dispatch cell.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        let unit = self.units.remove(&id)?;
        if let Some(iseq) = &unit.iseq {
            self.by_iseq.remove(&iseq.id);
        }
        Some(unit)
    }

    /// Drain every unit out of the arena.
    pub fn drain(&mut self) -> Vec<Unit> {
        self.by_iseq.clear();
        self.units.drain().map(|(_, unit)| unit).collect()
    }

    /// Number of live units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use beryl_core::JitFuncState;

    fn iseq(raw: u64) -> Arc<Iseq> {
        Arc::new(Iseq::new(IseqId(raw)))
    }

    #[test]
    fn test_insert_indexes_by_iseq_and_sets_backref() {
        let mut arena = UnitArena::new();
        let iseq = iseq(1);
        arena.insert(Unit::new(UnitId(5), Arc::clone(&iseq)));

        assert_eq!(arena.unit_for_iseq(IseqId(1)), Some(UnitId(5)));
        assert_eq!(iseq.body.jit_unit(), Some(5));
    }

    #[test]
    fn test_detach_severs_backlink_but_keeps_unit() {
        let mut arena = UnitArena::new();
        let iseq = iseq(1);
        arena.insert(Unit::new(UnitId(5), Arc::clone(&iseq)));

        arena.detach_iseq(IseqId(1));
        assert_eq!(arena.unit_for_iseq(IseqId(1)), None);
        assert!(arena.get(UnitId(5)).unwrap().iseq.is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_unload_reopens_iseq_for_admission() {
        let iseq = iseq(1);
        iseq.body.jit_func.set_not_ready();
        assert!(iseq.body.jit_func.publish(beryl_core::CodePtr(0x1000)));

        let unit = Unit::new(UnitId(3), Arc::clone(&iseq));
        iseq.body.set_jit_unit(3);
        unit.unload();

        assert_eq!(iseq.body.jit_func.load(), JitFuncState::NotAdded);
        assert_eq!(iseq.body.jit_unit(), None);
    }

    #[test]
    fn test_remove_clears_index() {
        let mut arena = UnitArena::new();
        let iseq = iseq(2);
        arena.insert(Unit::new(UnitId(9), iseq));

        let unit = arena.remove(UnitId(9)).unwrap();
        assert_eq!(unit.id, UnitId(9));
        assert_eq!(arena.unit_for_iseq(IseqId(2)), None);
        assert!(arena.is_empty());
    }
}
