//! Instruction sequences and their JIT binding cells.
//!
//! An [`Iseq`] is the compiled-bytecode object for one method or block.
//! The interpreter owns iseqs; the JIT coordination plane only ever sees
//! them through `Arc` handles and the three cells on [`IseqBody`]:
//!
//! - `jit_func` — sentinel state or native entry address, published
//!   atomically so the dispatch hot path can read it without a lock
//! - `jit_unit` — id of the compilation unit admitted for this iseq
//! - `total_calls` — invocation counter fed by the interpreter's
//!   dispatch, consumed by the JIT cache evictor

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for an instruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IseqId(pub u64);

impl IseqId {
    /// Raw id value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Address of a native entry point produced by the JIT backend.
///
/// Always greater than the sentinel range of [`JitFuncCell`]; real code
/// addresses trivially satisfy this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodePtr(pub usize);

impl CodePtr {
    /// Address as a plain integer.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

// =============================================================================
// JitFuncCell
// =============================================================================

const NOT_ADDED: usize = 0;
const NOT_READY: usize = 1;
const NOT_COMPILED: usize = 2;
/// Lowest value a real entry address may take.
pub const FIRST_CODE_ADDR: usize = 3;

/// Observed state of an iseq's `jit_func` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitFuncState {
    /// Never admitted to the JIT.
    NotAdded,
    /// Admitted; compilation in flight.
    NotReady,
    /// Terminal failure: worker dead, bootstrap failed, or wait timed out.
    NotCompiled,
    /// Native entry is loaded and callable.
    Compiled(CodePtr),
}

impl JitFuncState {
    /// Entry address, if compiled.
    #[inline]
    pub fn code_ptr(self) -> Option<CodePtr> {
        match self {
            JitFuncState::Compiled(ptr) => Some(ptr),
            _ => None,
        }
    }
}

/// Lock-free cell holding an iseq's JIT dispatch state.
///
/// Encoded in one word: `0` not-added, `1` not-ready, `2` not-compiled,
/// anything else is a native entry address. Transitions out of
/// `NotReady` happen at most once (success xor failure); only unit
/// eviction resets the cell back to `NotAdded`.
#[derive(Debug)]
pub struct JitFuncCell(AtomicUsize);

impl JitFuncCell {
    /// Create a cell in the `NotAdded` state.
    pub const fn new() -> Self {
        JitFuncCell(AtomicUsize::new(NOT_ADDED))
    }

    /// Read the current state.
    #[inline]
    pub fn load(&self) -> JitFuncState {
        match self.0.load(Ordering::Acquire) {
            NOT_ADDED => JitFuncState::NotAdded,
            NOT_READY => JitFuncState::NotReady,
            NOT_COMPILED => JitFuncState::NotCompiled,
            addr => JitFuncState::Compiled(CodePtr(addr)),
        }
    }

    /// Mark compilation as in flight. Called at admission.
    #[inline]
    pub fn set_not_ready(&self) {
        self.0.store(NOT_READY, Ordering::Release);
    }

    /// Publish a compiled entry. Succeeds only from `NotReady`, so a
    /// cell that already went terminal stays terminal.
    #[inline]
    pub fn publish(&self, entry: CodePtr) -> bool {
        debug_assert!(entry.0 >= FIRST_CODE_ADDR);
        self.0
            .compare_exchange(NOT_READY, entry.0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flip `NotReady` to the terminal `NotCompiled` state.
    #[inline]
    pub fn give_up(&self) -> bool {
        self.0
            .compare_exchange(NOT_READY, NOT_COMPILED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Swap one published entry for another. Used when loaded code is
    /// re-pointed at a compacted artifact; no-op unless a real entry is
    /// currently installed.
    #[inline]
    pub fn replace_entry(&self, entry: CodePtr) -> bool {
        debug_assert!(entry.0 >= FIRST_CODE_ADDR);
        let mut cur = self.0.load(Ordering::Acquire);
        while cur >= FIRST_CODE_ADDR {
            match self
                .0
                .compare_exchange(cur, entry.0, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(now) => cur = now,
            }
        }
        false
    }

    /// Reset to `NotAdded`. Used when a unit is unloaded so the iseq can
    /// be admitted again later.
    #[inline]
    pub fn reset(&self) {
        self.0.store(NOT_ADDED, Ordering::Release);
    }
}

impl Default for JitFuncCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// IseqBody / Iseq
// =============================================================================

/// Mutable per-iseq state shared between interpreter and JIT.
#[derive(Debug, Default)]
pub struct IseqBody {
    /// Dispatch cell read on every call.
    pub jit_func: JitFuncCell,
    /// Id of the compilation unit attached to this iseq; `0` if none.
    jit_unit: AtomicU64,
    /// Number of times this iseq has been invoked.
    total_calls: AtomicU64,
}

impl IseqBody {
    /// Record one invocation and return the new count.
    #[inline]
    pub fn record_call(&self) -> u64 {
        self.total_calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current invocation count.
    #[inline]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Overwrite the invocation count. Test and profiling support.
    #[inline]
    pub fn set_total_calls(&self, calls: u64) {
        self.total_calls.store(calls, Ordering::Relaxed);
    }

    /// Attach a compilation unit id; `0` detaches.
    #[inline]
    pub fn set_jit_unit(&self, unit_id: u64) {
        self.jit_unit.store(unit_id, Ordering::Release);
    }

    /// Id of the attached compilation unit, if any.
    #[inline]
    pub fn jit_unit(&self) -> Option<u64> {
        match self.jit_unit.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }
}

/// One compiled bytecode object (method or block).
#[derive(Debug)]
pub struct Iseq {
    /// Stable identifier assigned by the loader.
    pub id: IseqId,
    /// Shared mutable state.
    pub body: IseqBody,
}

impl Iseq {
    /// Create an iseq with the given id.
    pub fn new(id: IseqId) -> Self {
        Iseq {
            id,
            body: IseqBody::default(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_starts_not_added() {
        let cell = JitFuncCell::new();
        assert_eq!(cell.load(), JitFuncState::NotAdded);
    }

    #[test]
    fn test_publish_requires_not_ready() {
        let cell = JitFuncCell::new();
        assert!(!cell.publish(CodePtr(0x1000)));
        cell.set_not_ready();
        assert!(cell.publish(CodePtr(0x1000)));
        assert_eq!(cell.load(), JitFuncState::Compiled(CodePtr(0x1000)));
    }

    #[test]
    fn test_transition_out_of_not_ready_is_single_shot() {
        let cell = JitFuncCell::new();
        cell.set_not_ready();
        assert!(cell.give_up());
        assert!(!cell.publish(CodePtr(0x2000)));
        assert!(!cell.give_up());
        assert_eq!(cell.load(), JitFuncState::NotCompiled);
    }

    #[test]
    fn test_replace_entry_only_swaps_real_entries() {
        let cell = JitFuncCell::new();
        assert!(!cell.replace_entry(CodePtr(0x3000)));
        cell.set_not_ready();
        assert!(!cell.replace_entry(CodePtr(0x3000)));
        assert!(cell.publish(CodePtr(0x1000)));
        assert!(cell.replace_entry(CodePtr(0x3000)));
        assert_eq!(cell.load(), JitFuncState::Compiled(CodePtr(0x3000)));
    }

    #[test]
    fn test_reset_reopens_admission() {
        let cell = JitFuncCell::new();
        cell.set_not_ready();
        assert!(cell.publish(CodePtr(0x1000)));
        cell.reset();
        assert_eq!(cell.load(), JitFuncState::NotAdded);
    }

    #[test]
    fn test_body_call_counter() {
        let body = IseqBody::default();
        assert_eq!(body.total_calls(), 0);
        assert_eq!(body.record_call(), 1);
        assert_eq!(body.record_call(), 2);
        body.set_total_calls(40);
        assert_eq!(body.total_calls(), 40);
    }

    #[test]
    fn test_body_unit_attachment() {
        let body = IseqBody::default();
        assert_eq!(body.jit_unit(), None);
        body.set_jit_unit(7);
        assert_eq!(body.jit_unit(), Some(7));
        body.set_jit_unit(0);
        assert_eq!(body.jit_unit(), None);
    }
}
