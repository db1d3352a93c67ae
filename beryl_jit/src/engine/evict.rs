//! Active-cache eviction.
//!
//! Runs at submission time when the active list is at capacity. Code
//! that may be on an execution stack is never unloaded (doing so would
//! leave return addresses pointing into an unmapped artifact); among
//! the rest, the least-called unit goes first, taking call count as a
//! proxy for future utility.

use beryl_core::ExecutionContext;

use super::{EngineState, JitEngine};
use crate::unit::{UnitArena, UnitId};

impl JitEngine {
    /// Shrink the active list below the configured cap.
    ///
    /// Overshoots the cap by a tenth of the current length so that
    /// back-to-back submissions do not re-trigger the scan on every
    /// call. The margin is captured once, before the eviction loop;
    /// units dropped by the reclaimed-iseq sweep shrink the margin
    /// rather than the target.
    pub(crate) fn unload_units(&self, st: &mut EngineState) {
        let units_before = st.active.len();

        // Units whose iseq was reclaimed hold unreachable code; drop
        // them unconditionally before the liveness scan.
        let mut index = 0;
        while index < st.active.len() {
            let id = st.active[index];
            let reclaimed = st.arena.get(id).map_or(true, |unit| unit.iseq.is_none());
            if reclaimed {
                if let Some(unit) = st.arena.remove(id) {
                    unit.unload();
                }
                st.active.remove(index);
                self.stats.record_swept();
            } else {
                index += 1;
            }
        }

        // Liveness scan: clear every mark, then flag each unit whose
        // iseq sits in a frame of any living thread or continuation.
        for &id in &st.active {
            if let Some(unit) = st.arena.get_mut(id) {
                debug_assert!(unit.iseq.is_some() && unit.handle.is_some());
                unit.used_code = false;
            }
        }
        self.threads
            .for_each(|thread| mark_stack_units(&thread.ec, &mut st.arena));
        for ec in st.conts.contexts() {
            mark_stack_units(&ec, &mut st.arena);
        }

        let margin = st.active.len() / 10;
        let target = self.config.max_cache_size.saturating_sub(margin);
        while st.active.len() > target {
            let Some((position, id, calls)) = self.pick_victim(st) else {
                // Everything left is on a stack; no progress possible.
                break;
            };
            self.diag.verbose(
                2,
                format_args!("Unloading unit {} (calls={calls})", id.raw()),
            );
            if let Some(unit) = st.arena.remove(id) {
                unit.unload();
            }
            st.active.remove(position);
            self.stats.record_eviction();
        }
        self.diag.verbose(
            1,
            format_args!(
                "Too many JIT code -- {} units unloaded",
                units_before - st.active.len()
            ),
        );
    }

    /// The evictable active unit with the fewest recorded calls. Ties
    /// keep the earliest list position.
    fn pick_victim(&self, st: &EngineState) -> Option<(usize, UnitId, u64)> {
        let mut worst: Option<(usize, UnitId, u64)> = None;
        for (position, &id) in st.active.iter().enumerate() {
            let Some(unit) = st.arena.get(id) else {
                continue;
            };
            if unit.used_code {
                continue;
            }
            let calls = unit
                .iseq
                .as_ref()
                .map_or(0, |iseq| iseq.body.total_calls());
            match worst {
                Some((_, _, min)) if min <= calls => {}
                _ => worst = Some((position, id, calls)),
            }
        }
        worst
    }
}

/// Flag the unit of every live bytecode frame on one stack.
fn mark_stack_units(ec: &ExecutionContext, arena: &mut UnitArena) {
    ec.each_live_iseq(|iseq| {
        if let Some(id) = arena.unit_for_iseq(iseq.id) {
            if let Some(unit) = arena.get_mut(id) {
                unit.used_code = true;
            }
        }
    });
}
