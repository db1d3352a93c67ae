//! GC rendezvous.
//!
//! The collector and the compile region are mutually exclusive: the GC
//! start hook waits out any in-flight compile step before flagging
//! `in_gc`, and the worker waits out any GC cycle before flagging
//! `in_jit`. Both flags live under the engine lock, so neither side can
//! observe the other mid-transition.

use super::JitEngine;

impl JitEngine {
    /// Host GC hook: called at the start of a collection cycle. Blocks
    /// while the worker is inside a compile step, then shuts the
    /// compile region until [`JitEngine::gc_finish`].
    pub fn gc_start(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut st = self.state.lock();
        while st.in_jit {
            self.diag
                .verbose(4, format_args!("Waiting wakeup from a worker for GC"));
            self.client_wakeup.wait(&mut st);
            self.diag
                .verbose(4, format_args!("Getting wakeup from a worker for GC"));
        }
        st.in_gc = true;
    }

    /// Host GC hook: called at the end of a collection cycle. Reopens
    /// the compile region and wakes the worker.
    pub fn gc_finish(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut st = self.state.lock();
        st.in_gc = false;
        self.diag
            .verbose(4, format_args!("Sending wakeup signal to workers after GC"));
        self.gc_wakeup.notify_all();
    }
}

/// RAII token for the worker's compile region.
///
/// Entering waits out any in-flight GC cycle and sets `in_jit`;
/// dropping clears it and wakes GC waiters.
pub(crate) struct CompileRegion<'a> {
    engine: &'a JitEngine,
}

impl<'a> CompileRegion<'a> {
    pub(crate) fn enter(engine: &'a JitEngine) -> Self {
        let mut st = engine.state.lock();
        while st.in_gc {
            engine
                .diag
                .verbose(4, format_args!("Waiting wakeup from GC"));
            engine.gc_wakeup.wait(&mut st);
        }
        st.in_jit = true;
        CompileRegion { engine }
    }
}

impl Drop for CompileRegion<'_> {
    fn drop(&mut self) {
        let mut st = self.engine.state.lock();
        st.in_jit = false;
        self.engine.client_wakeup.notify_all();
    }
}
