//! Worker thread lifecycle and compile loop.
//!
//! One long-lived background thread drains the unit queue. Stopping is
//! cooperative only: the mutator raises `stop_worker` and broadcasts
//! until the worker acknowledges, because forced termination could
//! orphan compiler child processes and their temp files.

use std::sync::Arc;

use beryl_core::Iseq;

use super::rendezvous::CompileRegion;
use super::JitEngine;
use crate::backend::{CompileError, LoadedArtifact, PchStatus};
use crate::unit::{Unit, UnitId};

impl JitEngine {
    /// Spawn the worker thread. On spawn failure the subsystem is
    /// disabled, mirroring a failed bootstrap.
    pub(crate) fn start_worker(self: &Arc<Self>) -> bool {
        {
            let mut st = self.state.lock();
            st.stop_worker = false;
            st.worker_stopped = false;
        }
        let engine = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("beryl-jit-worker".into())
            .spawn(move || worker_main(engine));
        match spawned {
            Ok(_) => true,
            Err(_) => {
                self.state.lock().worker_stopped = true;
                self.disable();
                self.diag
                    .verbose(1, format_args!("Failure in JIT worker thread initialization"));
                false
            }
        }
    }

    /// Ask the worker to stop and wait until it has. Broadcasts every
    /// poll so a worker parked on the queue condvar cannot miss the
    /// request.
    pub(crate) fn stop_worker_blocking(&self) {
        self.state.lock().stop_worker = true;
        loop {
            {
                let st = self.state.lock();
                if st.worker_stopped {
                    break;
                }
                self.diag
                    .verbose(3, format_args!("Sending cancel signal to worker"));
                self.worker_wakeup.notify_all();
            }
            // Stand-in for the interpreter's interrupt servicing.
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

// =============================================================================
// Worker loop
// =============================================================================

fn worker_main(engine: Arc<JitEngine>) {
    let Some(paths) = engine.paths.clone() else {
        // Never spawned without resolved paths; bail defensively anyway.
        finish_worker(&engine);
        return;
    };

    // PCH bootstrap runs once per process, not once per worker: a
    // resumed worker reuses the header built before the pause.
    let status = {
        let st = engine.state.lock();
        st.pch_status
    };
    let status = if status == PchStatus::NotReady {
        let built = engine.backend.prepare(&paths);
        let mut st = engine.state.lock();
        st.pch_status = built;
        engine.pch_wakeup.notify_all();
        built
    } else {
        status
    };
    if status == PchStatus::Failed {
        engine
            .diag
            .verbose(1, format_args!("Precompiled header build failed"));
        finish_worker(&engine);
        return;
    }

    while let Some((unit_id, iseq)) = next_job(&engine) {
        let result = {
            let _region = CompileRegion::enter(&engine);
            engine.backend.compile(&iseq, unit_id)
        };
        install_result(&engine, unit_id, &iseq, result);
    }

    compact_on_stop(&engine);
    finish_worker(&engine);
}

/// Dequeue the next compilable unit, sleeping on the queue condvar
/// while it is empty. Units whose iseq was reclaimed while queued are
/// discarded on the way. `None` means a stop was requested.
fn next_job(engine: &JitEngine) -> Option<(UnitId, Arc<Iseq>)> {
    let mut st = engine.state.lock();
    loop {
        if st.stop_worker {
            return None;
        }
        if let Some(id) = st.queue.pop_front() {
            match st.arena.get(id).and_then(|unit| unit.iseq.clone()) {
                Some(iseq) => return Some((id, iseq)),
                None => {
                    if let Some(unit) = st.arena.remove(id) {
                        unit.unload();
                    }
                    engine.stats.record_swept();
                    continue;
                }
            }
        }
        engine.worker_wakeup.wait(&mut st);
    }
}

/// Publish a compile outcome. The unit was popped from the queue before
/// compiling, so it belongs to no list here; success moves it into the
/// active list, failure drops it.
fn install_result(
    engine: &JitEngine,
    unit_id: UnitId,
    iseq: &Arc<Iseq>,
    result: Result<Arc<dyn LoadedArtifact>, CompileError>,
) {
    let mut st = engine.state.lock();
    match result {
        Ok(artifact) => {
            let entry = artifact.entry();
            let attached = st
                .arena
                .get(unit_id)
                .map_or(false, |unit| unit.iseq.is_some());
            if attached && iseq.body.jit_func.publish(entry) {
                if let Some(unit) = st.arena.get_mut(unit_id) {
                    debug_assert!(unit.handle.is_none());
                    unit.handle = Some(artifact);
                    st.active.push(unit_id);
                    engine.stats.record_compiled();
                    engine.diag.verbose(
                        2,
                        format_args!(
                            "Unit {} compiled (entry={:#x})",
                            unit_id.raw(),
                            entry.as_usize()
                        ),
                    );
                }
            } else {
                // The iseq was reclaimed mid-compile, or a synchronous
                // waiter already gave the cell up; the terminal state
                // stands and the fresh artifact is dropped.
                if st.arena.remove(unit_id).is_some() {
                    iseq.body.set_jit_unit(0);
                }
                engine.stats.record_swept();
                engine.diag.verbose(
                    2,
                    format_args!("Unit {} dropped after late compile", unit_id.raw()),
                );
            }
        }
        Err(err) => {
            engine
                .diag
                .verbose(2, format_args!("Unit {} failed: {err}", unit_id.raw()));
            iseq.body.jit_func.give_up();
            iseq.body.set_jit_unit(0);
            st.arena.remove(unit_id);
            engine.stats.record_compile_failure();
        }
    }
    engine.client_wakeup.notify_all();
}

/// Combine all loaded artifacts through the backend, if it can, so the
/// per-unit files collapse into one holder that survives until finish.
fn compact_on_stop(engine: &JitEngine) {
    let jobs: Vec<(UnitId, Arc<Iseq>)> = {
        let st = engine.state.lock();
        st.active
            .iter()
            .filter_map(|&id| {
                st.arena
                    .get(id)
                    .and_then(|unit| unit.iseq.clone().map(|iseq| (id, iseq)))
            })
            .collect()
    };
    if jobs.is_empty() {
        return;
    }

    let combined = {
        let _region = CompileRegion::enter(engine);
        engine.backend.compact(&jobs)
    };
    let Some(combined) = combined else {
        return;
    };

    let mut st = engine.state.lock();
    let holder_id = engine.fresh_unit_id();
    st.arena
        .insert(Unit::synthetic(holder_id, Arc::clone(&combined)));
    st.compact.push(holder_id);
    for (unit_id, iseq) in &jobs {
        let Some(entry) = combined.entry_for(*unit_id) else {
            continue;
        };
        if let Some(unit) = st.arena.get_mut(*unit_id) {
            if unit.handle.is_some() && iseq.body.jit_func.replace_entry(entry) {
                unit.handle = Some(Arc::clone(&combined));
            }
        }
    }
    engine.stats.record_compaction();
    engine
        .diag
        .verbose(2, format_args!("Compacted {} units", jobs.len()));
}

fn finish_worker(engine: &JitEngine) {
    let mut st = engine.state.lock();
    st.worker_stopped = true;
    engine.client_wakeup.notify_all();
}
