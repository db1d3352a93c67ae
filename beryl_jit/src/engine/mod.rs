//! The JIT coordination engine.
//!
//! Process-singleton control plane between three actors: the mutator
//! (interpreter main thread), the garbage collector, and one background
//! compile worker.
//!
//! ```text
//! ┌──────────┐ submit  ┌───────────────────────────────┐
//! │ Mutator  │────────▶│ queue ──▶ worker ──▶ active    │
//! │ (main)   │◀────────│   ▲          │         │       │
//! └──────────┘ jit_func│   │     compile region │ evict │
//! ┌──────────┐         │   │      (in_jit)      ▼       │
//! │   GC     │◀───────▶│ rendezvous (in_gc)   unload    │
//! └──────────┘         └───────────────────────────────┘
//! ```
//!
//! Everything mutable lives behind one engine lock; four condvars tied
//! to it carry the wakeups (`pch_wakeup`, `client_wakeup`,
//! `worker_wakeup`, `gc_wakeup`). Wakeups are always broadcast: a queue
//! change or a stop request may legitimately wake several waiters, and
//! the waiters re-check their predicate anyway.

mod evict;
mod rendezvous;
mod worker;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use beryl_core::{
    ClassSerial, ExecutionContext, Iseq, IseqBody, JitFuncState, RuntimeRoots, ThreadRegistry,
};
use parking_lot::{Condvar, Mutex};

use crate::backend::{CompilerBackend, PchStatus};
use crate::config::JitConfig;
use crate::cont::{ContId, ContRegistry};
use crate::diag::Diagnostics;
use crate::error::JitError;
use crate::paths::JitPaths;
use crate::serials::ValidSerials;
use crate::stats::{JitStats, JitStatsSnapshot};
use crate::unit::{Unit, UnitArena, UnitId};

// =============================================================================
// Engine State
// =============================================================================

/// Mutable coordinator state, guarded by the engine lock.
pub(crate) struct EngineState {
    /// Owner of every live unit.
    pub(crate) arena: UnitArena,
    /// Units awaiting compilation, FIFO.
    pub(crate) queue: VecDeque<UnitId>,
    /// Units whose artifact is loaded and reachable through `jit_func`.
    pub(crate) active: Vec<UnitId>,
    /// Artifact holders kept until `finish`.
    pub(crate) compact: Vec<UnitId>,
    /// Registered continuations.
    pub(crate) conts: ContRegistry,
    /// True while a GC cycle runs.
    pub(crate) in_gc: bool,
    /// True while the worker is inside a compile step.
    pub(crate) in_jit: bool,
    /// State of the backend's precompiled-header bootstrap.
    pub(crate) pch_status: PchStatus,
    /// Cooperative stop request for the worker.
    pub(crate) stop_worker: bool,
    /// Set by the worker on exit.
    pub(crate) worker_stopped: bool,
}

impl EngineState {
    fn new() -> Self {
        EngineState {
            arena: UnitArena::new(),
            queue: VecDeque::new(),
            active: Vec::new(),
            compact: Vec::new(),
            conts: ContRegistry::new(),
            in_gc: false,
            in_jit: false,
            pch_status: PchStatus::NotReady,
            stop_worker: false,
            worker_stopped: true,
        }
    }
}

/// List lengths, mostly for introspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitCounts {
    /// Units awaiting compilation.
    pub queued: usize,
    /// Units with loaded code.
    pub active: usize,
    /// Artifact holders awaiting shutdown.
    pub compact: usize,
    /// Registered continuations.
    pub continuations: usize,
}

// =============================================================================
// JitEngine
// =============================================================================

/// The JIT coordination plane.
///
/// Created by [`JitEngine::init`]; all operations are no-ops (or
/// recoverable errors, for `pause`/`resume`) once the engine is
/// disabled by a bootstrap failure, `finish`, or a fork.
pub struct JitEngine {
    pub(crate) config: JitConfig,
    pub(crate) diag: Diagnostics,
    pub(crate) stats: JitStats,
    enabled: AtomicBool,
    call_enabled: AtomicBool,
    pub(crate) state: Mutex<EngineState>,
    /// Worker → mutator: PCH bootstrap finished.
    pub(crate) pch_wakeup: Condvar,
    /// Worker → GC/waiters: compile step finished.
    pub(crate) client_wakeup: Condvar,
    /// Mutator → worker: queue changed or stop requested.
    pub(crate) worker_wakeup: Condvar,
    /// GC → worker: GC cycle finished.
    pub(crate) gc_wakeup: Condvar,
    serials: ValidSerials,
    pub(crate) backend: Arc<dyn CompilerBackend>,
    pub(crate) threads: Arc<ThreadRegistry>,
    pub(crate) paths: Option<JitPaths>,
    next_unit_id: AtomicU64,
}

impl JitEngine {
    /// Initialize the subsystem and start the worker.
    ///
    /// Bootstrap failures (missing header, worker spawn failure) do not
    /// propagate: the returned engine is disabled and every operation
    /// on it is a no-op, mirroring an interpreter that simply runs
    /// without a JIT.
    pub fn init(
        config: JitConfig,
        roots: &RuntimeRoots,
        threads: Arc<ThreadRegistry>,
        backend: Arc<dyn CompilerBackend>,
    ) -> Arc<JitEngine> {
        let config = config.normalized();
        let diag = Diagnostics::new(config.verbose, config.warnings);

        let (paths, enabled) = match JitPaths::resolve(&roots.prefix_path) {
            Ok(paths) => {
                diag.verbose(2, format_args!("tmp dir is {}", paths.tmp_dir.display()));
                (Some(paths), true)
            }
            Err(err) => {
                diag.verbose(
                    1,
                    format_args!("Failure in JIT header file name initialization: {err}"),
                );
                (None, false)
            }
        };

        let engine = Arc::new(JitEngine {
            config,
            diag,
            stats: JitStats::new(),
            enabled: AtomicBool::new(enabled),
            call_enabled: AtomicBool::new(enabled),
            state: Mutex::new(EngineState::new()),
            pch_wakeup: Condvar::new(),
            client_wakeup: Condvar::new(),
            worker_wakeup: Condvar::new(),
            gc_wakeup: Condvar::new(),
            serials: ValidSerials::new(),
            backend,
            threads,
            paths,
            next_unit_id: AtomicU64::new(1),
        });
        if !engine.is_enabled() {
            return engine;
        }

        // Seed guard serials from the runtime roots: the root object
        // class, the class of top-level self, and every class or module
        // bound to a root constant.
        engine.add_class_serial(roots.object_class);
        engine.add_class_serial(roots.top_self_class);
        for entry in &roots.constants {
            if let Some(serial) = entry.guard_serial() {
                engine.add_class_serial(serial);
            }
        }

        engine.start_worker();
        engine
    }

    // =========================================================================
    // Flags & introspection
    // =========================================================================

    /// Whether the subsystem is operational.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether compiled entry points may be called. Cleared by
    /// `finish`; enforcement is the dispatcher's job.
    #[inline]
    pub fn call_enabled(&self) -> bool {
        self.call_enabled.load(Ordering::Acquire)
    }

    /// Whether an iseq's invocation count has crossed the compile
    /// threshold. The interpreter's dispatch gate.
    #[inline]
    pub fn call_threshold_reached(&self, body: &IseqBody) -> bool {
        self.is_enabled() && body.total_calls() >= self.config.min_calls
    }

    /// Whether the worker thread has stopped.
    pub fn worker_stopped(&self) -> bool {
        self.state.lock().worker_stopped
    }

    /// Whether a GC cycle currently excludes the compile region.
    pub fn is_in_gc(&self) -> bool {
        self.state.lock().in_gc
    }

    /// Whether the worker is inside a compile step.
    pub fn is_compiling(&self) -> bool {
        self.state.lock().in_jit
    }

    /// Current list lengths.
    pub fn unit_counts(&self) -> UnitCounts {
        let st = self.state.lock();
        UnitCounts {
            queued: st.queue.len(),
            active: st.active.len(),
            compact: st.compact.len(),
            continuations: st.conts.len(),
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> JitStatsSnapshot {
        self.stats.snapshot()
    }

    /// The normalized configuration.
    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.call_enabled.store(false, Ordering::Release);
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Admit an iseq for background compilation.
    ///
    /// Marks the iseq `NotReady`, creates and queues its unit, evicts
    /// if the active cache is at capacity, and wakes the worker. A
    /// second submission for the same iseq is a no-op while its first
    /// admission is still anywhere in flight.
    pub fn submit(&self, iseq: &Arc<Iseq>) {
        if !self.is_enabled() {
            return;
        }
        if self.state.lock().pch_status == PchStatus::Failed {
            return;
        }
        if iseq.body.jit_func.load() != JitFuncState::NotAdded {
            return;
        }
        iseq.body.jit_func.set_not_ready();
        let id = self.fresh_unit_id();

        let mut st = self.state.lock();
        if st.arena.unit_for_iseq(iseq.id).is_some() {
            return;
        }
        st.arena.insert(Unit::new(id, Arc::clone(iseq)));
        st.queue.push_back(id);
        self.stats.record_submission();

        if st.active.len() >= self.config.max_cache_size {
            self.unload_units(&mut st);
        }
        self.diag
            .verbose(3, format_args!("Sending wakeup signal to workers on submit"));
        self.worker_wakeup.notify_all();
    }

    // =========================================================================
    // Synchronous wait
    // =========================================================================

    /// Block until the iseq's `jit_func` leaves `NotReady`, waking the
    /// worker each poll. Gives up after the configured timeout or as
    /// soon as the PCH bootstrap is known dead, flipping the cell to
    /// the terminal `NotCompiled`.
    pub fn wait_for_entry(&self, body: &IseqBody) -> JitFuncState {
        let quantum = self.config.poll_interval;
        let max_tries =
            (self.config.wait_timeout.as_millis() / quantum.as_millis().max(1)) as u64;
        let mut tries: u64 = 0;
        while body.jit_func.load() == JitFuncState::NotReady {
            tries += 1;
            let pch_failed = self.state.lock().pch_status == PchStatus::Failed;
            if tries > max_tries || pch_failed {
                body.jit_func.give_up();
                self.stats.record_wait_timeout();
                self.diag
                    .warn(format_args!("timed out to wait for JIT finish"));
                break;
            }
            {
                let _st = self.state.lock();
                self.worker_wakeup.notify_all();
            }
            std::thread::sleep(quantum);
        }
        body.jit_func.load()
    }

    // =========================================================================
    // GC mark / reclaim hooks
    // =========================================================================

    /// Sever the unit backlink of a reclaimed iseq. The unit itself
    /// stays in whatever list holds it; the worker and the evictor
    /// discard iseq-less units when they next see them.
    pub fn iseq_freed(&self, iseq: &Iseq) {
        if !self.is_enabled() {
            return;
        }
        let mut st = self.state.lock();
        st.arena.detach_iseq(iseq.id);
    }

    /// Mark every queued iseq live.
    ///
    /// The callback runs with the engine lock released: marking may
    /// re-enter GC pathways that take the lock, so each queue entry is
    /// snapshotted under the lock and marked outside it.
    pub fn mark_queued_iseqs(&self, mark: &mut dyn FnMut(&Arc<Iseq>)) {
        if !self.is_enabled() {
            return;
        }
        let mut index = 0;
        loop {
            let iseq = {
                let st = self.state.lock();
                match st.queue.get(index) {
                    Some(&id) => st.arena.get(id).and_then(|unit| unit.iseq.clone()),
                    None => break,
                }
            };
            if let Some(iseq) = iseq {
                mark(&iseq);
            }
            index += 1;
        }
    }

    // =========================================================================
    // Continuations
    // =========================================================================

    /// Register a continuation's execution context for liveness scans.
    pub fn register_continuation(&self, ec: Arc<ExecutionContext>) -> ContId {
        let mut st = self.state.lock();
        st.conts.insert(ec)
    }

    /// Unregister a continuation.
    pub fn unregister_continuation(&self, id: ContId) -> bool {
        let mut st = self.state.lock();
        st.conts.remove(id)
    }

    // =========================================================================
    // Class serials
    // =========================================================================

    /// Record a class serial as a valid guard identity.
    ///
    /// Deliberately takes no engine lock: callers hold the interpreter
    /// lock, and the insertion may allocate and trigger GC, whose start
    /// hook takes the engine lock.
    pub fn add_class_serial(&self, serial: ClassSerial) {
        if !self.is_enabled() {
            return;
        }
        self.serials.insert(serial);
    }

    /// Retire a class serial. Takes the engine lock because retirement
    /// races with worker reads.
    pub fn remove_class_serial(&self, serial: ClassSerial) {
        if !self.is_enabled() {
            return;
        }
        let _st = self.state.lock();
        self.serials.remove(serial);
    }

    /// Guard check used by compiled code.
    #[inline]
    pub fn has_class_serial(&self, serial: ClassSerial) -> bool {
        self.serials.contains(serial)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop compiling new methods; already-compiled code stays
    /// callable. With `wait`, first drain the queue. Callers that take
    /// no explicit flag pass `config().wait`. Returns `false` if the
    /// worker was already stopped.
    pub fn pause(&self, wait: bool) -> Result<bool, JitError> {
        if !self.is_enabled() {
            return Err(JitError::NotEnabled);
        }
        if self.state.lock().worker_stopped {
            return Ok(false);
        }
        if wait {
            loop {
                {
                    let st = self.state.lock();
                    if st.queue.is_empty() {
                        break;
                    }
                    self.diag
                        .verbose(3, format_args!("Sending wakeup signal to drain queue"));
                    self.worker_wakeup.notify_all();
                }
                std::thread::sleep(self.config.poll_interval);
            }
        }
        self.stop_worker_blocking();
        Ok(true)
    }

    /// Restart compilation after [`JitEngine::pause`]. Returns `false`
    /// if the worker was already running.
    pub fn resume(self: &Arc<Self>) -> Result<bool, JitError> {
        if !self.is_enabled() {
            return Err(JitError::NotEnabled);
        }
        if !self.state.lock().worker_stopped {
            return Ok(false);
        }
        if !self.start_worker() {
            return Err(JitError::WorkerSpawn);
        }
        Ok(true)
    }

    /// Tear the subsystem down: wait out the PCH bootstrap, stop the
    /// worker, delete the PCH (unless `save_temps`), unload every unit
    /// and drop all registrations. The engine is disabled afterwards.
    pub fn finish(&self) {
        if !self.is_enabled() {
            return;
        }
        self.diag.verbose(2, format_args!("Stopping worker thread"));
        {
            // The worker may still be building the PCH. Cancelling it
            // would orphan compiler child processes and their temp
            // files, so wait for a clean handoff.
            let mut st = self.state.lock();
            while st.pch_status == PchStatus::NotReady {
                self.diag
                    .verbose(3, format_args!("Waiting wakeup from PCH bootstrap"));
                self.pch_wakeup.wait(&mut st);
            }
        }
        self.stop_worker_blocking();

        if !self.config.save_temps {
            if let Some(paths) = &self.paths {
                let _ = std::fs::remove_file(&paths.pch_file);
            }
        }

        {
            let mut st = self.state.lock();
            st.queue.clear();
            st.active.clear();
            st.compact.clear();
            for unit in st.arena.drain() {
                unit.unload();
            }
            st.conts.clear();
        }

        self.disable();
        self.diag.verbose(1, format_args!("Successful JIT finish"));
    }

    /// Disable the subsystem in a forked child. The child inherited no
    /// worker thread, so no teardown runs; the parent's resources are
    /// simply abandoned in the child.
    pub fn after_fork_in_child(&self) {
        if self.is_enabled() {
            self.diag
                .verbose(3, format_args!("Switching off JIT in a forked child"));
            self.enabled.store(false, Ordering::Release);
        }
    }

    pub(crate) fn fresh_unit_id(&self) -> UnitId {
        UnitId(self.next_unit_id.fetch_add(1, Ordering::Relaxed))
    }
}
