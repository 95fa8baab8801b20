//! Worker threads that help the root context run each cycle.
//!
//! The root (audio) context publishes the cycle's work through an
//! `ArcSwapOption`, wakes every worker, and joins in. Workers claim and steal
//! tasks until the cycle is complete, then park until the next wake-up. The
//! root returns only when no worker still holds a reference to the work, so
//! the last reference to a retired plan is never dropped on a worker.

use crate::lockfree::AtomicFlag;
use crate::run_context::{CycleTiming, RunContext};
use crate::task::{TaskBody, TaskGraph};
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use crossbeam::sync::{Parker, Unparker};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Work shared by every context during one cycle.
pub trait CycleWork: Send + Sync + 'static {
    /// Prepare per-cycle state. Called by the root before workers wake.
    fn begin_cycle(&self);

    /// Participate until the cycle's work is done.
    fn run_worker(&self, ctx: &mut RunContext);
}

impl<T: TaskBody + 'static> CycleWork for TaskGraph<T> {
    fn begin_cycle(&self) {
        TaskGraph::begin_cycle(self)
    }

    fn run_worker(&self, ctx: &mut RunContext) {
        TaskGraph::run_worker(self, ctx)
    }
}

/// Cycle window published to workers without locking.
#[derive(Default)]
struct TimingCell {
    start: AtomicU64,
    end: AtomicU64,
    /// `offset << 32 | nframes`
    slice: AtomicU64,
}

impl TimingCell {
    fn store(&self, timing: CycleTiming) {
        self.start.store(timing.start, Ordering::Relaxed);
        self.end.store(timing.end, Ordering::Relaxed);
        self.slice.store(
            (timing.offset as u64) << 32 | timing.nframes as u64,
            Ordering::Relaxed,
        );
    }

    fn load(&self) -> CycleTiming {
        let slice = self.slice.load(Ordering::Relaxed);
        CycleTiming {
            start: self.start.load(Ordering::Relaxed),
            end: self.end.load(Ordering::Relaxed),
            offset: (slice >> 32) as u32,
            nframes: slice as u32,
        }
    }
}

struct Shared<W> {
    current: ArcSwapOption<W>,
    timing: TimingCell,
    busy: AtomicUsize,
    shutdown: AtomicFlag,
}

/// Pool of worker run contexts, one OS thread each.
pub struct WorkerPool<W: CycleWork> {
    shared: Arc<Shared<W>>,
    unparkers: Vec<Unparker>,
    handles: Vec<JoinHandle<()>>,
}

impl<W: CycleWork> WorkerPool<W> {
    /// Spawn one thread per context. Context ids should start at 1; the
    /// root context (id 0) stays with the caller.
    pub fn new(contexts: Vec<RunContext>) -> Result<Self> {
        let shared = Arc::new(Shared {
            current: ArcSwapOption::empty(),
            timing: TimingCell::default(),
            busy: AtomicUsize::new(0),
            shutdown: AtomicFlag::new(false),
        });

        let mut pool = Self {
            shared,
            unparkers: Vec::with_capacity(contexts.len()),
            handles: Vec::with_capacity(contexts.len()),
        };

        for ctx in contexts {
            let index = ctx.id();
            let parker = Parker::new();
            let unparker = parker.unparker().clone();
            let shared = pool.shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("ensemble-worker-{index}"))
                .spawn(move || worker_main(shared, ctx, parker))
                .map_err(|source| Error::ThreadSpawn { index, source })?;
            pool.unparkers.push(unparker);
            pool.handles.push(handle);
        }

        tracing::debug!(workers = pool.handles.len(), "worker pool started");
        Ok(pool)
    }

    /// Contexts taking part in a cycle, root included.
    pub fn num_contexts(&self) -> usize {
        self.handles.len() + 1
    }

    /// Run one cycle of `work` on the root context plus every worker.
    pub fn run_cycle(&self, work: &Arc<W>, root: &mut RunContext) {
        work.begin_cycle();
        if self.handles.is_empty() {
            work.run_worker(root);
            return;
        }

        // Published before `current`; the swap orders it for workers.
        self.shared.timing.store(root.timing());
        self.shared.current.store(Some(work.clone()));
        for unparker in &self.unparkers {
            unparker.unpark();
        }

        work.run_worker(root);

        self.shared.current.store(None);
        while self.shared.busy.load(Ordering::SeqCst) > 0 {
            std::hint::spin_loop();
        }
    }

    fn stop(&mut self) {
        self.shared.shutdown.set(true);
        for unparker in &self.unparkers {
            unparker.unpark();
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        self.unparkers.clear();
    }
}

impl<W: CycleWork> Drop for WorkerPool<W> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_main<W: CycleWork>(shared: Arc<Shared<W>>, mut ctx: RunContext, parker: Parker) {
    tracing::debug!(id = ctx.id(), "worker started");
    loop {
        parker.park();
        if shared.shutdown.get() {
            break;
        }
        shared.busy.fetch_add(1, Ordering::SeqCst);
        {
            let work = shared.current.load();
            if let Some(work) = work.as_ref() {
                ctx.follow(&shared.timing.load());
                work.run_worker(&mut ctx);
            }
        }
        shared.busy.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!(id = ctx.id(), "worker stopped");
}
