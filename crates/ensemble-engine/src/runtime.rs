//! Realtime-side objects: ports, blocks with their voices, and graphs.
//!
//! These are shared between the store (non-realtime) and compiled graphs
//! (realtime) through `Arc`. Mutable realtime state sits in `UnsafeCell`s and
//! is only touched from the audio thread or the worker running the owning
//! task; the non-realtime side changes it exclusively through plan steps
//! executed at a cycle boundary.

use crate::compiled::CompiledGraph;
use crate::factory::{Direction, PluginInstance, PortKind};
use arc_swap::{ArcSwap, ArcSwapOption};
use ensemble_core::{AtomicFlag, AtomicFloat, BufferRef, SubjectId, Urid};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What compiled graphs report through the notification ring.
#[derive(Debug, Clone)]
pub struct NotifyKeys {
    pub value: Urid,
    pub activity: Urid,
    /// Report every port, not just the flagged ones.
    pub monitor_all: Arc<AtomicFlag>,
}

impl NotifyKeys {
    #[inline]
    pub fn monitors(&self, port: &PortRuntime) -> bool {
        port.is_monitored() || self.monitor_all.get()
    }
}

/// A port of a block or a graph.
pub struct PortRuntime {
    id: SubjectId,
    index: usize,
    kind: PortKind,
    direction: Direction,
    value: AtomicFloat,
    monitored: AtomicFlag,
    /// Graph ports only: the mono buffer at the graph boundary.
    boundary: Option<UnsafeCell<BufferRef>>,
}

// SAFETY: `boundary` is written only by the task feeding it (or the driver
// between cycles) and read by tasks ordered after it by the task graph.
unsafe impl Sync for PortRuntime {}

impl PortRuntime {
    pub(crate) fn new(
        id: SubjectId,
        index: usize,
        kind: PortKind,
        direction: Direction,
        value: f32,
        boundary: Option<BufferRef>,
    ) -> Self {
        Self {
            id,
            index,
            kind,
            direction,
            value: AtomicFloat::new(value),
            monitored: AtomicFlag::new(false),
            boundary: boundary.map(UnsafeCell::new),
        }
    }

    #[inline]
    pub fn id(&self) -> SubjectId {
        self.id
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn kind(&self) -> PortKind {
        self.kind
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value.get()
    }

    #[inline]
    pub(crate) fn set_value(&self, value: f32) {
        self.value.set(value);
    }

    /// Store `value`, returning whether it changed.
    #[inline]
    pub(crate) fn replace_value(&self, value: f32) -> bool {
        self.value.replace(value)
    }

    #[inline]
    pub fn is_monitored(&self) -> bool {
        self.monitored.get()
    }

    pub(crate) fn set_monitored(&self, monitored: bool) {
        self.monitored.set(monitored);
    }

    pub fn is_boundary(&self) -> bool {
        self.boundary.is_some()
    }

    /// Boundary buffer of a graph port.
    ///
    /// # Safety
    /// No `&mut` to the same buffer may be live.
    #[inline]
    pub(crate) unsafe fn boundary(&self) -> Option<&BufferRef> {
        self.boundary.as_ref().map(|cell| &*cell.get())
    }

    /// # Safety
    /// Caller must be the only accessor of this buffer for the duration.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn boundary_mut(&self) -> Option<&mut BufferRef> {
        self.boundary.as_ref().map(|cell| &mut *cell.get())
    }
}

impl std::fmt::Debug for PortRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRuntime")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("value", &self.value.get())
            .finish()
    }
}

/// One polyphonic instance of a block: its plugin state and port buffers.
pub struct Voice {
    pub(crate) instance: Box<dyn PluginInstance>,
    pub(crate) buffers: Vec<BufferRef>,
}

impl Voice {
    pub(crate) fn new(instance: Box<dyn PluginInstance>, buffers: Vec<BufferRef>) -> Self {
        Self { instance, buffers }
    }
}

/// A block instance inside a graph.
pub struct BlockRuntime {
    ports: Vec<Arc<PortRuntime>>,
    voices: UnsafeCell<Vec<Voice>>,
    /// Length of `voices`, readable from any thread.
    num_voices: AtomicUsize,
}

// SAFETY: `voices` is mutated only by the task that runs this block and by
// `SwapVoices` at a cycle boundary; downstream tasks read output buffers
// after the task graph has ordered them behind this block.
unsafe impl Sync for BlockRuntime {}

impl BlockRuntime {
    pub(crate) fn new(ports: Vec<Arc<PortRuntime>>, voices: Vec<Voice>) -> Self {
        Self {
            ports,
            num_voices: AtomicUsize::new(voices.len()),
            voices: UnsafeCell::new(voices),
        }
    }

    pub fn ports(&self) -> &[Arc<PortRuntime>] {
        &self.ports
    }

    pub fn port(&self, index: usize) -> Option<&Arc<PortRuntime>> {
        self.ports.get(index)
    }

    /// # Safety
    /// No mutable access to the voices may happen concurrently.
    #[inline]
    pub(crate) unsafe fn voices(&self) -> &[Voice] {
        &*self.voices.get()
    }

    /// Mutable access to the voices. Must not change their number; use
    /// [`swap_voices`](Self::swap_voices) for that.
    ///
    /// # Safety
    /// Caller must be the only accessor of the voices for the duration.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn voices_mut(&self) -> &mut [Voice] {
        &mut *self.voices.get()
    }

    /// Exchange the voice set with `voices`.
    ///
    /// # Safety
    /// Caller must be the only accessor of the voices for the duration.
    #[inline]
    pub(crate) unsafe fn swap_voices(&self, voices: &mut Vec<Voice>) {
        std::mem::swap(&mut *self.voices.get(), voices);
        self.num_voices.store((*self.voices.get()).len(), Ordering::Release);
    }

    /// Number of voices as of the last executed swap.
    pub fn num_voices(&self) -> usize {
        self.num_voices.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for BlockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRuntime")
            .field("ports", &self.ports.len())
            .finish_non_exhaustive()
    }
}

/// Live state of a graph.
pub struct GraphRuntime {
    compiled: ArcSwapOption<CompiledGraph>,
    ports: ArcSwap<Vec<Arc<PortRuntime>>>,
    enabled: AtomicFlag,
}

impl GraphRuntime {
    pub(crate) fn new() -> Self {
        Self {
            compiled: ArcSwapOption::empty(),
            ports: ArcSwap::from_pointee(Vec::new()),
            enabled: AtomicFlag::new(true),
        }
    }

    /// The currently installed plan.
    pub fn compiled(&self) -> Option<Arc<CompiledGraph>> {
        self.compiled.load_full()
    }

    /// Realtime read of the installed plan.
    #[inline]
    pub(crate) fn load_compiled(&self) -> arc_swap::Guard<Option<Arc<CompiledGraph>>> {
        self.compiled.load()
    }

    /// Install `next`, returning the plan it replaces.
    #[inline]
    pub(crate) fn swap_compiled(
        &self,
        next: Option<Arc<CompiledGraph>>,
    ) -> Option<Arc<CompiledGraph>> {
        self.compiled.swap(next)
    }

    /// Boundary ports, in creation order.
    pub fn ports(&self) -> arc_swap::Guard<Arc<Vec<Arc<PortRuntime>>>> {
        self.ports.load()
    }

    #[inline]
    pub(crate) fn swap_ports(&self, next: Arc<Vec<Arc<PortRuntime>>>) -> Arc<Vec<Arc<PortRuntime>>> {
        self.ports.swap(next)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

impl std::fmt::Debug for GraphRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRuntime")
            .field("compiled", &self.compiled.load().is_some())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
