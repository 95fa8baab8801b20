//! Per-worker view of the current cycle.

use crate::atom::Atom;
use crate::notify::{Notifier, RtErrors, SubjectId};
use crate::uri::Urid;
use std::sync::Arc;

/// One worker's view of a cycle.
///
/// The cycle covers absolute frames `[start, end)`. Processing may run on a
/// sub-slice `[start + offset, start + offset + nframes)` when the engine
/// splits a cycle at an event boundary. Context 0 is the root, driven by the
/// audio callback; every other context belongs to a worker thread.
pub struct RunContext {
    id: usize,
    start: u64,
    end: u64,
    offset: u32,
    nframes: u32,
    rate: u32,
    task: Option<usize>,
    realtime: bool,
    notifier: Notifier,
    errors: Arc<RtErrors>,
}

impl RunContext {
    pub fn new(id: usize, rate: u32, notifier: Notifier, errors: Arc<RtErrors>) -> Self {
        Self {
            id,
            start: 0,
            end: 0,
            offset: 0,
            nframes: 0,
            rate,
            task: None,
            realtime: true,
            notifier,
            errors,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Move to a new cycle of `nframes` frames starting at `start`.
    #[inline]
    pub fn locate(&mut self, start: u64, nframes: u32) {
        self.start = start;
        self.end = start + nframes as u64;
        self.offset = 0;
        self.nframes = nframes;
    }

    /// Restrict processing to part of the current cycle.
    #[inline]
    pub fn slice(&mut self, offset: u32, nframes: u32) {
        debug_assert!(self.start + offset as u64 + nframes as u64 <= self.end);
        self.offset = offset;
        self.nframes = nframes;
    }

    #[inline]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn nframes(&self) -> u32 {
        self.nframes
    }

    #[inline]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Absolute frame time of the current slice.
    #[inline]
    pub fn time(&self) -> u64 {
        self.start + self.offset as u64
    }

    /// Length of the whole cycle in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start) as f64 / self.rate as f64
    }

    /// Index of the task this context is running, if any.
    #[inline]
    pub fn task(&self) -> Option<usize> {
        self.task
    }

    #[inline]
    pub fn claim_task(&mut self, task: Option<usize>) {
        self.task = task;
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    /// Offline contexts (freewheeling, tests) may block.
    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = realtime;
    }

    /// Queue a value change for the non-realtime side. Realtime safe.
    #[inline]
    pub fn notify(&mut self, subject: SubjectId, key: Urid, time: u64, value: &Atom) -> bool {
        self.notifier.notify(subject, key, time, value)
    }

    /// Report a problem without logging from the audio thread.
    #[inline]
    pub fn report_error(&self, message: &'static str) {
        self.errors.report(message);
    }

    /// Copy the timing of `other` into this context.
    #[inline]
    pub fn follow(&mut self, other: &CycleTiming) {
        self.start = other.start;
        self.end = other.end;
        self.offset = other.offset;
        self.nframes = other.nframes;
    }

    pub fn timing(&self) -> CycleTiming {
        CycleTiming {
            start: self.start,
            end: self.end,
            offset: self.offset,
            nframes: self.nframes,
        }
    }
}

/// Plain copy of a context's time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTiming {
    pub start: u64,
    pub end: u64,
    pub offset: u32,
    pub nframes: u32,
}
