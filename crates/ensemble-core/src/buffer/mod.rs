//! Typed per-port buffers.
//!
//! A [`Buffer`] holds one of three content kinds: a block of audio samples, a
//! single control value, or a sequence of timestamped events. Every operation
//! here except [`Buffer::resize`] is realtime safe.

pub mod pool;
pub mod sequence;

use crate::atom::{types, Atom};
use crate::uri::Urid;
use sequence::{is_value_type, Sequence, SequenceEvent};

pub use pool::{BufferFactory, BufferRef, PoolKey};

/// Content kind of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    /// Continuous signal, one sample per frame.
    Audio,
    /// One scalar per cycle.
    Control,
    /// Timestamped events.
    Sequence,
}

impl BufferKind {
    /// Atom type id used as the pool key for this kind.
    pub fn value_type(self) -> Urid {
        match self {
            BufferKind::Audio => types::SOUND,
            BufferKind::Control => types::FLOAT,
            BufferKind::Sequence => types::SEQUENCE,
        }
    }
}

#[derive(Clone)]
enum Data {
    Samples(Box<[f32]>),
    Events(Sequence),
}

/// Memory for one port voice.
#[derive(Clone)]
pub struct Buffer {
    kind: BufferKind,
    external: bool,
    data: Data,
    /// Last latched scalar of a sequence buffer.
    value: Option<Atom>,
}

impl Buffer {
    /// Audio buffer of `frames` samples.
    pub fn audio(frames: usize) -> Self {
        Self {
            kind: BufferKind::Audio,
            external: false,
            data: Data::Samples(vec![0.0; frames].into_boxed_slice()),
            value: None,
        }
    }

    pub fn control() -> Self {
        Self {
            kind: BufferKind::Control,
            external: false,
            data: Data::Samples(vec![0.0; 1].into_boxed_slice()),
            value: None,
        }
    }

    /// Event-sequence buffer of `capacity` bytes.
    ///
    /// With `with_value` the buffer also keeps the last value-typed event it
    /// saw, so a control input fed by events holds its value across cycles.
    pub fn sequence(capacity: usize, with_value: bool) -> Self {
        Self {
            kind: BufferKind::Sequence,
            external: false,
            data: Data::Events(Sequence::with_capacity(capacity)),
            value: with_value.then(|| Atom::float(0.0)),
        }
    }

    pub fn with_kind(kind: BufferKind, capacity: usize) -> Self {
        match kind {
            BufferKind::Audio => Self::audio(capacity),
            BufferKind::Control => Self::control(),
            BufferKind::Sequence => Self::sequence(capacity, true),
        }
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[inline]
    pub fn value_type(&self) -> Urid {
        self.kind.value_type()
    }

    /// Samples for signal kinds, bytes for sequences.
    pub fn capacity(&self) -> usize {
        match &self.data {
            Data::Samples(samples) => samples.len(),
            Data::Events(seq) => seq.capacity(),
        }
    }

    /// Whether the contents are provided by the driver rather than the graph.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn set_external(&mut self, external: bool) {
        self.external = external;
    }

    /// Samples of an audio or control buffer; empty for sequences.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        match &self.data {
            Data::Samples(samples) => samples,
            Data::Events(_) => &[],
        }
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        match &mut self.data {
            Data::Samples(samples) => samples,
            Data::Events(_) => &mut [],
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match &self.data {
            Data::Events(seq) => Some(seq),
            Data::Samples(_) => None,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = SequenceEvent<'_>> {
        self.as_sequence().into_iter().flat_map(Sequence::iter)
    }

    /// Reset to the kind's identity: silence, zero, or no events.
    ///
    /// The value buffer of a sequence is kept.
    #[inline]
    pub fn clear(&mut self) {
        match &mut self.data {
            Data::Samples(samples) => samples.fill(0.0),
            Data::Events(seq) => seq.clear(),
        }
    }

    /// Fill `[start, end)` of a signal buffer with `value`.
    pub fn set_block(&mut self, value: f32, start: usize, end: usize) {
        let samples = self.samples_mut();
        let end = end.min(samples.len());
        if start < end {
            samples[start..end].fill(value);
        }
    }

    /// Scalar view of the buffer at frame `offset`.
    pub fn value_at(&self, offset: usize) -> f32 {
        match (&self.data, self.kind) {
            (Data::Samples(samples), BufferKind::Control) => samples[0],
            (Data::Samples(samples), _) => samples.get(offset).copied().unwrap_or(0.0),
            (Data::Events(_), _) => self.value.as_ref().and_then(Atom::as_f32).unwrap_or(0.0),
        }
    }

    /// Latched value of a sequence buffer.
    pub fn value(&self) -> Option<&Atom> {
        self.value.as_ref()
    }

    /// Realtime-safe update of the latched value; false if `value` is not
    /// inline or this buffer has no value buffer.
    pub fn set_value(&mut self, value: &Atom) -> bool {
        match &mut self.value {
            Some(latched) => latched.set_rt(value),
            None => false,
        }
    }

    /// Latch the last value-typed event at or before `end` into the value
    /// buffer.
    pub fn update_value(&mut self, end: i64) {
        let Data::Events(seq) = &self.data else {
            return;
        };
        let Some(latched) = self.value.as_mut() else {
            return;
        };
        let last = seq
            .iter()
            .filter(|ev| ev.time <= end && is_value_type(ev.atom_type))
            .last()
            .and_then(|ev| ev.to_inline_atom());
        if let Some(atom) = last {
            latched.set_rt(&atom);
        }
    }

    /// Append an event to a sequence buffer.
    ///
    /// Returns false, leaving the buffer unmodified, when the event does not
    /// fit or this is not a sequence buffer.
    pub fn append_event(&mut self, time: i64, size: u32, atom_type: Urid, data: &[u8]) -> bool {
        debug_assert_eq!(size as usize, data.len());
        match &mut self.data {
            Data::Events(seq) => seq.append(time, atom_type, &data[..(size as usize).min(data.len())]),
            Data::Samples(_) => false,
        }
    }

    /// Copy `src` into this buffer over `[offset, offset + nframes)`,
    /// converting between kinds where a rule exists and clearing otherwise.
    pub fn copy(&mut self, src: &Buffer, offset: usize, nframes: usize) {
        let end = offset + nframes;
        match (self.kind, src.kind) {
            (BufferKind::Audio, BufferKind::Audio) => {
                let dst = self.samples_mut();
                let end = end.min(dst.len()).min(src.samples().len());
                if offset < end {
                    dst[offset..end].copy_from_slice(&src.samples()[offset..end]);
                }
            }
            (BufferKind::Control, BufferKind::Control | BufferKind::Audio) => {
                self.samples_mut()[0] = src.value_at(offset);
            }
            (BufferKind::Audio, BufferKind::Control) => {
                self.set_block(src.value_at(0), offset, end);
            }
            (BufferKind::Audio, BufferKind::Sequence) => {
                self.render_sequence(src, offset, end);
            }
            (BufferKind::Control, BufferKind::Sequence) => {
                let last = src
                    .events()
                    .filter(|ev| ev.time < end as i64)
                    .filter_map(|ev| ev.as_f32())
                    .last();
                self.samples_mut()[0] = last.unwrap_or_else(|| src.value_at(0));
            }
            (BufferKind::Sequence, BufferKind::Sequence) => {
                if let (Data::Events(dst), Data::Events(from)) = (&mut self.data, &src.data) {
                    dst.copy_from(from);
                }
                if let Some(value) = src.value() {
                    self.set_value(value);
                }
            }
            (BufferKind::Sequence, BufferKind::Control) => {
                self.clear();
                let value = src.value_at(0);
                self.append_event(offset as i64, 4, types::FLOAT, &value.to_ne_bytes());
                self.set_value(&Atom::float(value));
            }
            (BufferKind::Sequence, BufferKind::Audio) => self.clear(),
        }
    }

    /// Hold the sequence's value between events across `[offset, end)`.
    fn render_sequence(&mut self, src: &Buffer, offset: usize, end: usize) {
        let mut current = src.value_at(0);
        let mut cursor = offset;
        let end = end.min(self.capacity());
        for event in src.events() {
            let Some(value) = event.as_f32() else {
                continue;
            };
            let at = (event.time.max(0) as usize).clamp(offset, end);
            self.set_block(current, cursor, at);
            cursor = at;
            current = value;
        }
        self.set_block(current, cursor, end);
    }

    /// Accumulate `src` into this buffer: sum signals, concatenate events.
    pub fn mix(&mut self, src: &Buffer, offset: usize, nframes: usize) {
        match (self.kind, src.kind) {
            (BufferKind::Audio, BufferKind::Audio) => {
                let end = (offset + nframes)
                    .min(self.capacity())
                    .min(src.samples().len());
                let dst = self.samples_mut();
                if offset < end {
                    for (d, s) in dst[offset..end].iter_mut().zip(&src.samples()[offset..end]) {
                        *d += *s;
                    }
                }
            }
            (BufferKind::Control, BufferKind::Control | BufferKind::Audio) => {
                self.samples_mut()[0] += src.value_at(offset);
            }
            (BufferKind::Audio, BufferKind::Control) => {
                let value = src.value_at(0);
                let end = (offset + nframes).min(self.capacity());
                for sample in &mut self.samples_mut()[offset.min(end)..end] {
                    *sample += value;
                }
            }
            (BufferKind::Sequence, BufferKind::Sequence) => {
                if let (Data::Events(dst), Data::Events(from)) = (&mut self.data, &src.data) {
                    dst.append_all(from);
                }
            }
            _ => {}
        }
    }

    /// Maximum absolute sample over `[offset, offset + nframes)`.
    ///
    /// Sequence buffers report the magnitude of their latched value.
    pub fn peak(&self, offset: usize, nframes: usize) -> f32 {
        match self.kind {
            BufferKind::Audio => {
                let samples = self.samples();
                let end = (offset + nframes).min(samples.len());
                samples[offset.min(end)..end]
                    .iter()
                    .fold(0.0f32, |peak, s| peak.max(s.abs()))
            }
            BufferKind::Control | BufferKind::Sequence => self.value_at(0).abs(),
        }
    }

    /// Change capacity. Allocates; never call on the realtime thread.
    pub fn resize(&mut self, capacity: usize) {
        match &mut self.data {
            Data::Samples(samples) if self.kind == BufferKind::Audio => {
                let mut resized = vec![0.0; capacity].into_boxed_slice();
                let n = capacity.min(samples.len());
                resized[..n].copy_from_slice(&samples[..n]);
                *samples = resized;
            }
            Data::Samples(_) => {}
            Data::Events(seq) => seq.resize(capacity),
        }
    }

    /// Return to the freshly-constructed state before recycling.
    pub(crate) fn reset(&mut self) {
        self.clear();
        self.external = false;
        if let Some(value) = self.value.as_mut() {
            value.set_rt(&Atom::float(0.0));
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity())
            .field("external", &self.external)
            .finish()
    }
}
