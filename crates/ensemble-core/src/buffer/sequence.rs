//! Timestamped event storage for sequence buffers.
//!
//! Events are packed back to back into a fixed byte region:
//! `time: i64 | size: u32 | type: u32 | body (padded to 8 bytes)`.
//! Appending never grows the region.

use crate::atom::{types, Atom};
use crate::uri::Urid;

const EVENT_HEADER: usize = 16;

#[inline]
fn pad8(size: usize) -> usize {
    (size + 7) & !7
}

/// Bytes an event with a `body_size` body occupies in a sequence.
#[inline]
pub const fn event_footprint(body_size: usize) -> usize {
    EVENT_HEADER + ((body_size + 7) & !7)
}

/// One event borrowed from a [`Sequence`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceEvent<'a> {
    /// Frame offset within the cycle.
    pub time: i64,
    pub atom_type: Urid,
    pub body: &'a [u8],
}

impl SequenceEvent<'_> {
    /// Numeric payload, for float/double/int/bool events.
    pub fn as_f32(&self) -> Option<f32> {
        self.to_inline_atom().and_then(|atom| atom.as_f32())
    }

    /// The payload as an inline atom, or `None` if it would need the heap.
    pub fn to_inline_atom(&self) -> Option<Atom> {
        (self.body.len() <= crate::atom::INLINE_CAPACITY)
            .then(|| Atom::from_bytes(self.atom_type, self.body))
    }
}

/// Fixed-capacity event sequence.
#[derive(Clone)]
pub struct Sequence {
    bytes: Box<[u8]>,
    used: usize,
}

impl Sequence {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes currently occupied by events.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.used = 0;
    }

    /// Append an event. Returns false and leaves the sequence untouched if it
    /// does not fit.
    pub fn append(&mut self, time: i64, atom_type: Urid, body: &[u8]) -> bool {
        let footprint = event_footprint(body.len());
        if self.used + footprint > self.bytes.len() || body.len() > u32::MAX as usize {
            return false;
        }
        let at = self.used;
        self.bytes[at..at + 8].copy_from_slice(&time.to_ne_bytes());
        self.bytes[at + 8..at + 12].copy_from_slice(&(body.len() as u32).to_ne_bytes());
        self.bytes[at + 12..at + 16].copy_from_slice(&atom_type.to_ne_bytes());
        let body_at = at + EVENT_HEADER;
        self.bytes[body_at..body_at + body.len()].copy_from_slice(body);
        self.bytes[body_at + body.len()..at + footprint].fill(0);
        self.used += footprint;
        true
    }

    /// Append every event of `other` that fits, in order.
    pub fn append_all(&mut self, other: &Sequence) {
        for event in other.iter() {
            if !self.append(event.time, event.atom_type, event.body) {
                break;
            }
        }
    }

    /// Replace the contents with `other`'s events (truncated to capacity).
    pub fn copy_from(&mut self, other: &Sequence) {
        self.clear();
        if other.used <= self.bytes.len() {
            self.bytes[..other.used].copy_from_slice(&other.bytes[..other.used]);
            self.used = other.used;
        } else {
            self.append_all(other);
        }
    }

    /// Change capacity, keeping the events that still fit. Allocates.
    pub fn resize(&mut self, capacity: usize) {
        let mut resized = Sequence::with_capacity(capacity);
        resized.append_all(self);
        *self = resized;
    }

    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            bytes: &self.bytes[..self.used],
            at: 0,
        }
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct SequenceIter<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Iterator for SequenceIter<'a> {
    type Item = SequenceEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at + EVENT_HEADER > self.bytes.len() {
            return None;
        }
        let header = &self.bytes[self.at..self.at + EVENT_HEADER];
        let mut time = [0u8; 8];
        time.copy_from_slice(&header[..8]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&header[8..12]);
        let mut atom_type = [0u8; 4];
        atom_type.copy_from_slice(&header[12..16]);

        let size = u32::from_ne_bytes(size) as usize;
        let body_at = self.at + EVENT_HEADER;
        let body = self.bytes.get(body_at..body_at + size)?;
        self.at += EVENT_HEADER + pad8(size);
        Some(SequenceEvent {
            time: i64::from_ne_bytes(time),
            atom_type: Urid::from_ne_bytes(atom_type),
            body,
        })
    }
}

/// Whether events of this type carry a value a control input can latch.
pub fn is_value_type(atom_type: Urid) -> bool {
    matches!(
        atom_type,
        types::FLOAT | types::DOUBLE | types::INT | types::LONG | types::BOOL
    )
}
