//! Realtime to non-realtime notification channel.
//!
//! Each run context owns a [`Notifier`], the producing half of a bounded SPSC
//! ring. The post-processor owns the matching [`NotificationReader`]s through
//! a [`NotificationHub`] and drains them once per cycle.
//!
//! # Back-pressure
//!
//! A full ring rejects the new record: [`Notifier::notify`] returns false and
//! the queued records are untouched. Graph correctness never depends on
//! delivery, only monitoring fidelity does.

use crate::atom::Atom;
use crate::uri::Urid;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Stable identity of a notification subject (a port).
pub type SubjectId = u64;

/// Fixed-format notification record.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject: SubjectId,
    pub key: Urid,
    /// Absolute frame time.
    pub time: u64,
    /// Always inline.
    pub value: Atom,
}

/// Producer half, used on the realtime thread.
pub struct Notifier {
    producer: HeapProd<Notification>,
}

impl Notifier {
    /// Queue a record. Realtime safe.
    ///
    /// Returns false if the ring is full or `value` is not inline-sized
    /// (copying it would allocate).
    #[inline]
    pub fn notify(&mut self, subject: SubjectId, key: Urid, time: u64, value: &Atom) -> bool {
        if self.producer.is_full() {
            return false;
        }
        let mut copy = Atom::default();
        if !copy.set_rt(value) {
            return false;
        }
        self.producer
            .try_push(Notification {
                subject,
                key,
                time,
                value: copy,
            })
            .is_ok()
    }

    pub fn pending(&self) -> usize {
        self.producer.occupied_len()
    }
}

/// Consumer half, used off the realtime thread.
pub struct NotificationReader {
    consumer: HeapCons<Notification>,
}

impl NotificationReader {
    /// Pop records stamped before `end`, in order.
    pub fn drain_until(&mut self, end: u64, mut f: impl FnMut(Notification)) -> usize {
        let mut count = 0;
        while self
            .consumer
            .try_peek()
            .is_some_and(|note| note.time < end)
        {
            match self.consumer.try_pop() {
                Some(note) => {
                    f(note);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }
}

/// Create a notification ring holding `capacity` records.
pub fn notification_channel(capacity: usize) -> (Notifier, NotificationReader) {
    let (producer, consumer) = HeapRb::new(capacity.max(1)).split();
    (Notifier { producer }, NotificationReader { consumer })
}

/// Aggregates the readers of every run context.
#[derive(Default)]
pub struct NotificationHub {
    readers: Mutex<Vec<NotificationReader>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reader(&self, reader: NotificationReader) {
        self.readers.lock().push(reader);
    }

    /// Drain every reader up to `end`. Order is preserved per context only.
    pub fn drain_until(&self, end: u64, mut f: impl FnMut(Notification)) -> usize {
        let mut readers = self.readers.lock();
        readers
            .iter_mut()
            .map(|reader| reader.drain_until(end, &mut f))
            .sum()
    }

    pub fn pending(&self) -> usize {
        self.readers.lock().iter().map(NotificationReader::pending).sum()
    }
}

/// Realtime error channel.
///
/// Code on the audio thread cannot log, so it pushes static messages here;
/// the post-processor drains and logs them. Full queue drops the message and
/// counts it.
pub struct RtErrors {
    queue: ArrayQueue<&'static str>,
    dropped: std::sync::atomic::AtomicUsize,
}

impl RtErrors {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn report(&self, message: &'static str) {
        if self.queue.push(message).is_err() {
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    /// Log everything queued so far with `tracing::error!`.
    pub fn flush(&self) -> usize {
        let mut count = 0;
        while let Some(message) = self.queue.pop() {
            tracing::error!(target: "ensemble::rt", "{message}");
            count += 1;
        }
        let dropped = self.dropped.swap(0, std::sync::atomic::Ordering::Relaxed);
        if dropped > 0 {
            tracing::error!(target: "ensemble::rt", dropped, "realtime errors lost");
        }
        count
    }
}

impl Default for RtErrors {
    fn default() -> Self {
        Self::new(256)
    }
}
