//! The `Interface` contract and its convenience senders.

use crate::message::{Message, Seq};
use crate::status::Status;
use ensemble_core::{Atom, Context, Path, Properties, Uri};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Anything that can receive [`Message`]s.
///
/// A client implements this to hear responses and broadcasts; the engine
/// hands clients an implementation that feeds the event pipeline. Messages
/// delivered through one interface are processed in the order sent.
pub trait Interface: Send + Sync {
    /// Identity of this endpoint, used as the broadcast registry key.
    fn uri(&self) -> &Uri;

    fn message(&self, msg: Message);

    /// Next request sequence number. Interfaces without a counter send 0,
    /// which suppresses responses.
    fn next_seq(&self) -> Seq {
        0
    }

    /// Where responses to requests sent through this interface go.
    fn respondee(&self) -> Option<Arc<dyn Interface>> {
        None
    }
}

/// Monotonic request counter. Never yields 0.
#[derive(Debug)]
pub struct SequenceCounter {
    next: AtomicI32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(1),
        }
    }

    pub fn next(&self) -> Seq {
        loop {
            let seq = self.next.fetch_add(1, Ordering::Relaxed);
            if seq > 0 {
                return seq;
            }
            // Wrapped: restart at 1.
            let _ = self
                .next
                .compare_exchange(seq.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
        }
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed senders for every request. Each call stamps the next sequence
/// number, dispatches the message, and returns the number used.
pub trait InterfaceExt: Interface {
    fn send(&self, build: impl FnOnce(Seq) -> Message) -> Seq {
        let seq = self.next_seq();
        self.message(build(seq));
        seq
    }

    fn bundle_begin(&self) -> Seq {
        self.send(|seq| Message::BundleBegin { seq })
    }

    fn bundle_end(&self) -> Seq {
        self.send(|seq| Message::BundleEnd { seq })
    }

    fn put(&self, uri: impl Into<Uri>, properties: Properties, ctx: Context) -> Seq {
        let uri = uri.into();
        self.send(|seq| Message::Put {
            seq,
            uri,
            properties,
            ctx,
        })
    }

    fn delta(&self, uri: impl Into<Uri>, remove: Properties, add: Properties, ctx: Context) -> Seq {
        let uri = uri.into();
        self.send(|seq| Message::Delta {
            seq,
            uri,
            remove,
            add,
            ctx,
        })
    }

    fn copy(&self, from: impl Into<Uri>, to: impl Into<Uri>) -> Seq {
        let (from, to) = (from.into(), to.into());
        self.send(|seq| Message::Copy { seq, from, to })
    }

    fn move_object(&self, from: Path, to: Path) -> Seq {
        self.send(|seq| Message::Move { seq, from, to })
    }

    fn del(&self, uri: impl Into<Uri>) -> Seq {
        let uri = uri.into();
        self.send(|seq| Message::Del { seq, uri })
    }

    fn connect(&self, tail: Path, head: Path) -> Seq {
        self.send(|seq| Message::Connect { seq, tail, head })
    }

    fn disconnect(&self, tail: Path, head: Path) -> Seq {
        self.send(|seq| Message::Disconnect { seq, tail, head })
    }

    fn disconnect_all(&self, graph: Path, path: Path) -> Seq {
        self.send(|seq| Message::DisconnectAll { seq, graph, path })
    }

    fn set_property(
        &self,
        subject: impl Into<Uri>,
        key: impl Into<Uri>,
        value: Atom,
        ctx: Context,
    ) -> Seq {
        let (subject, key) = (subject.into(), key.into());
        self.send(|seq| Message::SetProperty {
            seq,
            subject,
            key,
            value,
            ctx,
        })
    }

    fn get(&self, uri: impl Into<Uri>) -> Seq {
        let uri = uri.into();
        self.send(|seq| Message::Get { seq, uri })
    }

    fn undo(&self) -> Seq {
        self.send(|seq| Message::Undo { seq })
    }

    fn redo(&self) -> Seq {
        self.send(|seq| Message::Redo { seq })
    }

    /// Answer request `id`. Responses carry no sequence number of their own.
    fn response(&self, id: Seq, status: Status, subject: impl Into<String>) {
        self.message(Message::Response {
            id,
            status,
            subject: subject.into(),
        });
    }

    fn error(&self, text: impl Into<String>) {
        self.message(Message::Error { text: text.into() });
    }
}

impl<T: Interface + ?Sized> InterfaceExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        uri: Uri,
        seq: SequenceCounter,
        sent: Mutex<Vec<Message>>,
    }

    impl Interface for Recorder {
        fn uri(&self) -> &Uri {
            &self.uri
        }

        fn message(&self, msg: Message) {
            self.sent.lock().push(msg);
        }

        fn next_seq(&self) -> Seq {
            self.seq.next()
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            uri: Uri::from("test:recorder"),
            seq: SequenceCounter::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_counter_skips_zero() {
        let counter = SequenceCounter {
            next: AtomicI32::new(i32::MAX),
        };
        assert_eq!(counter.next(), i32::MAX);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn test_convenience_calls_stamp_sequence() {
        let client = recorder();
        let a = Path::new("/a/out").unwrap();
        let b = Path::new("/b/in").unwrap();

        let first = client.connect(a.clone(), b.clone());
        let second = client.disconnect(a.clone(), b.clone());
        client.response(second, Status::Success, "x");
        let third = client.undo();

        assert_eq!((first, second, third), (1, 2, 3));
        let sent = client.sent.lock();
        assert_eq!(
            sent[0],
            Message::Connect {
                seq: 1,
                tail: a,
                head: b
            }
        );
        assert_eq!(sent[2].seq(), None);
        assert_eq!(sent[3], Message::Undo { seq: 3 });
    }

    #[test]
    fn test_default_seq_is_fire_and_forget() {
        struct Silent(Uri);
        impl Interface for Silent {
            fn uri(&self) -> &Uri {
                &self.0
            }
            fn message(&self, _msg: Message) {}
        }

        let silent = Silent(Uri::from("test:silent"));
        assert_eq!(silent.del("/x"), 0);
        assert!(silent.respondee().is_none());
    }
}
