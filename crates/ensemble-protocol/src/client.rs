//! In-process clients.

use crate::interface::{Interface, SequenceCounter};
use crate::message::{Message, Seq};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use ensemble_core::Uri;
use std::time::Duration;

/// Receiving end of a [`ChannelClient`].
pub type Mailbox = Receiver<Message>;

/// A client whose incoming messages land in a channel.
///
/// Register it with the engine to receive broadcasts, and pass it as the
/// respondee of an engine session to receive responses.
pub struct ChannelClient {
    uri: Uri,
    seq: SequenceCounter,
    tx: Sender<Message>,
}

impl ChannelClient {
    /// Create a client and the receiving end of its mailbox.
    pub fn new(uri: impl Into<Uri>) -> (Self, Mailbox) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                uri: uri.into(),
                seq: SequenceCounter::new(),
                tx,
            },
            rx,
        )
    }
}

impl Interface for ChannelClient {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn message(&self, msg: Message) {
        // A dropped receiver means the client went away.
        let _ = self.tx.send(msg);
    }

    fn next_seq(&self) -> Seq {
        self.seq.next()
    }
}

/// Helpers for reading a client mailbox in tests and tools.
pub trait MailboxExt {
    /// Everything currently queued.
    fn drain(&self) -> Vec<Message>;

    /// The response to request `id`, waiting up to `timeout`.
    fn response_to(&self, id: Seq, timeout: Duration) -> Option<Message>;
}

impl MailboxExt for Mailbox {
    fn drain(&self) -> Vec<Message> {
        let mut out = Vec::new();
        loop {
            match self.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    fn response_to(&self, id: Seq, timeout: Duration) -> Option<Message> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.recv_timeout(left) {
                Ok(msg @ Message::Response { id: got, .. }) if got == id => return Some(msg),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
