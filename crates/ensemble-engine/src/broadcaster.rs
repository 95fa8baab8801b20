//! Client registry and fan-out of state changes.

use ensemble_core::Uri;
use ensemble_protocol::{Interface, Message};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered clients, keyed by URI.
#[derive(Default)]
pub struct Broadcaster {
    clients: Mutex<BTreeMap<Uri, Arc<dyn Interface>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client, replacing any previous one with the same URI.
    pub fn register(&self, client: Arc<dyn Interface>) {
        let uri = client.uri().clone();
        tracing::info!(%uri, "client registered");
        self.clients.lock().insert(uri, client);
    }

    pub fn unregister(&self, uri: &Uri) -> bool {
        let removed = self.clients.lock().remove(uri).is_some();
        if removed {
            tracing::info!(%uri, "client unregistered");
        }
        removed
    }

    pub fn num_clients(&self) -> usize {
        self.clients.lock().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Interface>> {
        self.clients.lock().values().cloned().collect()
    }

    pub fn send(&self, msg: &Message) {
        for client in self.snapshot() {
            client.message(msg.clone());
        }
    }

    /// Bracket the messages sent through the guard in a bundle.
    pub fn transfer(&self) -> Transfer {
        let clients = self.snapshot();
        for client in &clients {
            client.message(Message::BundleBegin { seq: 0 });
        }
        Transfer { clients }
    }

    /// Send `msgs`, bundled when there is more than one.
    pub fn send_all(&self, msgs: &[Message]) {
        match msgs {
            [] => {}
            [msg] => self.send(msg),
            _ => {
                let transfer = self.transfer();
                for msg in msgs {
                    transfer.send(msg);
                }
            }
        }
    }
}

/// An open broadcast bundle. Dropping it closes the bundle.
pub struct Transfer {
    clients: Vec<Arc<dyn Interface>>,
}

impl Transfer {
    pub fn send(&self, msg: &Message) {
        for client in &self.clients {
            client.message(msg.clone());
        }
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        for client in &self.clients {
            client.message(Message::BundleEnd { seq: 0 });
        }
    }
}
