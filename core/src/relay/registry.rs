//! Identity -> live client connection

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::frame::ClientFrame;

/// Outbound side of one client connection. The socket writer task drains the
/// paired receiver, so sending never waits on the client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a raw text frame. Returns false if the connection is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }

    pub fn send(&self, frame: &ClientFrame) -> bool {
        self.send_text(frame.to_json())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    clients: DashMap<String, ClientHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced handle is only dropped from the map,
    /// its socket stays open.
    pub fn register(&self, identity: &str, handle: ClientHandle) {
        if let Some(previous) = self.clients.insert(identity.to_string(), handle) {
            tracing::debug!("Connection {} for {} replaced", previous.id(), identity);
        }
    }

    pub fn unregister(&self, identity: &str) {
        self.clients.remove(identity);
    }

    /// Remove the mapping only while it still points at `handle`, so a
    /// replaced connection closing late leaves its successor in place.
    pub fn unregister_handle(&self, identity: &str, handle: &ClientHandle) -> bool {
        self.clients
            .remove_if(identity, |_, current| current.id() == handle.id())
            .is_some()
    }

    pub fn resolve(&self, identity: &str) -> Option<ClientHandle> {
        self.clients.get(identity).map(|h| h.clone())
    }

    /// Write a frame to whoever is registered for `identity`. Missing or
    /// closed connections drop the frame.
    pub fn deliver(&self, identity: &str, frame: &ClientFrame) {
        match self.resolve(identity) {
            Some(handle) => {
                if !handle.send(frame) {
                    tracing::debug!("Dropping {:?} frame for {}: connection closed", frame.kind, identity);
                }
            }
            None => {
                tracing::debug!("Dropping {:?} frame for {}: not connected", frame.kind, identity);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
