//! Live subscriber connections.
//!
//! A [`Connection`] is the broker's sending half: a bounded outbound channel
//! plus a one-shot disconnect signal. The matching [`Inbox`] is owned by the
//! task serving the subscriber's stream; dropping it fires the signal and
//! removes the connection from the registry it was registered with.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use stampede_core::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Identifier of a connection, unique among live connections.
pub type ConnectionId = u64;

/// Result of a non-blocking send to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message now sits in the connection's outbound buffer.
    Delivered,
    /// The outbound buffer is full; nothing was sent.
    WouldBlock,
    /// The subscriber went away; nothing was sent.
    Disconnected,
}

/// Broker-side handle of one subscriber connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Message>,
    disconnected: watch::Receiver<bool>,
}

impl Connection {
    /// Create an unregistered connection whose outbound buffer holds
    /// `capacity` messages (at least one).
    pub fn pair(id: ConnectionId, capacity: usize) -> (Connection, Inbox) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        let (disconnect, disconnected) = watch::channel(false);

        let connection = Connection {
            id,
            outbound,
            disconnected,
        };
        let inbox = Inbox {
            id,
            receiver,
            disconnect,
            registry: None,
        };
        (connection, inbox)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the disconnect signal fired or the inbox is gone.
    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.borrow() || self.outbound.is_closed()
    }

    /// Attempt to hand `msg` to the subscriber without waiting.
    pub fn try_deliver(&self, msg: &Message) -> SendOutcome {
        if self.is_disconnected() {
            return SendOutcome::Disconnected;
        }

        match self.outbound.try_send(msg.clone()) {
            Ok(()) => SendOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::WouldBlock,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Disconnected,
        }
    }
}

/// Stream-side half of a connection.
pub struct Inbox {
    id: ConnectionId,
    receiver: mpsc::Receiver<Message>,
    disconnect: watch::Sender<bool>,
    registry: Option<SubscriberRegistry>,
}

impl Inbox {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Wait for the next dispatched message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Take a message that is already buffered, if any.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        let _ = self.disconnect.send(true);
        if let Some(registry) = self.registry.take() {
            registry.remove(self.id);
        }
    }
}

struct RegistryInner {
    connections: Mutex<Vec<Arc<Connection>>>,
    next_id: AtomicU64,
}

/// The broker's view of currently connected subscribers.
///
/// Cheap to clone; clones share the same connection list.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Open a new connection with an outbound buffer of `capacity` and add it.
    ///
    /// The returned inbox removes the connection when dropped.
    pub fn register(&self, capacity: usize) -> Inbox {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (connection, mut inbox) = Connection::pair(id, capacity);
        inbox.registry = Some(self.clone());
        self.add(connection);
        inbox
    }

    /// Add a connection. A connection whose id is already present is ignored.
    pub fn add(&self, connection: Connection) {
        let mut connections = self.inner.connections.lock();
        if connections.iter().any(|c| c.id == connection.id) {
            debug!(connection_id = connection.id, "Connection already registered");
            return;
        }
        info!(connection_id = connection.id, "Added subscriber connection");
        connections.push(Arc::new(connection));
    }

    /// Remove a connection by id. Returns whether it was present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.inner.connections.lock();
        let before = connections.len();
        connections.retain(|c| c.id != id);
        let removed = connections.len() != before;
        if removed {
            info!(connection_id = id, "Removed subscriber connection");
        }
        removed
    }

    /// Pick one live connection uniformly at random.
    pub fn pick_random(&self) -> Option<Arc<Connection>> {
        let connections = self.inner.connections.lock();
        connections.choose(&mut rand::thread_rng()).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.connections.lock().iter().any(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
