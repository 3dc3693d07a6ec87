//! Registry of connected WebSocket clients.
//!
//! Connection tasks register a [`ClientHandle`] after a successful upgrade
//! and remove it by [`ClientId`] when they end. The broadcast path only ever
//! sees point-in-time snapshots, so it never holds the registry lock while
//! handing frames to clients.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{mpsc, watch};

/// Frames queued per client before new ones are dropped.
pub const OUTBOUND_QUEUE: usize = 64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one connection, never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Work item for a connection's writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Arc<str>),
    Close,
}

/// Send capability for one client.
///
/// Cloning is cheap; every clone feeds the same connection queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<Outbound>,
}

impl ClientHandle {
    /// Creates a handle with a fresh identity and the receiving end of its
    /// outbound queue.
    pub fn new() -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        (
            Self {
                id: ClientId::next(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queues a text frame without waiting.
    ///
    /// Returns whether the frame was queued. A closed connection or a full
    /// queue drops the frame silently; neither is an error for the caller.
    pub fn send(&self, text: Arc<str>) -> bool {
        match self.tx.try_send(Outbound::Text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(client_id = %self.id, "Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Asks the connection to close, if it can be asked without waiting.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }

    /// Whether the connection is still draining this handle's queue.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Thread-safe set of live clients plus an observable count.
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
    count_tx: watch::Sender<usize>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            clients: RwLock::new(HashMap::new()),
            count_tx,
        }
    }

    /// Inserts a client and returns the new count.
    pub fn add(&self, client: ClientHandle) -> usize {
        let mut clients = self.write();
        let id = client.id();
        clients.insert(id, client);
        let count = clients.len();
        self.count_tx.send_replace(count);
        tracing::info!(client_id = %id, clients = count, "Client registered");
        count
    }

    /// Removes a client and returns the new count.
    ///
    /// Removing an id that is already gone is a no-op.
    pub fn remove(&self, id: ClientId) -> usize {
        let mut clients = self.write();
        if clients.remove(&id).is_some() {
            let count = clients.len();
            self.count_tx.send_replace(count);
            tracing::info!(client_id = %id, clients = count, "Client deregistered");
        }
        clients.len()
    }

    /// Returns every registered client at this instant.
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes every client at once, returning them.
    pub fn drain(&self) -> Vec<ClientHandle> {
        let mut clients = self.write();
        let drained: Vec<_> = clients.drain().map(|(_, client)| client).collect();
        if !drained.is_empty() {
            self.count_tx.send_replace(0);
            tracing::info!(removed = drained.len(), "Registry cleared");
        }
        drained
    }

    /// Subscribes to count changes. The receiver starts at the current count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    // Poisoning is ignored: no map operation here can panic halfway through.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_client_ids_are_unique() {
        let (a, _rx_a) = ClientHandle::new();
        let (b, _rx_b) = ClientHandle::new();
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("client-"));
    }

    #[test]
    fn test_add_remove_count() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = ClientHandle::new();
        let (b, _rx_b) = ClientHandle::new();
        let (a_id, b_id) = (a.id(), b.id());

        assert_eq!(registry.add(a), 1);
        assert_eq!(registry.add(b), 2);
        assert_eq!(registry.count(), 2);

        assert_eq!(registry.remove(a_id), 1);
        // Double removal is tolerated.
        assert_eq!(registry.remove(a_id), 1);
        assert_eq!(registry.remove(b_id), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_reflects_completed_mutations() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = ClientHandle::new();
        let a_id = a.id();

        registry.add(a);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a_id);

        registry.remove(a_id);
        assert!(registry.snapshot().is_empty());
        // The earlier snapshot is unaffected.
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_concurrent_add_remove() {
        let registry = Arc::new(ClientRegistry::new());
        let mut workers = Vec::new();

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            workers.push(thread::spawn(move || {
                let mut receivers = Vec::new();
                let mut kept = Vec::new();
                for i in 0..100 {
                    let (client, rx) = ClientHandle::new();
                    let id = client.id();
                    registry.add(client);
                    receivers.push(rx);
                    let _ = registry.snapshot();
                    if i % 2 == 0 {
                        registry.remove(id);
                    } else {
                        kept.push(id);
                    }
                }
                (kept, receivers)
            }));
        }

        let mut kept = 0;
        for worker in workers {
            let (ids, _receivers) = worker.join().unwrap();
            kept += ids.len();
        }

        assert_eq!(registry.count(), kept);
        assert_eq!(registry.snapshot().len(), registry.count());
        assert_eq!(*registry.subscribe().borrow(), kept);
    }

    #[test]
    fn test_count_subscription() {
        let registry = ClientRegistry::new();
        let mut counts = registry.subscribe();
        assert_eq!(*counts.borrow_and_update(), 0);

        let (a, _rx) = ClientHandle::new();
        let a_id = a.id();
        registry.add(a);
        assert!(counts.has_changed().unwrap());
        assert_eq!(*counts.borrow_and_update(), 1);

        // Removing an unknown id does not notify.
        registry.remove(ClientId(u64::MAX));
        assert!(!counts.has_changed().unwrap());

        registry.remove(a_id);
        assert_eq!(*counts.borrow_and_update(), 0);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (client, rx) = ClientHandle::new();
        assert!(client.is_open());
        drop(rx);
        assert!(!client.is_open());
        assert!(!client.send(Arc::from("{}")));
        client.close();
    }

    #[test]
    fn test_close_is_queued_behind_pending_frames() {
        let (client, mut rx) = ClientHandle::new();
        assert!(client.send(Arc::from("last")));
        client.close();

        assert!(matches!(rx.try_recv(), Ok(Outbound::Text(t)) if &*t == "last"));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let (client, mut rx) = ClientHandle::new();
        for _ in 0..OUTBOUND_QUEUE {
            assert!(client.send(Arc::from("x")));
        }
        assert!(!client.send(Arc::from("overflow")));

        // Order within the queue is preserved.
        assert!(matches!(rx.try_recv(), Ok(Outbound::Text(t)) if &*t == "x"));
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = ClientHandle::new();
        let (b, _rx_b) = ClientHandle::new();
        registry.add(a);
        registry.add(b);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.count(), 0);
        assert_eq!(*registry.subscribe().borrow(), 0);
    }
}
