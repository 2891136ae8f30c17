/*!
The live set of registered clients and the broadcast router built on it.

Every insert, remove and snapshot goes through the one mutex inside
[`ClientRegistry`]. Enqueueing into outbound queues happens after the lock
is released.
*/
use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::OutboundQueue;

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Hands out process-unique ids in accept order.
    pub fn allocate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub name: String,
    pub queue: OutboundQueue,
    pub peer: SocketAddr,
    /// Cancelling this closes the client's connection from the server side.
    pub closer: CancellationToken,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<AHashMap<ClientId, ClientRecord>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ClientId, record: ClientRecord) {
        if let Some(prev) = self.clients.lock().insert(id, record) {
            warn!(
                client = %id,
                name = %prev.name,
                "client registered twice; replaced previous record"
            );
        }
    }

    /// Removes `id`, returning its record. Absent ids yield `None`, so this
    /// is safe to call from more than one cleanup path.
    pub fn deregister(&self, id: ClientId) -> Option<ClientRecord> {
        self.clients.lock().remove(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Consistent copy of the current members.
    pub fn snapshot(&self) -> Vec<(ClientId, ClientRecord)> {
        self.clients
            .lock()
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    /// Queues `payload` for every registered client except `exclude`.
    /// Returns how many queues accepted it.
    pub fn broadcast(&self, payload: impl Into<Bytes>, exclude: Option<ClientId>) -> usize {
        let payload = payload.into();
        let targets: Vec<OutboundQueue> = {
            let clients = self.clients.lock();
            clients
                .iter()
                .filter(|(id, _)| Some(**id) != exclude)
                .map(|(_, record)| record.queue.clone())
                .collect()
        };

        // A target that left after the snapshot just refuses the push.
        let reached = targets
            .iter()
            .filter(|queue| queue.push(payload.clone()))
            .count();

        debug!(reached, targets = targets.len(), "broadcast");
        reached
    }

    pub fn clear(&self) {
        self.clients.lock().clear();
    }
}
