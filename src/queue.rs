/*!
Per-client outbound queue.

Any number of producers (broadcasts, the cleanup path, the shutdown
coordinator) push into one [`OutboundQueue`]; exactly one sender task pulls
from the matching [`OutboundReceiver`]. The queue is unbounded, so producers
never wait.
*/
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

/// One item on an outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Payload(Bytes),
    /// Terminates the sender task. Never written to the socket.
    Close,
}

/// Producer side. Cheap to clone; every clone feeds the same consumer.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    // Taken out when `Close` is pushed, so nothing can follow the sentinel.
    tx: Arc<Mutex<Option<flume::Sender<Outbound>>>>,
}

/// Consumer side, owned by the sender task.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: flume::Receiver<Outbound>,
}

pub fn outbound_queue() -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = flume::unbounded();
    let queue = OutboundQueue {
        tx: Arc::new(Mutex::new(Some(tx))),
    };

    (queue, OutboundReceiver { rx })
}

impl OutboundQueue {
    /// Appends `payload`. Returns `false` if the queue was already closed or
    /// its consumer is gone, in which case the payload is dropped.
    pub fn push(&self, payload: Bytes) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(Outbound::Payload(payload)).is_ok(),
            None => false,
        }
    }

    /// Appends the close sentinel. Only the first call has any effect; it
    /// returns `true`, later calls return `false`.
    pub fn close(&self) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // A consumer that already quit does not need the sentinel.
                let _ = tx.send(Outbound::Close);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl OutboundReceiver {
    /// Waits for the next item. If every producer handle has been dropped
    /// the queue can never yield again, which is reported as `Close`.
    pub async fn pull(&self) -> Outbound {
        self.rx.recv_async().await.unwrap_or(Outbound::Close)
    }

    /// Takes the next item if one is already waiting.
    pub fn try_pull(&self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }
}
