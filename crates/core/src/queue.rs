//! Bounded FIFO between the producers of upstream audio (the inbound relay and
//! the silence monitor) and the single task that forwards it upstream.
//!
//! Pushing into a full queue waits for space. Audio is never dropped to make
//! room; a slow upstream throttles the client instead.

use crate::frame::AudioFrame;
use tokio::sync::mpsc;

/// One entry waiting to go upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEntry {
    Audio(AudioFrame),
    /// The candidate stopped talking. Forwarded after every entry queued before it.
    StreamEnd,
}

/// The consumer has gone away; nothing pushed now would ever be forwarded.
#[derive(Debug, thiserror::Error)]
#[error("Outbound audio queue is closed")]
pub struct QueueClosed;

/// Creates a queue holding at most `capacity` entries (minimum 1).
pub fn backpressure_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Cloneable producer side.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<QueueEntry>,
}

impl QueueProducer {
    /// Appends `entry`, waiting while the queue is full. Cancel-safe: if the
    /// returned future is dropped the entry was not queued.
    pub async fn push(&self, entry: QueueEntry) -> Result<(), QueueClosed> {
        self.tx.send(entry).await.map_err(|_| QueueClosed)
    }

    /// Entries currently waiting.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Single consumer side.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<QueueEntry>,
}

impl QueueConsumer {
    /// Waits for the next entry. `None` once every producer is gone and the
    /// queue is drained.
    pub async fn pop(&mut self) -> Option<QueueEntry> {
        self.rx.recv().await
    }

    /// Takes the next entry if one is waiting.
    pub fn try_pop(&mut self) -> Option<QueueEntry> {
        self.rx.try_recv().ok()
    }
}
