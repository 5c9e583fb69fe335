//! Event system for the block indexer

use crate::error::{BlockIndexerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Event types that can be emitted by the indexer
#[derive(Debug, Clone, Serialize)]
pub enum IndexerEvent {
    BlockIndexed(BlockIndexedEvent),
    ChainRewound(ChainRewoundEvent),
}

/// A block's ledger entries were committed.
#[derive(Debug, Clone, Serialize)]
pub struct BlockIndexedEvent {
    pub height: u64,
    pub hash: String,
    pub entries: usize,
    /// Distinct addresses touched by the block, sorted.
    pub addresses: Vec<String>,
    pub indexed_at: DateTime<Utc>,
}

/// Entries above `to_height` were discarded after the node's chain diverged.
#[derive(Debug, Clone, Serialize)]
pub struct ChainRewoundEvent {
    pub from_height: u64,
    pub to_height: u64,
    pub entries_removed: u64,
}

/// Event emitter for broadcasting indexer events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<IndexerEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit_block_indexed(&self, event: BlockIndexedEvent) {
        self.emit(IndexerEvent::BlockIndexed(event));
    }

    pub fn emit_chain_rewound(&self, event: ChainRewoundEvent) {
        self.emit(IndexerEvent::ChainRewound(event));
    }

    fn emit(&self, event: IndexerEvent) {
        match self.sender.send(event) {
            Ok(count) => log::debug!("Event sent to {} subscribers", count),
            Err(_) => log::debug!("No active subscribers for event"),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<IndexerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Event subscriber for receiving indexer events
pub struct EventSubscriber {
    receiver: broadcast::Receiver<IndexerEvent>,
}

impl EventSubscriber {
    /// Create a new event subscriber from an emitter
    pub fn new(emitter: &EventEmitter) -> Self {
        Self {
            receiver: emitter.subscribe(),
        }
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Result<IndexerEvent> {
        self.receiver
            .recv()
            .await
            .map_err(|e| BlockIndexerError::EventSystem(e.to_string()))
    }

    /// Try to receive the next event without blocking
    pub fn try_recv(&mut self) -> Result<Option<IndexerEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(e) => Err(BlockIndexerError::EventSystem(e.to_string())),
        }
    }

    /// Consume the subscriber as a stream; lagged receivers yield an error item.
    pub fn into_stream(self) -> BroadcastStream<IndexerEvent> {
        BroadcastStream::new(self.receiver)
    }
}
