//! Events that flow across the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::Hash;

/// Coarse-grained topic used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Block import / chain-selection decisions.
    Ledger,
    /// Sync engine progress and state transitions.
    Sync,
    /// Peer scoring and black-listing.
    Peers,
}

/// Events published by the ledger and sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockchainEvent {
    /// A block extended the canonical head.
    BlockImported { hash: Hash, number: u64, total_difficulty: [u8; 32] },

    /// A side branch overtook the canonical chain.
    ChainReorganised {
        old_head: Hash,
        new_head: Hash,
        common_ancestor: Hash,
    },

    /// A block was added to the non-canonical queue (unknown parent).
    BlockEnqueued { hash: Hash, number: u64 },

    /// Block validation or execution rejected a block.
    BlockRejected { hash: Hash, reason: String },

    /// A post-execution state root disagreement was detected.
    StateRootMismatch { hash: Hash, expected: Hash, actual: Hash },

    /// A peer was black-listed for a duration.
    PeerBlacklisted { peer_id: String, reason: String, duration_secs: u64 },

    /// Fast-sync or regular-sync made forward progress.
    SyncProgressed {
        best_downloaded: u64,
        target: Option<u64>,
    },

    /// The regular-sync state machine changed state.
    SyncStateChanged { from: String, to: String },
}

impl BlockchainEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            BlockchainEvent::BlockImported { .. }
            | BlockchainEvent::ChainReorganised { .. }
            | BlockchainEvent::BlockEnqueued { .. }
            | BlockchainEvent::BlockRejected { .. }
            | BlockchainEvent::StateRootMismatch { .. } => EventTopic::Ledger,
            BlockchainEvent::PeerBlacklisted { .. } => EventTopic::Peers,
            BlockchainEvent::SyncProgressed { .. } | BlockchainEvent::SyncStateChanged { .. } => {
                EventTopic::Sync
            }
        }
    }
}

/// A subscription filter: either "all topics" or an explicit allow-list.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    #[must_use]
    pub fn all() -> Self {
        Self { topics: vec![] }
    }

    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    #[must_use]
    pub fn matches(&self, event: &BlockchainEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}
