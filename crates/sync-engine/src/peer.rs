//! The peer-facing port (SPEC_FULL.md §4.8 "Peer view") and the table of
//! connected peers it is tracked through.
//!
//! Grounded on `qc-13-light-client-sync/src/ports/outbound.rs`'s
//! `FullNodeConnection` trait: an async port hiding the transport, with a
//! health check and a stable node identifier. That trait was built for a
//! light client that *trusts* a quorum of full nodes and only ever reads
//! from them; `PeerHandle` instead models a full node's view of one
//! untrusted P2P peer it can both request from and push to, and
//! `PeerSet` replaces the teacher's `LightClientService`'s flat
//! `Vec<Arc<N>>` with a table carrying per-peer chain state and
//! black-listing, since a full node's peer set does not stay fixed for the
//! node's lifetime the way a light client's configured node list does.

use crate::errors::SyncError;
use crate::protocol::Message;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use shared_types::{Hash, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One connected peer, abstracted away from its transport. A real
/// deployment implements this over an RLPx/DEVP2P socket; tests implement
/// it directly in-process.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    fn peer_id(&self) -> &str;

    /// Push a message with no reply expected (gossip, announcements).
    async fn send(&self, message: Message) -> Result<(), SyncError>;

    /// Send a request and await its matching reply, bounded by `timeout`.
    /// `Ok(None)` means the peer replied within the deadline but with an
    /// empty response (e.g. no state nodes for a hash it once advertised).
    async fn request(&self, message: Message, timeout: Duration) -> Result<Message, SyncError>;

    /// Whether the underlying connection is still open. A driver that sees
    /// this flip to `false` mid-request treats it as `PeerTerminated`.
    fn is_connected(&self) -> bool;
}

/// What the sync engine knows about a peer's chain, per SPEC_FULL.md §4.8.
#[derive(Clone, Debug)]
pub struct PeerView {
    pub peer_id: String,
    pub best_hash: Hash,
    pub best_total_difficulty: U256,
    /// Whether this peer has ever been on a fork compatible with ours,
    /// i.e. a `BranchResolution` we requested from it has not come back
    /// `InvalidBranch`.
    pub fork_accepted: bool,
    pub max_block_number_seen: u64,
    /// Set once a `GetNodeData` request for a hash it claimed to have
    /// comes back empty: it is still useful for headers/bodies, but no
    /// longer a fast-sync state-node source.
    pub blockchain_only: bool,
}

impl PeerView {
    #[must_use]
    pub fn new(peer_id: String) -> Self {
        Self {
            peer_id,
            best_hash: [0u8; 32],
            best_total_difficulty: U256::zero(),
            fork_accepted: true,
            max_block_number_seen: 0,
            blockchain_only: false,
        }
    }
}

struct PeerEntry {
    handle: Arc<dyn PeerHandle>,
    view: PeerView,
}

/// The connected-peer table: handshake state, black-listing, and the
/// selection rules the sync drivers need (best peer, median-height peer,
/// random gossip subset).
pub struct PeerSet {
    peers: Mutex<HashMap<String, PeerEntry>>,
    blacklist: Mutex<HashMap<String, Instant>>,
}

impl PeerSet {
    #[must_use]
    pub fn new() -> Self {
        Self { peers: Mutex::new(HashMap::new()), blacklist: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, handle: Arc<dyn PeerHandle>) {
        let peer_id = handle.peer_id().to_string();
        let view = PeerView::new(peer_id.clone());
        self.peers.lock().unwrap().insert(peer_id, PeerEntry { handle, view });
    }

    pub fn remove(&self, peer_id: &str) {
        self.peers.lock().unwrap().remove(peer_id);
    }

    /// Replaces the stored view for a handshaked peer wholesale, e.g. after
    /// a `Status` exchange or a fresh `NewBlockHashes` announcement.
    pub fn update_view(&self, peer_id: &str, view: PeerView) {
        if let Some(entry) = self.peers.lock().unwrap().get_mut(peer_id) {
            entry.view = view;
        }
    }

    pub fn mark_blockchain_only(&self, peer_id: &str) {
        if let Some(entry) = self.peers.lock().unwrap().get_mut(peer_id) {
            entry.view.blockchain_only = true;
        }
    }

    pub fn mark_fork_rejected(&self, peer_id: &str) {
        if let Some(entry) = self.peers.lock().unwrap().get_mut(peer_id) {
            entry.view.fork_accepted = false;
        }
    }

    /// Black-lists a peer for `duration`, dropping its connection. It
    /// reappears as selectable once the duration elapses and it
    /// reconnects and re-handshakes.
    pub fn blacklist(&self, peer_id: &str, duration: Duration) {
        self.remove(peer_id);
        self.blacklist.lock().unwrap().insert(peer_id.to_string(), Instant::now() + duration);
    }

    #[must_use]
    pub fn is_blacklisted(&self, peer_id: &str) -> bool {
        match self.blacklist.lock().unwrap().get(peer_id) {
            Some(expiry) => Instant::now() < *expiry,
            None => false,
        }
    }

    /// Connected, handshaked, non-blockchain-only peers, for request
    /// routing.
    #[must_use]
    pub fn active(&self) -> Vec<(Arc<dyn PeerHandle>, PeerView)> {
        self.peers
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.handle.is_connected())
            .map(|entry| (entry.handle.clone(), entry.view.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The peer whose reported total difficulty is highest, the fast-sync
    /// and regular-sync drivers' default request target.
    #[must_use]
    pub fn best_peer(&self) -> Option<(Arc<dyn PeerHandle>, PeerView)> {
        self.active().into_iter().max_by(|a, b| a.1.best_total_difficulty.cmp(&b.1.best_total_difficulty))
    }

    /// The median `max_block_number_seen` across active peers, the basis
    /// for fast-sync target election (SPEC_FULL.md §4.8: target is elected
    /// as "max-reported-minus-safety-offset from the median-best peer").
    #[must_use]
    pub fn median_best_block_number(&self) -> Option<u64> {
        let mut heights: Vec<u64> = self.active().into_iter().map(|(_, view)| view.max_block_number_seen).collect();
        if heights.is_empty() {
            return None;
        }
        heights.sort_unstable();
        Some(heights[heights.len() / 2])
    }

    /// A random subset of `count` connected peers, used to gossip a freshly
    /// imported block to roughly `sqrt(N)` of the peer set.
    #[must_use]
    pub fn random_subset(&self, count: usize) -> Vec<Arc<dyn PeerHandle>> {
        let mut handles: Vec<Arc<dyn PeerHandle>> = self.active().into_iter().map(|(handle, _)| handle).collect();
        handles.shuffle(&mut rand::thread_rng());
        handles.truncate(count);
        handles
    }

    /// `ceil(sqrt(active peer count))`, the gossip fan-out SPEC_FULL.md §4.8
    /// broadcasts a newly imported top block to.
    #[must_use]
    pub fn gossip_fanout(&self) -> usize {
        (self.len() as f64).sqrt().ceil() as usize
    }
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubPeer {
        id: String,
        connected: AtomicBool,
    }

    #[async_trait]
    impl PeerHandle for StubPeer {
        fn peer_id(&self) -> &str {
            &self.id
        }

        async fn send(&self, _message: Message) -> Result<(), SyncError> {
            Ok(())
        }

        async fn request(&self, _message: Message, _timeout: Duration) -> Result<Message, SyncError> {
            Ok(Message::Pong)
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn stub(id: &str) -> Arc<StubPeer> {
        Arc::new(StubPeer { id: id.to_string(), connected: AtomicBool::new(true) })
    }

    #[test]
    fn best_peer_is_the_highest_total_difficulty() {
        let peers = PeerSet::new();
        peers.insert(stub("a"));
        peers.insert(stub("b"));
        peers.update_view("a", PeerView { best_total_difficulty: U256::from(10u64), ..PeerView::new("a".into()) });
        peers.update_view("b", PeerView { best_total_difficulty: U256::from(99u64), ..PeerView::new("b".into()) });

        let (_, best) = peers.best_peer().unwrap();
        assert_eq!(best.peer_id, "b");
    }

    #[test]
    fn blacklisted_peer_is_removed_and_reported_blacklisted() {
        let peers = PeerSet::new();
        peers.insert(stub("a"));
        peers.blacklist("a", Duration::from_secs(60));
        assert!(peers.is_blacklisted("a"));
        assert_eq!(peers.len(), 0);
    }

    #[test]
    fn median_best_block_number_of_three_peers() {
        let peers = PeerSet::new();
        for (id, height) in [("a", 10u64), ("b", 20), ("c", 30)] {
            peers.insert(stub(id));
            peers.update_view(id, PeerView { max_block_number_seen: height, ..PeerView::new(id.into()) });
        }
        assert_eq!(peers.median_best_block_number(), Some(20));
    }
}
