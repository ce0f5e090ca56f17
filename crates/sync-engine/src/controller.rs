//! Ties the peer table, the ledger, and the two sync drivers together into
//! the thing `node-runtime` actually owns and ticks: elect peers, run fast
//! sync to completion against the chosen pivot, then fall into the
//! regular-sync poll loop for as long as the node is running.
//!
//! Grounded on `qc-13-light-client-sync/src/application/service.rs`'s
//! top-level `LightClientService` (owns the connection set and the polling
//! loop, reports progress over a channel) generalised to own a writable
//! `Ledger` and publish over `shared-bus` instead of a light client's
//! read-only proof stream.

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::fast_sync::FastSyncDriver;
use crate::peer::{PeerHandle, PeerSet, PeerView};
use crate::protocol::Message;
use crate::regular_sync::RegularSyncDriver;
use kv_store::KeyValueStore;
use ledger::Ledger;
use shared_bus::EventPublisher;
use shared_types::{Block, Hash};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex as AsyncMutex;

/// Coarse phase the controller reports to callers (`node-runtime`'s status
/// surface, logging) — distinct from `RegularSyncState`, which only exists
/// once fast sync is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    FastSync,
    Regular,
}

pub struct SyncController {
    peers: Arc<PeerSet>,
    ledger: Arc<StdMutex<Ledger>>,
    fast_sync: StdMutex<Option<FastSyncDriver>>,
    regular_sync: AsyncMutex<RegularSyncDriver>,
    events: Arc<dyn EventPublisher>,
    config: SyncConfig,
}

impl SyncController {
    /// `fast_sync` is `None` from the start when `config.do_fast_sync` is
    /// false: the controller goes straight to regular sync from whatever
    /// the ledger already holds (typically genesis, for a fresh node that
    /// opted out of catching up via fast sync).
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        genesis_hash: Hash,
        ledger: Arc<StdMutex<Ledger>>,
        events: Arc<dyn EventPublisher>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let fast_sync = if config.do_fast_sync { Some(FastSyncDriver::open(store, genesis_hash)?) } else { None };
        Ok(Self {
            peers: Arc::new(PeerSet::new()),
            regular_sync: AsyncMutex::new(RegularSyncDriver::new(ledger.clone())),
            ledger,
            fast_sync: StdMutex::new(fast_sync),
            events,
            config,
        })
    }

    #[must_use]
    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    pub fn add_peer(&self, handle: Arc<dyn PeerHandle>) {
        self.peers.insert(handle);
    }

    pub fn remove_peer(&self, peer_id: &str) {
        self.peers.remove(peer_id);
    }

    pub fn update_peer_view(&self, peer_id: &str, view: PeerView) {
        self.peers.update_view(peer_id, view);
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        match &*self.fast_sync.lock().unwrap() {
            Some(driver) if !driver.is_complete() => SyncPhase::FastSync,
            _ => SyncPhase::Regular,
        }
    }

    /// A peer pushed or replied with a block outside of a headers/bodies
    /// exchange the controller itself started (`NewBlock` gossip).
    pub async fn on_new_block_announced(&self, block: Block, peer_id: &str) {
        if self.phase() == SyncPhase::FastSync {
            return;
        }
        self.regular_sync.lock().await.on_new_block_announced(block, peer_id, &self.peers, &self.config, &*self.events).await;
    }

    /// One step of whichever phase the controller is in. `node-runtime`
    /// calls this from a timer loop; each call either advances fast sync by
    /// one batch or, once fast sync is done (or was never enabled), runs
    /// one regular-sync poll.
    pub async fn tick(&self) -> Result<(), SyncError> {
        let needs_fast_sync = matches!(&*self.fast_sync.lock().unwrap(), Some(driver) if !driver.is_complete());
        if needs_fast_sync {
            return self.drive_fast_sync().await;
        }
        self.regular_sync.lock().await.check_for_new_block(&self.peers, &*self.events, &self.config).await
    }

    async fn drive_fast_sync(&self) -> Result<(), SyncError> {
        // The driver itself cannot be `async`-locked across an `.await`
        // with a `std::sync::Mutex` guard held, so each stage takes and
        // returns the driver through a short, non-awaiting critical
        // section on either side of the actual network call.
        let mut driver = self.fast_sync.lock().unwrap().take().expect("drive_fast_sync only called while Some");
        let result = self.drive_fast_sync_stage(&mut driver).await;
        *self.fast_sync.lock().unwrap() = Some(driver);
        result
    }

    async fn drive_fast_sync_stage(&self, driver: &mut FastSyncDriver) -> Result<(), SyncError> {
        if driver.target().is_none() {
            return driver.elect_target(&self.peers, &self.config).await;
        }
        let headers_done = driver.download_header_batch(&self.peers, &self.config, &*self.events).await?;
        if !headers_done {
            return Ok(());
        }
        driver.download_content_batch(&self.peers, &self.config, &*self.events).await?;
        driver.download_state_node_batch(&self.peers, &self.config, &*self.events).await
    }

    /// Broadcasts a `Status` handshake payload built from the ledger's
    /// current head, for a transport adapter to send right after a peer
    /// connects.
    #[must_use]
    pub fn status_message(&self, protocol_version: u64, network_id: u64, genesis_hash: Hash) -> Message {
        let ledger = self.ledger.lock().unwrap();
        Message::Status {
            protocol_version,
            network_id,
            total_difficulty: ledger.best_total_difficulty(),
            best_hash: ledger.best_hash(),
            genesis_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKVStore;
    use ledger::BlockchainConfig;
    use shared_bus::InMemoryEventBus;
    use shared_types::{BlockHeader, U256};

    fn genesis() -> shared_types::Block {
        let header = BlockHeader {
            parent_hash: [0u8; 32],
            ommers_hash: ledger::validation::compute_ommers_hash(&[]),
            beneficiary: [0u8; 20],
            state_root: [0u8; 32],
            transactions_root: ledger::validation::compute_transactions_root(&[]).unwrap(),
            receipts_root: ledger::validation::compute_receipts_root(&[]).unwrap(),
            logs_bloom: [0u8; 256],
            difficulty: U256::from(1u64),
            number: 0,
            gas_limit: 8_000_000,
            gas_used: 0,
            timestamp: 0,
            extra_data: vec![],
            mix_hash: [0u8; 32],
            nonce: [0u8; 8],
        };
        shared_types::Block { header, transactions: vec![], ommers: vec![] }
    }

    #[tokio::test]
    async fn phase_is_regular_when_fast_sync_is_disabled() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let genesis_block = genesis();
        let ledger =
            Arc::new(StdMutex::new(Ledger::new(store.clone(), BlockchainConfig::etc_mainnet(), genesis_block.clone(), 64, 64).unwrap()));
        let events = Arc::new(InMemoryEventBus::new());
        let mut config = SyncConfig::for_testing();
        config.do_fast_sync = false;
        let controller = SyncController::new(store, genesis_block.hash(), ledger, events, config).unwrap();
        assert_eq!(controller.phase(), SyncPhase::Regular);
    }

    #[tokio::test]
    async fn tick_with_no_peers_is_a_harmless_noop() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let genesis_block = genesis();
        let ledger =
            Arc::new(StdMutex::new(Ledger::new(store.clone(), BlockchainConfig::etc_mainnet(), genesis_block.clone(), 64, 64).unwrap()));
        let events = Arc::new(InMemoryEventBus::new());
        let mut config = SyncConfig::for_testing();
        config.do_fast_sync = false;
        let controller = SyncController::new(store, genesis_block.hash(), ledger, events, config).unwrap();
        controller.tick().await.unwrap();
    }
}
