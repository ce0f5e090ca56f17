//! The regular-sync state machine (SPEC_FULL.md §4.8): once fast sync has
//! caught the node up to a recent pivot, this is what keeps it caught up —
//! periodically asking the best-positioned peer for anything past the
//! local tip, resolving what comes back against `Ledger::resolve_branch`,
//! and importing it through `Ledger::import_block`.
//!
//! `idle -> awaiting_headers -> awaiting_bodies -> resolving_branch ->
//! idle` is modelled as an explicit enum and each transition is published
//! on the event bus, but one call to [`RegularSyncDriver::check_for_new_block`]
//! drives a poll all the way back to `idle` rather than suspending between
//! stages to await a later message — the fast-sync pipeline is where this
//! crate's actual request concurrency lives (many hashes in flight across
//! many peers); a single best-peer headers-then-bodies check does not need
//! it, and modelling it as a suspended actor would only add bookkeeping
//! with no payoff here. See DESIGN.md.

use crate::errors::SyncError;
use crate::peer::PeerSet;
use crate::config::SyncConfig;
use crate::protocol::{HeaderQuery, Message};
use ledger::{BranchResolution, ImportOutcome, Ledger};
use shared_bus::{BlockchainEvent, EventPublisher};
use shared_types::{Block, BlockHeader};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegularSyncState {
    Idle,
    AwaitingHeaders,
    AwaitingBodies,
    ResolvingBranch,
}

impl RegularSyncState {
    fn label(self) -> &'static str {
        match self {
            RegularSyncState::Idle => "idle",
            RegularSyncState::AwaitingHeaders => "awaiting_headers",
            RegularSyncState::AwaitingBodies => "awaiting_bodies",
            RegularSyncState::ResolvingBranch => "resolving_branch",
        }
    }
}

pub struct RegularSyncDriver {
    ledger: Arc<Mutex<Ledger>>,
    state: RegularSyncState,
    /// Blocks announced while a branch check was in flight, or accepted as
    /// ommer candidates by `resolve_branch`, held for later consideration
    /// rather than imported immediately.
    ommer_pool: Vec<Block>,
}

impl RegularSyncDriver {
    #[must_use]
    pub fn new(ledger: Arc<Mutex<Ledger>>) -> Self {
        Self { ledger, state: RegularSyncState::Idle, ommer_pool: Vec::new() }
    }

    #[must_use]
    pub fn state(&self) -> RegularSyncState {
        self.state
    }

    async fn transition(&mut self, to: RegularSyncState, events: &(impl EventPublisher + ?Sized)) {
        let from = self.state;
        self.state = to;
        events.publish(BlockchainEvent::SyncStateChanged { from: from.label().to_string(), to: to.label().to_string() }).await;
    }

    async fn blacklist(peers: &PeerSet, peer_id: &str, reason: &str, config: &SyncConfig, events: &(impl EventPublisher + ?Sized)) {
        peers.blacklist(peer_id, config.blacklist_duration);
        events
            .publish(BlockchainEvent::PeerBlacklisted {
                peer_id: peer_id.to_string(),
                reason: reason.to_string(),
                duration_secs: config.blacklist_duration.as_secs(),
            })
            .await;
    }

    /// One idle-to-idle poll: ask the best peer ahead of us for headers,
    /// resolve the branch they describe, and if it is better than ours,
    /// pull bodies and import it. A no-op if already mid-cycle or if no
    /// peer is currently ahead.
    pub async fn check_for_new_block(
        &mut self,
        peers: &PeerSet,
        events: &(impl EventPublisher + ?Sized),
        config: &SyncConfig,
    ) -> Result<(), SyncError> {
        if self.state != RegularSyncState::Idle {
            return Ok(());
        }
        let local_td = self.ledger.lock().unwrap().best_total_difficulty();
        let local_number = self.ledger.lock().unwrap().best_number();
        let Some((handle, view)) = peers.best_peer() else {
            return Ok(());
        };
        if view.best_total_difficulty <= local_td {
            return Ok(());
        }

        self.transition(RegularSyncState::AwaitingHeaders, events).await;
        let response = handle
            .request(
                Message::GetBlockHeaders {
                    start: HeaderQuery::Number(local_number + 1),
                    max_headers: config.block_headers_per_request,
                    skip: 0,
                    reverse: false,
                },
                config.peer_response_timeout,
            )
            .await;

        let headers = match response {
            Ok(Message::BlockHeaders(headers)) if !headers.is_empty() => headers,
            Ok(_) => {
                self.transition(RegularSyncState::Idle, events).await;
                return Ok(());
            }
            Err(SyncError::PeerTimeout(peer_id)) => {
                Self::blacklist(peers, &peer_id, "timed out responding to GetBlockHeaders", config, events).await;
                self.transition(RegularSyncState::Idle, events).await;
                return Ok(());
            }
            Err(other) => {
                self.transition(RegularSyncState::Idle, events).await;
                return Err(other);
            }
        };

        self.transition(RegularSyncState::ResolvingBranch, events).await;
        let resolution = self.ledger.lock().unwrap().resolve_branch(&headers);
        match resolution {
            BranchResolution::InvalidBranch => {
                Self::blacklist(peers, &view.peer_id, "offered an invalid branch", config, events).await;
                self.transition(RegularSyncState::Idle, events).await;
                return Ok(());
            }
            BranchResolution::NoChainSwitch => {
                self.transition(RegularSyncState::Idle, events).await;
                return Ok(());
            }
            BranchResolution::UnknownBranch => {
                let resolved = self.walk_back_for_common_ancestor(&handle, &headers, peers, &view.peer_id, config, events).await?;
                if !resolved {
                    self.transition(RegularSyncState::Idle, events).await;
                    return Ok(());
                }
            }
            BranchResolution::NewBetterBranch { .. } => {}
        }

        self.transition(RegularSyncState::AwaitingBodies, events).await;
        let hashes: Vec<_> = headers.iter().map(BlockHeader::hash).collect();
        let bodies_response =
            handle.request(Message::GetBlockBodies(hashes), config.peer_response_timeout).await;
        let bodies = match bodies_response {
            Ok(Message::BlockBodies(bodies)) => bodies,
            Ok(_) => {
                self.transition(RegularSyncState::Idle, events).await;
                return Err(SyncError::Protocol("expected BlockBodies".into()));
            }
            Err(SyncError::PeerTimeout(peer_id)) | Err(SyncError::PeerTerminated(peer_id)) => {
                Self::blacklist(peers, &peer_id, "timed out responding to GetBlockBodies", config, events).await;
                self.transition(RegularSyncState::Idle, events).await;
                return Ok(());
            }
            Err(other) => {
                self.transition(RegularSyncState::Idle, events).await;
                return Err(other);
            }
        };

        for block in bodies {
            self.import(block, &view.peer_id, peers, config, events).await;
        }
        self.transition(RegularSyncState::Idle, events).await;
        Ok(())
    }

    /// `UnknownBranch` means the batch's root does not chain off anything
    /// we hold; walk further back from the peer, capped at
    /// `block_resolve_depth` requests, looking for a common ancestor.
    async fn walk_back_for_common_ancestor(
        &mut self,
        handle: &Arc<dyn crate::peer::PeerHandle>,
        first_batch: &[BlockHeader],
        peers: &PeerSet,
        peer_id: &str,
        config: &SyncConfig,
        events: &(impl EventPublisher + ?Sized),
    ) -> Result<bool, SyncError> {
        let Some(oldest) = first_batch.first() else {
            return Ok(false);
        };
        let mut cursor = oldest.number;
        for _ in 0..config.block_resolve_depth {
            if cursor == 0 {
                break;
            }
            cursor = cursor.saturating_sub(config.block_headers_per_request);
            let response = handle
                .request(
                    Message::GetBlockHeaders { start: HeaderQuery::Number(cursor), max_headers: 1, skip: 0, reverse: false },
                    config.peer_response_timeout,
                )
                .await?;
            let Message::BlockHeaders(headers) = response else {
                return Err(SyncError::Protocol("expected BlockHeaders".into()));
            };
            let Some(candidate) = headers.into_iter().next() else {
                break;
            };
            if self.ledger.lock().unwrap().header_by_hash(&candidate.hash())?.is_some() {
                return Ok(true);
            }
        }
        Self::blacklist(peers, peer_id, "no common ancestor found within the resolve depth", config, events).await;
        Ok(false)
    }

    async fn import(&mut self, block: Block, peer_id: &str, peers: &PeerSet, config: &SyncConfig, events: &(impl EventPublisher + ?Sized)) {
        let outcome = self.ledger.lock().unwrap().import_block(block.clone());
        match outcome {
            ImportOutcome::ImportedToTop(total_difficulty) => {
                let mut td_bytes = [0u8; 32];
                total_difficulty.to_big_endian(&mut td_bytes);
                events
                    .publish(BlockchainEvent::BlockImported {
                        hash: block.hash(),
                        number: block.header.number,
                        total_difficulty: td_bytes,
                    })
                    .await;
                self.gossip_imported_block(&block, total_difficulty, peers);
            }
            ImportOutcome::ChainReorganised { old_branch, new_branch } => {
                let old_head = old_branch.last().map(BlockHeader::hash).unwrap_or([0u8; 32]);
                let new_head = new_branch.last().map(BlockHeader::hash).unwrap_or([0u8; 32]);
                events
                    .publish(BlockchainEvent::ChainReorganised { old_head, new_head, common_ancestor: block.header.parent_hash })
                    .await;
            }
            ImportOutcome::Enqueued => {
                events.publish(BlockchainEvent::BlockEnqueued { hash: block.hash(), number: block.header.number }).await;
            }
            ImportOutcome::Duplicate => {}
            ImportOutcome::ImportFailed(error) => {
                Self::blacklist(peers, peer_id, &format!("import failed: {error}"), config, events).await;
                events.publish(BlockchainEvent::BlockRejected { hash: block.hash(), reason: error.to_string() }).await;
            }
        }
    }

    fn gossip_imported_block(&self, block: &Block, total_difficulty: shared_types::U256, peers: &PeerSet) {
        let fanout = peers.gossip_fanout();
        let mut td_bytes = [0u8; 32];
        total_difficulty.to_big_endian(&mut td_bytes);
        for handle in peers.random_subset(fanout) {
            let handle = handle.clone();
            let message = Message::NewBlock { block: block.clone(), total_difficulty };
            tokio::spawn(async move {
                let _ = handle.send(message).await;
            });
        }
        for (handle, _) in peers.active() {
            let message = Message::NewBlockHashes(vec![(block.hash(), block.header.number)]);
            tokio::spawn(async move {
                let _ = handle.send(message).await;
            });
        }
    }

    /// A block announced out of band (`NewBlock`/new-block gossip): if the
    /// engine is idle, import it directly; otherwise it waits in the ommer
    /// pool until the current cycle settles (SPEC_FULL.md §4.8's new-block
    /// gossip rule).
    pub async fn on_new_block_announced(&mut self, block: Block, peer_id: &str, peers: &PeerSet, config: &SyncConfig, events: &(impl EventPublisher + ?Sized)) {
        if self.state == RegularSyncState::Idle {
            self.import(block, peer_id, peers, config, events).await;
        } else {
            self.ommer_pool.push(block);
        }
    }

    #[must_use]
    pub fn ommer_pool_len(&self) -> usize {
        self.ommer_pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_match_the_spec_vocabulary() {
        assert_eq!(RegularSyncState::Idle.label(), "idle");
        assert_eq!(RegularSyncState::AwaitingHeaders.label(), "awaiting_headers");
        assert_eq!(RegularSyncState::AwaitingBodies.label(), "awaiting_bodies");
        assert_eq!(RegularSyncState::ResolvingBranch.label(), "resolving_branch");
    }
}
