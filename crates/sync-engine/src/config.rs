//! Sync engine tuning knobs, matching the "Sync" section of the node's
//! external configuration surface (see SPEC_FULL.md §6) field for field.
//!
//! Grounded on `qc-13-light-client-sync/src/config.rs`'s shape (a plain
//! struct of primitives with a `Default` impl and a `for_testing` helper
//! that shrinks every interval), generalised from a light client's
//! N-of-M-node consensus knobs to a full node's fast-sync/regular-sync
//! knobs named after SPEC_FULL.md §6 directly.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub do_fast_sync: bool,
    pub min_peers_to_choose_target: usize,
    pub target_block_offset: u64,
    pub block_headers_per_request: u64,
    pub block_bodies_per_request: u64,
    pub receipts_per_request: u64,
    pub nodes_per_request: u64,
    pub max_concurrent_requests: usize,
    pub persist_state_interval: Duration,
    pub blacklist_duration: Duration,
    pub peer_response_timeout: Duration,
    pub check_for_new_block_interval: Duration,
    pub block_resolve_depth: u64,
    pub max_queued_block_number_ahead: u64,
    pub max_queued_block_number_behind: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            do_fast_sync: true,
            min_peers_to_choose_target: 3,
            target_block_offset: 128,
            block_headers_per_request: 192,
            block_bodies_per_request: 128,
            receipts_per_request: 128,
            nodes_per_request: 384,
            max_concurrent_requests: 16,
            persist_state_interval: Duration::from_secs(10),
            blacklist_duration: Duration::from_secs(600),
            peer_response_timeout: Duration::from_secs(15),
            check_for_new_block_interval: Duration::from_secs(1),
            block_resolve_depth: 256,
            max_queued_block_number_ahead: 1024,
            max_queued_block_number_behind: 1024,
        }
    }
}

impl SyncConfig {
    /// Shrinks every interval/window down for fast, deterministic tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            min_peers_to_choose_target: 1,
            target_block_offset: 0,
            block_headers_per_request: 8,
            block_bodies_per_request: 8,
            receipts_per_request: 8,
            nodes_per_request: 8,
            max_concurrent_requests: 4,
            persist_state_interval: Duration::from_millis(50),
            blacklist_duration: Duration::from_millis(200),
            peer_response_timeout: Duration::from_millis(200),
            check_for_new_block_interval: Duration::from_millis(20),
            block_resolve_depth: 16,
            max_queued_block_number_ahead: 64,
            max_queued_block_number_behind: 64,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_fast_sync() {
        assert!(SyncConfig::default().do_fast_sync);
    }

    #[test]
    fn testing_config_shrinks_the_response_timeout() {
        let config = SyncConfig::for_testing();
        assert!(config.peer_response_timeout < SyncConfig::default().peer_response_timeout);
    }
}
