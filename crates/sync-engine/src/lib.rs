//! Peer view tracking, the fast-sync pipeline, and the regular-sync state
//! machine that feed [`ledger::Ledger`] from the network.
//!
//! The transport itself — RLPx handshake, discovery, framing over TCP — is
//! out of scope; every driver here is expressed against the abstract
//! [`peer::PeerHandle`] port, and a transport adapter living outside this
//! crate is what a real deployment would plug in to implement it.

pub mod config;
pub mod controller;
pub mod errors;
pub mod fast_sync;
pub mod peer;
pub mod protocol;
pub mod regular_sync;

pub use config::SyncConfig;
pub use controller::{SyncController, SyncPhase};
pub use errors::SyncError;
pub use fast_sync::FastSyncDriver;
pub use peer::{PeerHandle, PeerSet, PeerView};
pub use protocol::{HeaderQuery, Message};
pub use regular_sync::{RegularSyncDriver, RegularSyncState};
