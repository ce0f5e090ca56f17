//! Shared test doubles for the end-to-end scenarios under `tests/`.
//!
//! [`StubPeer`] plays the part of the excluded RLPx transport: sync-engine's
//! drivers talk to it only through [`sync_engine::PeerHandle`], so these
//! scenarios exercise the real peer -> sync-engine -> ledger -> event-bus
//! path with nothing mocked below that port.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use sync_engine::{Message, PeerHandle, SyncError};

/// Replies to `request()` calls with a pre-scripted queue of responses, in
/// order, regardless of what was actually requested — good enough for
/// scenarios that know exactly which message the driver will send next.
pub struct StubPeer {
    id: String,
    responses: Mutex<VecDeque<Result<Message, SyncError>>>,
}

impl StubPeer {
    #[must_use]
    pub fn new(id: &str, responses: Vec<Result<Message, SyncError>>) -> Self {
        Self { id: id.to_string(), responses: Mutex::new(responses.into()) }
    }
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
        self.responses.lock().unwrap().pop_front().unwrap_or(Err(SyncError::PeerTimeout(self.id.clone())))
    }

    fn is_connected(&self) -> bool {
        true
    }
}

pub const SAMPLE_GENESIS_JSON: &str = r#"{
    "coinbase": "0x0000000000000000000000000000000000000000",
    "difficulty": "0x400000",
    "gasLimit": "0x1388",
    "timestamp": "0x00",
    "extraData": "0x",
    "mixHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
    "nonce": "0x0000000000000042",
    "alloc": {
        "1000000000000000000000000000000000000001": { "balance": "5000000000000000000" }
    }
}"#;
