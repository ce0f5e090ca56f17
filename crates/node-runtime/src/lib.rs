//! Configuration, genesis loading, and the wiring that turns a
//! [`config::NodeConfig`] into a running node: opens the storage backend,
//! constructs block 0, and owns the [`sync_engine::SyncController`] loop.
//!
//! The peer-facing transport (RLPx handshake, discovery, framing) is out of
//! scope here too — `runtime::NodeRuntime` drives `SyncController::tick`
//! against whatever peers a transport adapter has registered through
//! `SyncController::add_peer`, but this crate never implements that
//! adapter itself.

pub mod config;
pub mod errors;
pub mod genesis;
pub mod runtime;

pub use config::NodeConfig;
pub use errors::NodeError;
pub use runtime::NodeRuntime;
