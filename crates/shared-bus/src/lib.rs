//! # Shared Bus
//!
//! The in-process event bus connecting the sync engine, ledger, and
//! node-runtime observers (SPEC_FULL.md §5 "Event bus"): block-import
//! decisions, chain reorganisations, peer black-listing, and sync progress
//! are published here rather than delivered by direct call, so logging and
//! sync-state persistence can subscribe independently.
//!
//! Grounded on `shared-bus/src/{lib,publisher,subscriber}.rs`, kept close to
//! verbatim — a well-built, domain-agnostic broadcast-channel wrapper needs
//! no rework beyond its payload type. Only `events.rs`'s `BlockchainEvent`
//! enum is rewritten for ETC concepts; the teacher's HMAC/nonce-replay
//! envelope machinery (suited to authenticating messages between separately
//! deployed subsystem processes) is dropped because every producer and
//! consumer of this bus lives in the same process and calls each other's
//! Rust APIs directly — see DESIGN.md.

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{BlockchainEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before backpressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_reasonable() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
