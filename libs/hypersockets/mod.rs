//! # HyperSockets
//!
//! Reconnecting, authenticated WebSocket channels with room membership.
//!
//! ## Features
//!
//! - **One channel per namespace**: reference-counted leases via [`ConnectionManager`]
//! - **Type-state builder**: URL and room codec are required at compile time
//! - **Backoff with full jitter**: exponential, capped, never retries rejected credentials
//! - **Exactly-once rejoin**: the room registry replays memberships after every reconnect
//! - **Pluggable transport**: tungstenite in production, in-memory for tests

pub mod core;
pub mod manager;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder,
    builder::{states, ChannelBuilder},
    channel::{Channel, ChannelEvent, StateChange, MAX_EARLY_FRAMES},
    config::{default_backoff, ChannelConfig},
    connection_state::{ConnectionState, Metrics},
    memory::MemoryConnector,
    transport::{ConnectRequest, Connector, Transport, TungsteniteConnector},
};

// Re-export manager
pub use manager::{ChannelHandle, ConnectionManager, JoinOutcome, SubscriptionRegistry};
