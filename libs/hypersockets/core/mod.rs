//! # HyperSockets Core
//!
//! Channel configuration, transport and the reconnecting driver.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hypersockets::*;
//!
//! let config = hypersockets::builder("messages")
//!     .url("wss://api.example.com/ws/messages")
//!     .codec(ConversationRooms)
//!     .auth(TokenAuth::new(token))
//!     .heartbeat(Duration::from_secs(25), control_frame("ping", json!({})))
//!     .build()?;
//!
//! let manager = ConnectionManager::new();
//! let channel = manager.connect(config);
//! let mut events = channel.events();
//! channel.join("conversation-1");
//!
//! while let Some(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! ```

pub mod builder;
pub mod channel;
pub mod config;
pub mod connection_state;
pub mod heartbeat;
pub mod memory;
pub mod transport;

// Re-export main types
pub use builder::{states, ChannelBuilder};
pub use channel::{Channel, ChannelEvent, StateChange};
pub use config::{default_backoff, ChannelConfig, DEFAULT_HANDSHAKE_TIMEOUT};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use heartbeat::Heartbeat;
pub use memory::MemoryConnector;
pub use transport::{ConnectRequest, Connector, Transport, TungsteniteConnector};

/// Start building the configuration of a namespace channel
pub fn builder(namespace: impl Into<String>) -> ChannelBuilder<states::NoUrl, states::NoCodec> {
    ChannelBuilder::new(namespace)
}
