//! # HyperSockets Traits
//!
//! Extension points of the channel transport:
//!
//! - **AuthProvider**: handshake frame and response classification
//! - **HeaderProvider**: upgrade-request headers, recomputed per attempt
//! - **ReconnectionStrategy**: delay between attempts
//! - **RoomCodec**: join/leave frames for a namespace

pub mod auth;
pub mod error;
pub mod frame;
pub mod headers;
pub mod reconnect;
pub mod room;

// Re-export commonly used types
pub use auth::{AuthProvider, AuthVerdict, NoAuth};
pub use error::{HyperSocketError, Result};
pub use frame::{control_frame, WsMessage};
pub use headers::{BearerHeaders, HeaderProvider, Headers, NoHeaders};
pub use reconnect::{ExponentialBackoff, FixedDelay, Jitter, NeverReconnect, ReconnectionStrategy};
pub use room::{RoomCodec, RoomId};
