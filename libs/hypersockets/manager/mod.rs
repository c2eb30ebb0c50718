//! # HyperSockets Manager
//!
//! Reference-counted ownership of namespace channels and the per-namespace
//! room registry.

pub mod manager;
pub mod registry;

pub use manager::{ChannelHandle, ConnectionManager};
pub use registry::{JoinOutcome, RoomMembership, SubscriptionRegistry};
