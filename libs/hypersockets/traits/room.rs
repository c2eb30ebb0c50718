use crate::traits::frame::WsMessage;
use std::fmt;

/// Server-side grouping a client subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Builds the join/leave control frames a namespace understands
pub trait RoomCodec: Send + Sync {
    fn join_frame(&self, room: &RoomId) -> WsMessage;
    fn leave_frame(&self, room: &RoomId) -> WsMessage;
}
