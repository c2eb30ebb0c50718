//! Per-namespace room membership
//!
//! The registry is the single source of truth for which rooms the caller
//! wants to be in. It also tracks, per connection session, which join frames
//! have already been written, so a replay after reconnect sends every
//! membership exactly once and an idempotent join never sends twice.

use crate::traits::RoomId;
use std::time::Instant;

/// Whether a join changed the membership set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyJoined,
}

#[derive(Debug, Clone)]
pub struct RoomMembership {
    pub room: RoomId,
    pub namespace: String,
    pub joined_at: Instant,
    /// Session in which the join frame was written, if any
    sent_in: Option<u64>,
}

impl RoomMembership {
    /// True if the server was told about this room on the given session
    pub fn sent_on(&self, session: u64) -> bool {
        self.sent_in == Some(session)
    }
}

#[derive(Debug)]
pub struct SubscriptionRegistry {
    namespace: String,
    session: u64,
    rooms: Vec<RoomMembership>,
}

impl SubscriptionRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            session: 0,
            rooms: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Identifier of the current connection session
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn join(&mut self, room: RoomId) -> JoinOutcome {
        if self.contains(&room) {
            return JoinOutcome::AlreadyJoined;
        }
        self.rooms.push(RoomMembership {
            room,
            namespace: self.namespace.clone(),
            joined_at: Instant::now(),
            sent_in: None,
        });
        JoinOutcome::Joined
    }

    /// Remove a membership; `None` if the room was not joined
    pub fn leave(&mut self, room: &RoomId) -> Option<RoomMembership> {
        let index = self.rooms.iter().position(|m| &m.room == room)?;
        Some(self.rooms.remove(index))
    }

    pub fn contains(&self, room: &RoomId) -> bool {
        self.rooms.iter().any(|m| &m.room == room)
    }

    /// Memberships in join order
    pub fn rooms(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|m| m.room.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Rooms whose join frame has not been written on the current session,
    /// marked as written. Calling it twice in a row yields nothing the second time.
    pub fn replay(&mut self) -> Vec<RoomId> {
        let session = self.session;
        self.rooms
            .iter_mut()
            .filter(|m| m.sent_in != Some(session))
            .map(|m| {
                m.sent_in = Some(session);
                m.room.clone()
            })
            .collect()
    }

    /// The connection went away: nothing is joined server-side anymore
    pub fn reset_session(&mut self) {
        self.session += 1;
    }

    /// Forget every membership (logout)
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.session += 1;
    }
}
