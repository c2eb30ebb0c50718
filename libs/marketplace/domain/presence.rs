//! Online/offline tracking for counterpart users
//!
//! A user is online only while a presence event has been seen within the
//! timeout window. Explicit events always win over what the timeout inferred.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSource {
    Event,
    /// Set by [`PresenceTracker::sweep`] after the timeout elapsed
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub user_id: String,
    pub online: bool,
    pub last_seen_at: Instant,
    pub source: PresenceSource,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    timeout: Duration,
    records: HashMap<String, PresenceRecord>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_TIMEOUT)
    }
}

impl PresenceTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            records: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_online(&mut self, user_id: &str) {
        self.set_online_at(user_id, Instant::now());
    }

    pub fn set_offline(&mut self, user_id: &str) {
        self.set_offline_at(user_id, Instant::now());
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.is_online_at(user_id, Instant::now())
    }

    /// Record an online event; also refreshes the timeout window
    pub fn set_online_at(&mut self, user_id: &str, now: Instant) {
        self.record(user_id, true, now);
    }

    pub fn set_offline_at(&mut self, user_id: &str, now: Instant) {
        self.record(user_id, false, now);
    }

    /// Online and refreshed within the timeout; unknown users read as offline
    pub fn is_online_at(&self, user_id: &str, now: Instant) -> bool {
        self.records
            .get(user_id)
            .map_or(false, |record| record.online && !self.expired(record, now))
    }

    pub fn record_for(&self, user_id: &str) -> Option<&PresenceRecord> {
        self.records.get(user_id)
    }

    /// Mark timed-out users offline and return them
    ///
    /// Records that were already offline for a full timeout are dropped.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.timeout;
        let mut expired = Vec::new();

        let before = self.records.len();
        self.records.retain(|_, record| {
            record.online || now.saturating_duration_since(offline_since(record, timeout)) < timeout
        });
        if self.records.len() < before {
            debug!("[Presence] Pruned {} offline record(s)", before - self.records.len());
        }

        for record in self.records.values_mut() {
            if record.online && now.saturating_duration_since(record.last_seen_at) >= timeout {
                record.online = false;
                record.source = PresenceSource::Inferred;
                expired.push(record.user_id.clone());
            }
        }

        if !expired.is_empty() {
            debug!("[Presence] {} user(s) timed out", expired.len());
        }
        expired.sort();
        expired
    }

    /// Forget everyone; used when the session reconnects
    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn online_users_at(&self, now: Instant) -> Vec<String> {
        let mut users: Vec<String> = self
            .records
            .values()
            .filter(|record| record.online && !self.expired(record, now))
            .map(|record| record.user_id.clone())
            .collect();
        users.sort();
        users
    }

    fn expired(&self, record: &PresenceRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.last_seen_at) >= self.timeout
    }

    fn record(&mut self, user_id: &str, online: bool, now: Instant) {
        self.records.insert(
            user_id.to_string(),
            PresenceRecord {
                user_id: user_id.to_string(),
                online,
                last_seen_at: now,
                source: PresenceSource::Event,
            },
        );
    }
}

/// When the user was last known to go offline
fn offline_since(record: &PresenceRecord, timeout: Duration) -> Instant {
    match record.source {
        PresenceSource::Event => record.last_seen_at,
        PresenceSource::Inferred => record.last_seen_at + timeout,
    }
}
