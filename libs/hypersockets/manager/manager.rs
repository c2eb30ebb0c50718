use crate::core::channel::{Channel, StateChange};
use crate::core::config::ChannelConfig;
use crate::core::connection_state::ConnectionState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};

const STATE_CHANGE_CAPACITY: usize = 256;

struct Slot {
    channel: Arc<Channel>,
    leases: usize,
}

struct ManagerInner {
    channels: RwLock<HashMap<String, Slot>>,
    state_changes: broadcast::Sender<StateChange>,
}

/// Owner of one physical channel per namespace
///
/// Every `connect` for a namespace returns a [`ChannelHandle`] lease on the
/// same channel; the channel closes when the last lease is dropped.
///
/// # Example
/// ```ignore
/// let manager = ConnectionManager::new();
/// let config = hypersockets::builder("messages")
///     .url("wss://api.example.com/ws/messages")
///     .codec(ConversationRooms)
///     .build()?;
///
/// let a = manager.connect(config.clone());
/// let b = manager.connect(config);        // same channel, 2 leases
/// drop(a);                                // still open
/// drop(b);                                // closed
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state_changes, _) = broadcast::channel(STATE_CHANGE_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                channels: RwLock::new(HashMap::new()),
                state_changes,
            }),
        }
    }

    /// Acquire a lease on the namespace's channel, opening it if needed
    ///
    /// If a previous driver stopped on an auth rejection (or exhausted its
    /// retries), it is restarted with `config`, so passing fresh credentials
    /// here is how a rejected channel recovers. Memberships survive the restart.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, config: ChannelConfig) -> ChannelHandle {
        let namespace = config.namespace().to_string();
        let mut channels = self.inner.channels.write();

        let channel = match channels.get_mut(&namespace) {
            Some(slot) => {
                if slot.channel.is_terminated() {
                    slot.channel.restart(config);
                }
                slot.leases += 1;
                debug!(
                    "[ConnectionManager] '{}' now has {} lease(s)",
                    namespace, slot.leases
                );
                Arc::clone(&slot.channel)
            }
            None => {
                info!("[ConnectionManager] Opening channel '{}'", namespace);
                let channel = Channel::spawn(config, self.inner.state_changes.clone());
                channels.insert(
                    namespace,
                    Slot {
                        channel: Arc::clone(&channel),
                        leases: 1,
                    },
                );
                channel
            }
        };

        ChannelHandle {
            channel,
            manager: Arc::downgrade(&self.inner),
        }
    }

    /// Tear down a namespace regardless of outstanding leases (logout)
    ///
    /// Memberships are forgotten. Outstanding handles keep pointing at the
    /// closed channel; a later `connect` opens a fresh one.
    pub async fn disconnect(&self, namespace: &str) -> bool {
        let slot = self.inner.channels.write().remove(namespace);
        match slot {
            Some(slot) => {
                info!(
                    "[ConnectionManager] Disconnecting '{}' ({} lease(s) outstanding)",
                    namespace, slot.leases
                );
                slot.channel.clear_rooms();
                slot.channel.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Tear down every channel
    pub async fn shutdown(&self) {
        let slots: Vec<Slot> = self
            .inner
            .channels
            .write()
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        info!("[ConnectionManager] Shutting down {} channel(s)", slots.len());
        for slot in slots {
            slot.channel.shutdown().await;
        }
    }

    /// Receive every state transition of every channel
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.inner.state_changes.subscribe()
    }

    pub fn lease_count(&self, namespace: &str) -> usize {
        self.inner
            .channels
            .read()
            .get(namespace)
            .map_or(0, |slot| slot.leases)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.inner.channels.read().keys().cloned().collect()
    }

    pub fn connection_state(&self, namespace: &str) -> Option<ConnectionState> {
        self.inner
            .channels
            .read()
            .get(namespace)
            .map(|slot| slot.channel.connection_state())
    }

    pub fn get_all_states(&self) -> HashMap<String, ConnectionState> {
        self.inner
            .channels
            .read()
            .iter()
            .map(|(namespace, slot)| (namespace.clone(), slot.channel.connection_state()))
            .collect()
    }

    /// Namespaces that are currently not open
    pub fn halted_namespaces(&self) -> Vec<String> {
        self.inner
            .channels
            .read()
            .iter()
            .filter(|(_, slot)| !slot.channel.is_connected())
            .map(|(namespace, _)| namespace.clone())
            .collect()
    }

    /// Namespaces whose driver gave up (auth rejection, retries exhausted)
    pub fn terminated_namespaces(&self) -> Vec<String> {
        self.inner
            .channels
            .read()
            .iter()
            .filter(|(_, slot)| slot.channel.is_terminated())
            .map(|(namespace, _)| namespace.clone())
            .collect()
    }

    pub fn is_halted(&self) -> bool {
        !self.halted_namespaces().is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A lease on a namespace channel
///
/// Cloning takes another lease; dropping releases one.
pub struct ChannelHandle {
    channel: Arc<Channel>,
    manager: Weak<ManagerInner>,
}

impl ChannelHandle {
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }
}

impl Deref for ChannelHandle {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        &self.channel
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("namespace", &self.channel.namespace())
            .field("state", &self.channel.connection_state())
            .finish()
    }
}

impl Clone for ChannelHandle {
    fn clone(&self) -> Self {
        if let Some(inner) = self.manager.upgrade() {
            if let Some(slot) = inner.channels.write().get_mut(self.channel.namespace()) {
                if Arc::ptr_eq(&slot.channel, &self.channel) {
                    slot.leases += 1;
                }
            }
        }
        Self {
            channel: Arc::clone(&self.channel),
            manager: self.manager.clone(),
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        let Some(inner) = self.manager.upgrade() else {
            return;
        };
        let namespace = self.channel.namespace();
        let mut channels = inner.channels.write();

        let last = match channels.get_mut(namespace) {
            Some(slot) if Arc::ptr_eq(&slot.channel, &self.channel) => {
                slot.leases = slot.leases.saturating_sub(1);
                slot.leases == 0
            }
            _ => false,
        };

        if last {
            if let Some(slot) = channels.remove(namespace) {
                info!("[ConnectionManager] Last lease on '{}' released, closing", namespace);
                slot.channel.stop();
            }
        }
    }
}
