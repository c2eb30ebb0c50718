//! Namespace channel driver
//!
//! One tokio task per channel owns the transport. It connects, performs the
//! auth handshake, replays the room registry, then multiplexes inbound
//! frames, queued commands and the heartbeat until the connection drops. On
//! a drop it backs off per the reconnection strategy and starts over. A
//! credential rejection ends the task with the channel `Closed`.

use crate::core::config::ChannelConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::core::heartbeat::Heartbeat;
use crate::core::transport::{ConnectRequest, Transport};
use crate::manager::registry::{JoinOutcome, SubscriptionRegistry};
use crate::traits::*;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Events fanned out to every subscriber of a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChanged(ConnectionState),
    Frame(WsMessage),
    /// Credentials were rejected. The channel stays closed until it is
    /// connected again with fresh credentials.
    AuthFailed(String),
    Error(String),
}

/// A state transition of any channel, as broadcast by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub namespace: String,
    pub state: ConnectionState,
}

enum Command {
    Send(WsMessage),
    FlushJoins,
    Leave { room: RoomId, session: u64 },
}

enum SessionEnd {
    Shutdown,
    AuthRejected(HyperSocketError),
    Failed {
        error: HyperSocketError,
        was_open: bool,
    },
}

pub(crate) struct ChannelShared {
    namespace: String,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    registry: Mutex<SubscriptionRegistry>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>,
    last_error: RwLock<Option<HyperSocketError>>,
    state_changes: broadcast::Sender<StateChange>,
}

impl ChannelShared {
    fn dispatch(&self, event: ChannelEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.swap(state);
        if previous == state {
            return;
        }
        debug!("[{}] {} -> {}", self.namespace, previous, state);
        let _ = self.state_changes.send(StateChange {
            namespace: self.namespace.clone(),
            state,
        });
        self.dispatch(ChannelEvent::StateChanged(state));
    }

    fn record_error(&self, error: &HyperSocketError) {
        *self.last_error.write() = Some(error.clone());
        self.dispatch(ChannelEvent::Error(error.to_string()));
    }
}

struct Driver {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Driver {
    fn start(config: ChannelConfig, shared: Arc<ChannelShared>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_channel(config, shared, command_rx, shutdown_rx));
        Self {
            commands,
            shutdown,
            task: Some(task),
        }
    }

    fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// A live namespace channel
///
/// Obtained through [`crate::manager::ConnectionManager::connect`]; handles
/// deref to this type.
pub struct Channel {
    shared: Arc<ChannelShared>,
    driver: Mutex<Driver>,
}

impl Channel {
    /// Spawn the driver task. Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        config: ChannelConfig,
        state_changes: broadcast::Sender<StateChange>,
    ) -> Arc<Self> {
        let shared = Arc::new(ChannelShared {
            namespace: config.namespace.clone(),
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            metrics: AtomicMetrics::new(),
            registry: Mutex::new(SubscriptionRegistry::new(config.namespace.clone())),
            subscribers: Mutex::new(Vec::new()),
            last_error: RwLock::new(None),
            state_changes,
        });
        let driver = Driver::start(config, Arc::clone(&shared));
        Arc::new(Self {
            shared,
            driver: Mutex::new(driver),
        })
    }

    /// Start a new driver after the previous one gave up, keeping memberships
    /// and subscribers. No-op while the driver is still running.
    pub(crate) fn restart(&self, config: ChannelConfig) {
        let mut driver = self.driver.lock();
        if !driver.is_finished() && !self.shared.state.is_closed() {
            return;
        }
        info!("[{}] Restarting channel driver", self.shared.namespace);
        *self.shared.last_error.write() = None;
        *driver = Driver::start(config, Arc::clone(&self.shared));
    }

    /// True once the driver stopped on its own (auth rejection, retries exhausted)
    pub fn is_terminated(&self) -> bool {
        self.shared.state.is_closed() || self.driver.lock().is_finished()
    }

    pub fn namespace(&self) -> &str {
        &self.shared.namespace
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.is_open()
    }

    pub fn last_error(&self) -> Option<HyperSocketError> {
        self.shared.last_error.read().clone()
    }

    pub fn metrics(&self) -> Metrics {
        self.shared.metrics.snapshot()
    }

    /// Subscribe to this channel's events. Dropping the receiver unsubscribes.
    pub fn events(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Write a frame on the open connection
    pub fn send(&self, frame: WsMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(HyperSocketError::NotConnected(self.shared.namespace.clone()));
        }
        self.command(Command::Send(frame))
    }

    /// Join a room. The join frame is written now if the channel is open,
    /// otherwise on the next (re)connect.
    pub fn join(&self, room: impl Into<RoomId>) -> JoinOutcome {
        let outcome = self.shared.registry.lock().join(room.into());
        if outcome == JoinOutcome::Joined {
            let _ = self.command(Command::FlushJoins);
        }
        outcome
    }

    /// Leave a room. Returns false if it was not joined.
    pub fn leave(&self, room: &RoomId) -> bool {
        let (membership, session) = {
            let mut registry = self.shared.registry.lock();
            let membership = registry.leave(room);
            (membership, registry.session())
        };
        match membership {
            Some(membership) => {
                if membership.sent_on(session) {
                    let _ = self.command(Command::Leave {
                        room: membership.room,
                        session,
                    });
                }
                true
            }
            None => false,
        }
    }

    pub fn is_joined(&self, room: &RoomId) -> bool {
        self.shared.registry.lock().contains(room)
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        self.shared.registry.lock().rooms()
    }

    pub(crate) fn clear_rooms(&self) {
        self.shared.registry.lock().clear();
    }

    /// Signal the driver to stop without waiting for it
    pub(crate) fn stop(&self) {
        let _ = self.driver.lock().shutdown.send(true);
    }

    /// Stop the driver and wait for it to close the connection
    pub async fn shutdown(&self) {
        let task = {
            let mut driver = self.driver.lock();
            let _ = driver.shutdown.send(true);
            driver.task.take()
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("[{}] Driver task ended abnormally: {}", self.shared.namespace, e);
            }
        }
        self.shared.set_state(ConnectionState::Closed);
    }

    fn command(&self, command: Command) -> Result<()> {
        self.driver.lock().commands.send(command).map_err(|_| {
            HyperSocketError::ChannelSend(format!(
                "Driver for '{}' has stopped",
                self.shared.namespace
            ))
        })
    }
}

/// Resolves once shutdown was requested or the channel owner went away
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn run_channel(
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    let namespace = shared.namespace.clone();
    let mut attempt: usize = 0;
    let mut first = true;

    loop {
        shared.set_state(if first {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });
        first = false;

        let end = run_session(&config, &shared, &mut commands, &mut shutdown).await;
        shared.registry.lock().reset_session();

        match end {
            SessionEnd::Shutdown => {
                info!("[{}] Channel shut down", namespace);
                break;
            }
            SessionEnd::AuthRejected(error) => {
                error!("[{}] Authentication rejected, not retrying: {}", namespace, error);
                shared.record_error(&error);
                shared.dispatch(ChannelEvent::AuthFailed(error.to_string()));
                break;
            }
            SessionEnd::Failed { error, was_open } => {
                if was_open {
                    attempt = 0;
                }
                warn!("[{}] Connection lost: {}", namespace, error);
                shared.record_error(&error);
                if !error.is_retryable() {
                    break;
                }
            }
        }

        let Some(delay) = config.reconnect_strategy.next_delay(attempt) else {
            let error = HyperSocketError::ReconnectionFailed {
                attempts: attempt,
                reason: "retry budget exhausted".to_string(),
            };
            error!("[{}] {}", namespace, error);
            shared.record_error(&error);
            break;
        };

        shared.set_state(ConnectionState::Reconnecting);
        attempt += 1;
        shared.metrics.record_reconnect();
        info!("[{}] Reconnecting in {:?} (attempt {})", namespace, delay, attempt);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stopped(&mut shutdown) => {
                info!("[{}] Shutdown requested during backoff", namespace);
                break;
            }
        }
    }

    shared.set_state(ConnectionState::Closed);
}

async fn run_session(
    config: &ChannelConfig,
    shared: &ChannelShared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let namespace = &shared.namespace;

    let mut transport = tokio::select! {
        result = establish(config) => match result {
            Ok(transport) => transport,
            Err(e) if e.is_auth() => return SessionEnd::AuthRejected(e),
            Err(e) => return SessionEnd::Failed { error: e, was_open: false },
        },
        _ = stopped(shutdown) => return SessionEnd::Shutdown,
    };

    let early_frames = tokio::select! {
        result = handshake(config, &mut transport) => match result {
            Ok(frames) => frames,
            Err(e) if e.is_auth() => return SessionEnd::AuthRejected(e),
            Err(e) => return SessionEnd::Failed { error: e, was_open: false },
        },
        _ = stopped(shutdown) => return SessionEnd::Shutdown,
    };

    info!("[{}] Connected to {}", namespace, config.url);
    shared.set_state(ConnectionState::Open);

    let rooms = shared.registry.lock().replay();
    if !rooms.is_empty() {
        info!("[{}] Rejoining {} room(s)", namespace, rooms.len());
        shared.metrics.record_replayed(rooms.len());
    }
    for room in rooms {
        if let Err(e) = write(shared, &mut transport, config.codec.join_frame(&room)).await {
            return SessionEnd::Failed { error: e, was_open: true };
        }
    }

    for frame in early_frames {
        shared.metrics.record_received();
        shared.dispatch(ChannelEvent::Frame(frame));
    }

    let mut heartbeat = Heartbeat::new(config.heartbeat.as_ref());

    loop {
        tokio::select! {
            _ = stopped(shutdown) => {
                let _ = transport.sink.close().await;
                return SessionEnd::Shutdown;
            }

            frame = transport.stream.next() => match frame {
                Some(Ok(frame)) => {
                    shared.metrics.record_received();
                    shared.dispatch(ChannelEvent::Frame(frame));
                }
                Some(Err(e)) => return SessionEnd::Failed { error: e, was_open: true },
                None => {
                    return SessionEnd::Failed {
                        error: HyperSocketError::ConnectionClosed(
                            "Server closed the connection".to_string(),
                        ),
                        was_open: true,
                    };
                }
            },

            command = commands.recv() => {
                let result = match command {
                    Some(Command::Send(frame)) => write(shared, &mut transport, frame).await,
                    Some(Command::FlushJoins) => {
                        let rooms = shared.registry.lock().replay();
                        let mut result = Ok(());
                        for room in rooms {
                            debug!("[{}] Joining room {}", namespace, room);
                            result = write(shared, &mut transport, config.codec.join_frame(&room)).await;
                            if result.is_err() {
                                break;
                            }
                        }
                        result
                    }
                    Some(Command::Leave { room, session }) => {
                        let current = shared.registry.lock().session();
                        if session == current {
                            debug!("[{}] Leaving room {}", namespace, room);
                            write(shared, &mut transport, config.codec.leave_frame(&room)).await
                        } else {
                            Ok(())
                        }
                    }
                    None => {
                        let _ = transport.sink.close().await;
                        return SessionEnd::Shutdown;
                    }
                };
                if let Err(e) = result {
                    return SessionEnd::Failed { error: e, was_open: true };
                }
            }

            payload = heartbeat.tick() => {
                if let Err(e) = write(shared, &mut transport, payload).await {
                    return SessionEnd::Failed { error: e, was_open: true };
                }
            }
        }
    }
}

async fn establish(config: &ChannelConfig) -> Result<Transport> {
    let headers = match &config.headers {
        Some(provider) => provider.get_headers().await,
        None => Headers::new(),
    };
    let request = ConnectRequest {
        url: config.url.clone(),
        headers,
    };

    match tokio::time::timeout(config.handshake_timeout, config.connector.connect(&request)).await {
        Ok(result) => result,
        Err(_) => Err(HyperSocketError::Timeout(format!(
            "Connecting to {} took longer than {:?}",
            config.url, config.handshake_timeout
        ))),
    }
}

/// Frames held back while waiting for the auth verdict; later ones are dropped
pub const MAX_EARLY_FRAMES: usize = 256;

/// Send the auth frame and wait for the verdict. Unrelated frames received
/// meanwhile are returned for delivery once the channel is open.
async fn handshake(config: &ChannelConfig, transport: &mut Transport) -> Result<Vec<WsMessage>> {
    let Some(auth) = config.auth.as_ref() else {
        return Ok(Vec::new());
    };
    let Some(message) = auth.get_auth_message().await? else {
        return Ok(Vec::new());
    };
    transport.sink.send(message).await?;

    let mut early_frames = Vec::new();
    let deadline = tokio::time::sleep(config.handshake_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Err(HyperSocketError::Timeout("No authentication response".to_string()));
            }
            frame = transport.stream.next() => match frame {
                Some(Ok(frame)) => match auth.check_auth_response(&frame) {
                    AuthVerdict::Accepted => return Ok(early_frames),
                    AuthVerdict::Rejected(reason) => {
                        return Err(HyperSocketError::AuthenticationFailed(reason));
                    }
                    AuthVerdict::Pending if early_frames.len() < MAX_EARLY_FRAMES => {
                        early_frames.push(frame);
                    }
                    AuthVerdict::Pending => {
                        warn!("[{}] Dropping frame received before authentication", config.namespace);
                    }
                },
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(HyperSocketError::ConnectionClosed(
                        "Connection closed during authentication".to_string(),
                    ));
                }
            }
        }
    }
}

async fn write(shared: &ChannelShared, transport: &mut Transport, frame: WsMessage) -> Result<()> {
    transport.sink.send(frame).await?;
    shared.metrics.record_sent();
    Ok(())
}
