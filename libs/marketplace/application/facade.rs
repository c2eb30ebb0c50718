//! Plumbing shared by the three facades
//!
//! A [`FacadeCore`] owns the channel lease, the tasks the facade spawned and
//! the rooms it joined. Dropping it stops the tasks before they can touch
//! state again, leaves those rooms and releases the lease.

use crate::domain::events::Namespace;
use crate::infrastructure::error::{RealtimeError, Result};
use hypersockets::{ChannelEvent, ChannelHandle, ConnectionState, JoinOutcome, RoomId, WsMessage};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) struct FacadeCore {
    namespace: Namespace,
    handle: ChannelHandle,
    error: Arc<RwLock<Option<RealtimeError>>>,
    alive: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    rooms: Mutex<Vec<RoomId>>,
}

impl FacadeCore {
    pub(crate) fn new(namespace: Namespace, handle: ChannelHandle) -> Self {
        Self {
            namespace,
            handle,
            error: Arc::new(RwLock::new(None)),
            alive: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(Vec::new()),
            rooms: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.handle.connection_state()
    }

    pub(crate) fn error(&self) -> Option<RealtimeError> {
        self.error.read().clone()
    }

    pub(crate) fn clear_error(&self) {
        *self.error.write() = None;
    }

    /// Remember a failed result as the facade's error, then hand it back
    pub(crate) fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.clear_error(),
            Err(e) => {
                warn!("[{}] {}", self.namespace, e);
                *self.error.write() = Some(e.clone());
            }
        }
        result
    }

    /// Join a room on behalf of this facade; it is left again on drop
    pub(crate) fn join(&self, room: impl Into<RoomId>) -> JoinOutcome {
        let room = room.into();
        let outcome = self.handle.join(room.clone());
        if outcome == JoinOutcome::Joined {
            self.rooms.lock().push(room);
        }
        outcome
    }

    pub(crate) fn leave(&self, room: &RoomId) -> bool {
        self.rooms.lock().retain(|joined| joined != room);
        self.handle.leave(room)
    }

    pub(crate) fn send(&self, frame: WsMessage) -> Result<()> {
        Ok(self.handle.send(frame)?)
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(tokio::spawn(task));
    }

    pub(crate) fn alive(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// Feed every channel event to `handler` until the facade is dropped
    pub(crate) fn spawn_pump<H>(&self, handler: H)
    where
        H: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        let mut events = self.handle.events();
        let alive = Arc::clone(&self.alive);
        let error = Arc::clone(&self.error);
        let namespace = self.namespace;

        self.spawn(async move {
            while let Some(event) = events.recv().await {
                if !alive.load(Ordering::Acquire) {
                    break;
                }
                match &event {
                    ChannelEvent::AuthFailed(detail) => {
                        warn!("[{}] Authentication rejected: {}", namespace, detail);
                        *error.write() = Some(RealtimeError::Unauthorized(detail.clone()));
                    }
                    ChannelEvent::Error(detail) => {
                        debug!("[{}] Channel error: {}", namespace, detail);
                    }
                    ChannelEvent::StateChanged(state) => {
                        info!("[{}] Connection {}", namespace, state);
                        if *state == ConnectionState::Open {
                            let mut error = error.write();
                            if matches!(*error, Some(RealtimeError::Unauthorized(_))) {
                                *error = None;
                            }
                        }
                    }
                    ChannelEvent::Frame(_) => {}
                }
                handler(event);
            }
            debug!("[{}] Event pump stopped", namespace);
        });
    }
}

impl Drop for FacadeCore {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for room in self.rooms.lock().drain(..) {
            self.handle.leave(&room);
        }
        debug!("[{}] Facade dropped", self.namespace);
    }
}
