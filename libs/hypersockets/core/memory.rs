//! In-process transport
//!
//! [`MemoryConnector`] plays the server side of a channel without sockets:
//! it records every frame the client writes, lets the owner push frames,
//! drop the live connection, refuse connection attempts, or reject
//! credentials. Cloned connectors share the same server.

use crate::core::transport::{ConnectRequest, Connector, Transport};
use crate::traits::{Headers, HyperSocketError, Result, WsMessage};
use async_trait::async_trait;
use futures::channel::mpsc;
use parking_lot::Mutex;
use std::sync::Arc;

struct Session {
    sent: Vec<WsMessage>,
    inbound: mpsc::UnboundedSender<Result<WsMessage>>,
}

#[derive(Default)]
struct ServerState {
    sessions: Vec<Session>,
    connect_attempts: usize,
    refuse_next: usize,
    reject_credentials: bool,
    auto_replies: Vec<(String, WsMessage)>,
    last_headers: Option<Headers>,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every client frame whose `type` is `trigger` with `reply`
    pub fn reply_to(&self, trigger: impl Into<String>, reply: WsMessage) {
        self.state.lock().auto_replies.push((trigger.into(), reply));
    }

    /// Fail the next `count` connection attempts with a transport error
    pub fn refuse_next(&self, count: usize) {
        self.state.lock().refuse_next = count;
    }

    /// Reject the upgrade as unauthorized until turned off again
    pub fn reject_credentials(&self, reject: bool) {
        self.state.lock().reject_credentials = reject;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Number of connections ever accepted
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of connections whose client side is still reading
    pub fn open_sessions(&self) -> usize {
        self.state
            .lock()
            .sessions
            .iter()
            .filter(|session| !session.inbound.is_closed())
            .count()
    }

    pub fn last_headers(&self) -> Option<Headers> {
        self.state.lock().last_headers.clone()
    }

    /// Frames written by the client on the given connection
    pub fn sent(&self, session: usize) -> Vec<WsMessage> {
        self.state
            .lock()
            .sessions
            .get(session)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    /// `type` fields of the frames written on the given connection
    pub fn sent_types(&self, session: usize) -> Vec<String> {
        self.sent(session)
            .iter()
            .filter_map(WsMessage::frame_type)
            .collect()
    }

    /// Deliver a frame on the most recent live connection
    pub fn push(&self, frame: WsMessage) -> bool {
        let state = self.state.lock();
        match state.sessions.last() {
            Some(session) => session.inbound.unbounded_send(Ok(frame)).is_ok(),
            None => false,
        }
    }

    /// End the most recent connection as if the server went away
    pub fn drop_connection(&self) {
        if let Some(session) = self.state.lock().sessions.last() {
            session.inbound.close_channel();
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Transport> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        let index = {
            let mut state = self.state.lock();
            state.connect_attempts += 1;
            state.last_headers = Some(request.headers.clone());

            if state.reject_credentials {
                return Err(HyperSocketError::AuthenticationFailed(
                    "Upgrade rejected with HTTP 401 Unauthorized".to_string(),
                ));
            }
            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                return Err(HyperSocketError::WebSocket("Connection refused".to_string()));
            }

            state.sessions.push(Session {
                sent: Vec::new(),
                inbound: inbound_tx,
            });
            state.sessions.len() - 1
        };

        let sink = futures::sink::unfold(
            Arc::clone(&self.state),
            move |state, frame: WsMessage| async move {
                {
                    let mut guard = state.lock();
                    let reply = frame.frame_type().and_then(|kind| {
                        guard
                            .auto_replies
                            .iter()
                            .find(|(trigger, _)| *trigger == kind)
                            .map(|(_, reply)| reply.clone())
                    });

                    let session = &mut guard.sessions[index];
                    if session.inbound.is_closed() {
                        return Err(HyperSocketError::ConnectionClosed(
                            "Server closed the connection".to_string(),
                        ));
                    }
                    session.sent.push(frame);
                    if let Some(reply) = reply {
                        let _ = session.inbound.unbounded_send(Ok(reply));
                    }
                }
                Ok::<_, HyperSocketError>(state)
            },
        );

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(inbound_rx),
        })
    }
}
