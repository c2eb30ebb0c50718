//! Common test utilities for HyperSockets integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use hypersockets::{
    control_frame, AuthProvider, AuthVerdict, ChannelConfig, FixedDelay, MemoryConnector,
    Result, RoomCodec, RoomId, WsMessage,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// `join_room` / `leave_room` frames carrying the room id
pub struct TestRooms;

impl RoomCodec for TestRooms {
    fn join_frame(&self, room: &RoomId) -> WsMessage {
        control_frame("join_room", json!({ "room": room.as_str() }))
    }

    fn leave_frame(&self, room: &RoomId) -> WsMessage {
        control_frame("leave_room", json!({ "room": room.as_str() }))
    }
}

/// Sends `authenticate` and waits for `authenticated` / `auth_error`
pub struct TokenAuth {
    pub token: String,
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn get_auth_message(&self) -> Result<Option<WsMessage>> {
        Ok(Some(control_frame(
            "authenticate",
            json!({ "token": self.token }),
        )))
    }

    fn check_auth_response(&self, response: &WsMessage) -> AuthVerdict {
        match response.frame_type().as_deref() {
            Some("authenticated") => AuthVerdict::Accepted,
            Some("auth_error") => AuthVerdict::Rejected("invalid token".to_string()),
            _ => AuthVerdict::Pending,
        }
    }
}

pub fn authenticated() -> WsMessage {
    control_frame("authenticated", json!({}))
}

pub fn auth_error() -> WsMessage {
    control_frame("auth_error", json!({ "detail": "invalid token" }))
}

/// Memory-backed channel with a short fixed retry delay
pub fn memory_channel(namespace: &str, server: &MemoryConnector) -> ChannelConfig {
    hypersockets::builder(namespace)
        .url(format!("memory://{}", namespace))
        .codec(TestRooms)
        .connector(server.clone())
        .reconnect_strategy(FixedDelay::new(Duration::from_millis(10), None))
        .handshake_timeout(Duration::from_millis(500))
        .build()
        .unwrap()
}

/// Poll `condition` every 5ms until it holds or two seconds pass
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// A real WebSocket server that acknowledges `authenticate` and echoes everything else
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self { addr, shutdown }
    }

    async fn handle_connection(stream: tokio::net::TcpStream, shutdown: Arc<Notify>) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::{accept_async, tungstenite::Message};

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame = WsMessage::Text(text.clone());
                            let reply = if frame.frame_type().as_deref() == Some("authenticate") {
                                authenticated()
                            } else {
                                frame
                            };
                            let WsMessage::Text(reply) = reply else { break };
                            if write.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
