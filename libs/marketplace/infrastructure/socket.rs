//! Socket wiring for the three marketplace namespaces
//!
//! Builds one [`ChannelConfig`] per namespace: the `authenticate` handshake,
//! the join/leave frames each namespace understands, the `ping` heartbeat and
//! the backoff taken from configuration.

use crate::domain::events::Namespace;
use crate::infrastructure::config::SocketConfig;
use crate::infrastructure::error::Result;
use async_trait::async_trait;
use hypersockets::{
    builder, control_frame, AuthProvider, AuthVerdict, ChannelConfig, Connector,
    ExponentialBackoff, HeaderProvider, Headers, RoomCodec, RoomId, WsMessage,
};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Room every offers subscriber shares
pub const OFFERS_ROOM: &str = "offers";

/// Who the client acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub access_token: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Credentials every channel reads when it (re)connects
///
/// Clones share one slot, so [`SharedCredentials::replace`] reaches channels
/// that are already running.
#[derive(Debug, Clone)]
pub struct SharedCredentials {
    inner: Arc<RwLock<Credentials>>,
}

impl SharedCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(RwLock::new(credentials)),
        }
    }

    pub fn current(&self) -> Credentials {
        self.inner.read().clone()
    }

    pub fn replace(&self, credentials: Credentials) {
        *self.inner.write() = credentials;
    }
}

impl From<Credentials> for SharedCredentials {
    fn from(credentials: Credentials) -> Self {
        Self::new(credentials)
    }
}

/// `authenticate {user_id, token}`, answered by `authenticated` or `auth_error`
pub struct MarketplaceAuth {
    credentials: SharedCredentials,
}

impl MarketplaceAuth {
    pub fn new(credentials: impl Into<SharedCredentials>) -> Self {
        Self {
            credentials: credentials.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for MarketplaceAuth {
    async fn get_auth_message(&self) -> hypersockets::Result<Option<WsMessage>> {
        let credentials = self.credentials.current();
        Ok(Some(control_frame(
            "authenticate",
            json!({
                "user_id": credentials.user_id,
                "token": credentials.access_token,
            }),
        )))
    }

    fn check_auth_response(&self, response: &WsMessage) -> AuthVerdict {
        let Ok(value) = response.parse_json::<Value>() else {
            return AuthVerdict::Pending;
        };
        match value.get("type").and_then(Value::as_str) {
            Some("authenticated") => AuthVerdict::Accepted,
            Some("auth_error") => {
                let detail = value
                    .get("detail")
                    .or_else(|| value.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("authentication rejected");
                AuthVerdict::Rejected(detail.to_string())
            }
            _ => AuthVerdict::Pending,
        }
    }
}

/// `Authorization: Bearer` with whatever token is current at upgrade time
pub struct MarketplaceHeaders {
    credentials: SharedCredentials,
}

impl MarketplaceHeaders {
    pub fn new(credentials: impl Into<SharedCredentials>) -> Self {
        Self {
            credentials: credentials.into(),
        }
    }
}

#[async_trait]
impl HeaderProvider for MarketplaceHeaders {
    async fn get_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.credentials.current().access_token),
        );
        headers
    }
}

/// Join/leave frames per namespace
pub struct NamespaceCodec {
    namespace: Namespace,
}

impl NamespaceCodec {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }
}

impl RoomCodec for NamespaceCodec {
    fn join_frame(&self, room: &RoomId) -> WsMessage {
        match self.namespace {
            Namespace::Messages => {
                control_frame("join_conversation", json!({ "conversation_id": room.as_str() }))
            }
            Namespace::Notifications => {
                control_frame("join_notifications", json!({ "user_id": room.as_str() }))
            }
            Namespace::Offers => control_frame("join_offers_room", json!({})),
        }
    }

    fn leave_frame(&self, room: &RoomId) -> WsMessage {
        match self.namespace {
            Namespace::Messages => {
                control_frame("leave_conversation", json!({ "conversation_id": room.as_str() }))
            }
            Namespace::Notifications => {
                control_frame("leave_notifications", json!({ "user_id": room.as_str() }))
            }
            Namespace::Offers => control_frame("leave_offers_room", json!({})),
        }
    }
}

pub fn backoff(socket: &SocketConfig) -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(socket.backoff_base_ms),
        Duration::from_millis(socket.backoff_cap_ms),
        socket.max_reconnect_attempts.map(|n| n as usize),
    )
    .with_full_jitter()
}

/// Channel configuration for one namespace
///
/// `connector` replaces the WebSocket transport (used for in-process servers).
pub fn channel_config(
    namespace: Namespace,
    socket: &SocketConfig,
    credentials: &SharedCredentials,
    connector: Option<Arc<dyn Connector>>,
) -> Result<ChannelConfig> {
    let channel = builder(namespace.as_str())
        .url(socket.namespace_url(namespace.as_str()))
        .codec(NamespaceCodec::new(namespace))
        .auth(MarketplaceAuth::new(credentials.clone()))
        .headers(MarketplaceHeaders::new(credentials.clone()))
        .heartbeat(socket.heartbeat_interval(), control_frame("ping", json!({})))
        .reconnect_strategy(backoff(socket))
        .handshake_timeout(socket.handshake_timeout());

    let channel = match connector {
        Some(connector) => channel.shared_connector(connector),
        None => channel,
    };

    Ok(channel.build()?)
}
