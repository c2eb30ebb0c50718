use crate::core::transport::{Connector, TungsteniteConnector};
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for connecting plus the auth handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to run one namespace channel
///
/// Built with [`crate::builder`], which enforces at compile time that the URL
/// and the room codec are set.
#[derive(Clone)]
pub struct ChannelConfig {
    pub(crate) namespace: String,
    pub(crate) url: String,
    pub(crate) codec: Arc<dyn RoomCodec>,
    pub(crate) auth: Option<Arc<dyn AuthProvider>>,
    pub(crate) headers: Option<Arc<dyn HeaderProvider>>,
    pub(crate) heartbeat: Option<(Duration, WsMessage)>,
    pub(crate) reconnect_strategy: Arc<dyn ReconnectionStrategy>,
    pub(crate) handshake_timeout: Duration,
    pub(crate) connector: Arc<dyn Connector>,
}

impl ChannelConfig {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub fn has_heartbeat(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

/// 1s base, 30s cap, full jitter, unlimited attempts
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), None).with_full_jitter()
}

pub(crate) fn default_connector() -> Arc<dyn Connector> {
    Arc::new(TungsteniteConnector)
}
