pub mod states;

use crate::core::config::{default_backoff, default_connector, ChannelConfig, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::core::transport::Connector;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Optional settings carried through the type-state transitions
struct Options {
    auth: Option<Arc<dyn AuthProvider>>,
    headers: Option<Arc<dyn HeaderProvider>>,
    heartbeat: Option<(Duration, WsMessage)>,
    reconnect_strategy: Option<Arc<dyn ReconnectionStrategy>>,
    handshake_timeout: Duration,
    connector: Option<Arc<dyn Connector>>,
}

/// Type-state builder for [`ChannelConfig`]
///
/// `build()` only exists once both the URL and the room codec are set.
pub struct ChannelBuilder<U: UrlState, C: CodecState> {
    _state: TypeState<U, C>,
    namespace: String,
    url: Option<String>,
    codec: Option<Arc<dyn RoomCodec>>,
    options: Options,
}

impl ChannelBuilder<NoUrl, NoCodec> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            _state: TypeState::new(),
            namespace: namespace.into(),
            url: None,
            codec: None,
            options: Options {
                auth: None,
                headers: None,
                heartbeat: None,
                reconnect_strategy: None,
                handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
                connector: None,
            },
        }
    }
}

impl<C: CodecState> ChannelBuilder<NoUrl, C> {
    /// Set the WebSocket URL (ws:// or wss://)
    pub fn url(self, url: impl Into<String>) -> ChannelBuilder<HasUrl, C> {
        ChannelBuilder {
            _state: TypeState::new(),
            namespace: self.namespace,
            url: Some(url.into()),
            codec: self.codec,
            options: self.options,
        }
    }
}

impl<U: UrlState> ChannelBuilder<U, NoCodec> {
    /// Set how join/leave frames are built for this namespace
    pub fn codec(self, codec: impl RoomCodec + 'static) -> ChannelBuilder<U, HasCodec> {
        ChannelBuilder {
            _state: TypeState::new(),
            namespace: self.namespace,
            url: self.url,
            codec: Some(Arc::new(codec)),
            options: self.options,
        }
    }
}

impl<U: UrlState, C: CodecState> ChannelBuilder<U, C> {
    pub fn auth(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.options.auth = Some(Arc::new(auth));
        self
    }

    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.options.headers = Some(Arc::new(provider));
        self
    }

    /// Send `payload` every `interval` while the channel is open
    pub fn heartbeat(mut self, interval: Duration, payload: WsMessage) -> Self {
        self.options.heartbeat = Some((interval, payload));
        self
    }

    /// Defaults to [`crate::core::config::default_backoff`]
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.options.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.options.handshake_timeout = timeout;
        self
    }

    /// Defaults to the tungstenite WebSocket connector
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.options.connector = Some(Arc::new(connector));
        self
    }

    /// Same as [`Self::connector`] for a connector already behind an `Arc`
    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.options.connector = Some(connector);
        self
    }
}

impl ChannelBuilder<HasUrl, HasCodec> {
    pub fn build(self) -> Result<ChannelConfig> {
        let url = self
            .url
            .ok_or_else(|| HyperSocketError::Configuration("URL not set".to_string()))?;
        let codec = self
            .codec
            .ok_or_else(|| HyperSocketError::Configuration("Room codec not set".to_string()))?;

        if !(url.starts_with("ws://") || url.starts_with("wss://") || url.starts_with("memory://")) {
            return Err(HyperSocketError::Configuration(format!(
                "Unsupported URL scheme: {}",
                url
            )));
        }
        if self.namespace.is_empty() {
            return Err(HyperSocketError::Configuration(
                "Namespace must not be empty".to_string(),
            ));
        }

        Ok(ChannelConfig {
            namespace: self.namespace,
            url,
            codec,
            auth: self.options.auth,
            headers: self.options.headers,
            heartbeat: self.options.heartbeat,
            reconnect_strategy: self
                .options
                .reconnect_strategy
                .unwrap_or_else(|| Arc::new(default_backoff())),
            handshake_timeout: self.options.handshake_timeout,
            connector: self.options.connector.unwrap_or_else(default_connector),
        })
    }
}
