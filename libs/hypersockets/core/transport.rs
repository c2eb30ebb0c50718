//! Connection establishment
//!
//! A [`Connector`] turns a URL plus upgrade headers into a split frame
//! sink/stream pair. The driver never touches tungstenite directly, which
//! lets the same reconnect loop run over the in-memory transport in tests.

use crate::traits::{Headers, HyperSocketError, Result, WsMessage};
use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    http::{HeaderName, HeaderValue},
    Message,
};
use tracing::{debug, warn};

pub type FrameSink = Pin<Box<dyn Sink<WsMessage, Error = HyperSocketError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WsMessage>> + Send>>;

/// An established connection, split into its write and read halves
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// What a connector needs to open one connection
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: String,
    pub headers: Headers,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection. Credential rejections during the upgrade must map to
    /// [`HyperSocketError::AuthenticationFailed`].
    async fn connect(&self, request: &ConnectRequest) -> Result<Transport>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Transport> {
        let mut upgrade = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| HyperSocketError::Configuration(format!("Invalid URL: {}", e)))?;

        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    upgrade.headers_mut().insert(name, value);
                }
                _ => warn!("Skipping invalid header '{}'", name),
            }
        }

        debug!("Connecting to {}", request.url);
        let (ws, _response) = tokio_tungstenite::connect_async(upgrade)
            .await
            .map_err(classify_connect_error)?;

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| HyperSocketError::WebSocket(e.to_string()))
            .with(|frame: WsMessage| future::ready(Ok::<_, HyperSocketError>(to_tungstenite(frame))));

        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(message) => from_tungstenite(message).map(Ok),
                Err(e) => Some(Err(HyperSocketError::WebSocket(e.to_string()))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn classify_connect_error(error: tungstenite::Error) -> HyperSocketError {
    match error {
        tungstenite::Error::Http(response)
            if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
        {
            HyperSocketError::AuthenticationFailed(format!(
                "Upgrade rejected with HTTP {}",
                response.status()
            ))
        }
        tungstenite::Error::Url(e) => HyperSocketError::Configuration(e.to_string()),
        other => HyperSocketError::WebSocket(other.to_string()),
    }
}

fn to_tungstenite(frame: WsMessage) -> Message {
    match frame {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(bytes) => Message::Binary(bytes),
    }
}

/// Control frames are handled by tungstenite itself; a close frame surfaces as end of stream
fn from_tungstenite(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(bytes) => Some(WsMessage::Binary(bytes)),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        Message::Close(frame) => {
            debug!("Server sent close frame: {:?}", frame);
            None
        }
    }
}
