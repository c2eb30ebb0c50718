use thiserror::Error;

/// Errors raised by the channel transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HyperSocketError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The server refused the credentials (handshake 401/403 or an explicit auth error frame).
    /// Never retried by the reconnect loop.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Frame codec error: {0}")]
    Codec(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: usize, reason: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Channel '{0}' is not open")]
    NotConnected(String),
}

impl HyperSocketError {
    /// True for credential rejections, which must surface to the caller instead of looping
    pub fn is_auth(&self) -> bool {
        matches!(self, HyperSocketError::AuthenticationFailed(_))
    }

    /// Whether the reconnect loop may try again after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HyperSocketError::AuthenticationFailed(_) | HyperSocketError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HyperSocketError>;
