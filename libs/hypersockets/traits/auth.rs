use crate::traits::error::Result;
use crate::traits::frame::WsMessage;
use async_trait::async_trait;

/// Verdict on a frame received while the handshake is pending
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    Accepted,
    Rejected(String),
    /// Not an auth response; the frame is buffered and delivered once the channel opens
    Pending,
}

/// Authentication handshake performed on every (re)connect
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Frame sent right after the transport connects.
    /// `Ok(None)` means the channel opens without waiting for a response.
    async fn get_auth_message(&self) -> Result<Option<WsMessage>>;

    /// Classify a server frame received before the channel is open
    fn check_auth_response(&self, response: &WsMessage) -> AuthVerdict;
}

/// A no-op auth provider that doesn't require authentication
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn get_auth_message(&self) -> Result<Option<WsMessage>> {
        Ok(None)
    }

    fn check_auth_response(&self, _response: &WsMessage) -> AuthVerdict {
        AuthVerdict::Accepted
    }
}
