use crate::domain::models::OfferStatus;
use hypersockets::HyperSocketError;
use thiserror::Error;

/// Broad class of a failure, used to decide whether to retry or surface it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recovered by reconnecting; only visible as connection state
    Transport,
    /// Credentials rejected; never retried
    Auth,
    /// REST failure or a rejected client-side action
    Application,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RealtimeError {
    #[error("Transport error: {0}")]
    Transport(#[from] HyperSocketError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Failed to decode: {0}")]
    Decode(String),

    #[error("Cannot {action} offer {offer_id} while it is {status}")]
    InvalidOfferState {
        offer_id: String,
        status: OfferStatus,
        action: &'static str,
    },

    #[error("Offer not found: {0}")]
    OfferNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),
}

impl RealtimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RealtimeError::Transport(e) if e.is_auth() => ErrorKind::Auth,
            RealtimeError::Transport(_) => ErrorKind::Transport,
            RealtimeError::Unauthorized(_) => ErrorKind::Auth,
            RealtimeError::Api { status, .. } if *status == 401 || *status == 403 => ErrorKind::Auth,
            _ => ErrorKind::Application,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RealtimeError::Decode(e.to_string())
        } else {
            RealtimeError::Http(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RealtimeError::from(HyperSocketError::ConnectionClosed("reset".into())).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            RealtimeError::from(HyperSocketError::AuthenticationFailed("bad token".into())).kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            RealtimeError::Api {
                status: 403,
                detail: "forbidden".into()
            }
            .kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            RealtimeError::Api {
                status: 500,
                detail: "boom".into()
            }
            .kind(),
            ErrorKind::Application
        );
    }

    #[test]
    fn test_invalid_offer_state_message() {
        let error = RealtimeError::InvalidOfferState {
            offer_id: "o1".into(),
            status: OfferStatus::Accepted,
            action: "cancel",
        };
        assert_eq!(error.to_string(), "Cannot cancel offer o1 while it is accepted");
    }
}
