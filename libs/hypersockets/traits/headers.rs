use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers sent with the WebSocket upgrade request
pub type Headers = HashMap<String, String>;

/// Headers computed on every connection attempt, so refreshed tokens are picked up on reconnect
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    async fn get_headers(&self) -> Headers;
}

/// A no-op header provider that doesn't add any headers
pub struct NoHeaders;

#[async_trait]
impl HeaderProvider for NoHeaders {
    async fn get_headers(&self) -> Headers {
        HashMap::new()
    }
}

/// `Authorization: Bearer <token>` on the upgrade request
pub struct BearerHeaders {
    token: String,
}

impl BearerHeaders {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl HeaderProvider for BearerHeaders {
    async fn get_headers(&self) -> Headers {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        );
        headers
    }
}
