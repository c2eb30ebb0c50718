//! Marketplace REST API
//!
//! [`MarketplaceApi`] is the seam the facades depend on; [`HttpApi`] is the
//! reqwest implementation. Errors come back as `{"detail": "..."}`.

use crate::domain::models::{Conversation, Notification, OfferStatus, PriceOffer};
use crate::infrastructure::error::{RealtimeError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationPage {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub unread_total: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationPage {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
struct OfferList {
    #[serde(default)]
    offers: Vec<PriceOffer>,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    #[serde(default)]
    unread_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn list_conversations(&self) -> Result<ConversationPage>;

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()>;

    async fn list_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage>;

    async fn unread_notification_count(&self) -> Result<u32>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()>;

    async fn mark_all_notifications_read(&self) -> Result<()>;

    async fn delete_notification(&self, notification_id: &str) -> Result<()>;

    async fn clear_all_notifications(&self) -> Result<()>;

    /// Offers the signed-in user created
    async fn my_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>>;

    /// Offers addressed to the signed-in professional
    async fn received_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>>;

    async fn cancel_offer(&self, offer_id: &str) -> Result<()>;

    /// Send `token` with every later request
    fn set_access_token(&self, _token: &str) {}
}

/// REST client authenticated with a bearer token
pub struct HttpApi {
    base_url: String,
    token: RwLock<String>,
    client: Client,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(token.into()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(self.token.read().as_str())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.detail)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    body
                }
            });
        warn!("API error {}: {}", status.as_u16(), detail);

        if status == StatusCode::UNAUTHORIZED {
            return Err(RealtimeError::Unauthorized(detail));
        }
        Err(RealtimeError::Api {
            status: status.as_u16(),
            detail,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn execute(&self, method: Method, path: &str) -> Result<()> {
        let response = self.request(method, path).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn offers(&self, path: &str, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>> {
        let query: Vec<(&str, String)> = status
            .map(|s| vec![("status", s.as_str().to_string())])
            .unwrap_or_default();
        let list: OfferList = self.fetch(path, &query).await?;
        Ok(list.offers)
    }
}

#[async_trait]
impl MarketplaceApi for HttpApi {
    async fn list_conversations(&self) -> Result<ConversationPage> {
        self.fetch("/messages/conversations", &[]).await
    }

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        self.execute(
            Method::POST,
            &format!("/messages/conversations/{}/mark-read", conversation_id),
        )
        .await
    }

    async fn list_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage> {
        self.fetch(
            "/notifications",
            &[("page", page.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn unread_notification_count(&self) -> Result<u32> {
        let count: UnreadCount = self.fetch("/notifications/unread-count", &[]).await?;
        Ok(count.unread_count)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        self.execute(
            Method::PUT,
            &format!("/notifications/{}/read", notification_id),
        )
        .await
    }

    async fn mark_all_notifications_read(&self) -> Result<()> {
        self.execute(Method::PUT, "/notifications/read-all").await
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<()> {
        self.execute(Method::DELETE, &format!("/notifications/{}", notification_id))
            .await
    }

    async fn clear_all_notifications(&self) -> Result<()> {
        self.execute(Method::DELETE, "/notifications/clear-all").await
    }

    async fn my_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>> {
        self.offers("/offers/my-offers", status).await
    }

    async fn received_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>> {
        self.offers("/offers/received-offers", status).await
    }

    async fn cancel_offer(&self, offer_id: &str) -> Result<()> {
        self.execute(Method::DELETE, &format!("/offers/{}", offer_id))
            .await
    }

    fn set_access_token(&self, token: &str) {
        *self.token.write() = token.to_string();
    }
}
