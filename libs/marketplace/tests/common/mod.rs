//! Common test utilities for marketplace integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use hypersockets::{control_frame, MemoryConnector, WsMessage};
use marketplace::application::{Alert, AlertSink};
use marketplace::domain::{Conversation, Namespace, Notification, NotificationPriority, OfferStatus, PriceOffer};
use marketplace::infrastructure::api::{ConversationPage, MarketplaceApi, NotificationPage};
use marketplace::infrastructure::config::RealtimeConfig;
use marketplace::{RealtimeError, RealtimeSession, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const ME: &str = "user-1";
pub const PRO: &str = "pro-7";

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(seconds)
}

fn stamp(seconds: i64) -> String {
    at(seconds).to_rfc3339()
}

// ============================================================================
// Frames
// ============================================================================

pub fn new_message_frame(conversation: &str, sender: &str, message_id: &str, ts: i64) -> WsMessage {
    control_frame(
        "new_message",
        json!({
            "conversation_id": conversation,
            "sender_id": sender,
            "delivery_id": format!("dlv-{}", message_id),
            "created_at": stamp(ts),
            "payload": {
                "message": {
                    "id": message_id,
                    "conversation_id": conversation,
                    "sender_id": sender,
                    "content": format!("text of {}", message_id),
                    "created_at": stamp(ts),
                }
            }
        }),
    )
}

pub fn presence_frame(user_id: &str, online: bool) -> WsMessage {
    control_frame(
        "user_online_status",
        json!({ "user_id": user_id, "payload": { "user_id": user_id, "is_online": online } }),
    )
}

/// Presence in the flat shape: `status` beside `type`, no payload
pub fn status_frame(user_id: &str, status: &str) -> WsMessage {
    control_frame(
        "user_online_status",
        json!({ "user_id": user_id, "status": status }),
    )
}

pub fn typing_frame(conversation: &str, user_id: &str, is_typing: bool) -> WsMessage {
    control_frame(
        "user_typing",
        json!({
            "conversation_id": conversation,
            "user_id": user_id,
            "payload": { "is_typing": is_typing }
        }),
    )
}

pub fn notification_frame(notification_id: &str, ts: i64) -> WsMessage {
    control_frame(
        "new_notification",
        json!({
            "notification_id": notification_id,
            "delivery_id": format!("dlv-{}", notification_id),
            "created_at": stamp(ts),
            "payload": notification_json(notification_id, ts),
        }),
    )
}

pub fn notification_read_frame(notification_id: &str, ts: i64) -> WsMessage {
    control_frame(
        "notification_read",
        json!({
            "notification_id": notification_id,
            "sender_id": ME,
            "created_at": stamp(ts),
        }),
    )
}

pub fn offer_frame(event_type: &str, offer_id: &str, status: OfferStatus, ts: i64) -> WsMessage {
    control_frame(
        event_type,
        json!({
            "offer_id": offer_id,
            "sender_id": PRO,
            "delivery_id": format!("dlv-{}-{}", offer_id, ts),
            "created_at": stamp(ts),
            "payload": {
                "offer": serde_json::to_value(offer(offer_id, status, ts)).unwrap(),
                "message": format!("{} is now {}", offer_id, status),
            }
        }),
    )
}

fn notification_json(notification_id: &str, ts: i64) -> Value {
    json!({
        "id": notification_id,
        "user_id": ME,
        "type": "booking_update",
        "title": format!("Notification {}", notification_id),
        "message": "Your booking changed",
        "is_read": false,
        "created_at": stamp(ts),
    })
}

// ============================================================================
// Entities
// ============================================================================

pub fn notification(id: &str, ts: i64, is_read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        user_id: ME.to_string(),
        kind: "booking_update".to_string(),
        category: None,
        priority: NotificationPriority::Normal,
        title: format!("Notification {}", id),
        message: "Your booking changed".to_string(),
        data: None,
        action_url: None,
        is_read,
        created_at: at(ts),
        read_at: None,
    }
}

pub fn offer(id: &str, status: OfferStatus, ts: i64) -> PriceOffer {
    PriceOffer {
        id: id.to_string(),
        user_id: ME.to_string(),
        professional_id: PRO.to_string(),
        service_type: Some("plumbing".to_string()),
        description: Some("Leaking sink".to_string()),
        offered_price: 80.0,
        status,
        created_at: at(0),
        updated_at: at(ts),
        expires_at: None,
        response_message: None,
        booking_id: None,
    }
}

pub fn conversation(id: &str, last_message_id: &str, ts: i64, unread: u32) -> Conversation {
    Conversation {
        id: id.to_string(),
        user_id: Some(ME.to_string()),
        professional_id: Some(PRO.to_string()),
        participants: Vec::new(),
        status: "active".to_string(),
        last_message_id: Some(last_message_id.to_string()),
        last_message_content: Some(format!("text of {}", last_message_id)),
        last_message_type: None,
        last_message_sender_id: Some(PRO.to_string()),
        last_message_status: None,
        last_message_at: Some(at(ts)),
        unread_count: unread,
        created_at: at(0),
        updated_at: at(ts),
    }
}

// ============================================================================
// Mock REST API
// ============================================================================

#[derive(Default)]
struct ApiState {
    conversations: Vec<Conversation>,
    notifications: Vec<Notification>,
    unread_count: u32,
    total: u32,
    offers: Vec<PriceOffer>,
    failing: HashSet<&'static str>,
    calls: Vec<String>,
    token: Option<String>,
    tokens: Vec<(&'static str, Option<String>)>,
}

/// In-memory REST API with per-operation failure switches and a call log
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<Mutex<ApiState>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` answer with HTTP 500 until [`Self::recover`]
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state.lock().failing.remove(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    /// Token the most recent `operation` call was made with
    pub fn token_used_by(&self, operation: &str) -> Option<String> {
        self.state
            .lock()
            .tokens
            .iter()
            .rev()
            .find(|(name, _)| *name == operation)
            .and_then(|(_, token)| token.clone())
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.state.lock().conversations = conversations;
    }

    pub fn set_notifications(&self, notifications: Vec<Notification>, unread_count: u32, total: u32) {
        let mut state = self.state.lock();
        state.notifications = notifications;
        state.unread_count = unread_count;
        state.total = total;
    }

    pub fn set_offers(&self, offers: Vec<PriceOffer>) {
        self.state.lock().offers = offers;
    }

    fn call(&self, operation: &'static str, detail: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("{} {}", operation, detail).trim().to_string());
        let token = state.token.clone();
        state.tokens.push((operation, token));
        if state.failing.contains(operation) {
            return Err(RealtimeError::Api {
                status: 500,
                detail: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MarketplaceApi for MockApi {
    async fn list_conversations(&self) -> Result<ConversationPage> {
        self.call("list_conversations", "")?;
        let state = self.state.lock();
        Ok(ConversationPage {
            conversations: state.conversations.clone(),
            total: state.conversations.len() as u32,
            unread_total: state.conversations.iter().map(|c| c.unread_count).sum(),
        })
    }

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        self.call("mark_conversation_read", conversation_id)
    }

    async fn list_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage> {
        self.call("list_notifications", &page.to_string())?;
        let state = self.state.lock();
        let start = ((page.max(1) - 1) * limit) as usize;
        Ok(NotificationPage {
            notifications: state
                .notifications
                .iter()
                .skip(start)
                .take(limit as usize)
                .cloned()
                .collect(),
            total: state.total,
            unread_count: state.unread_count,
            page,
            limit,
        })
    }

    async fn unread_notification_count(&self) -> Result<u32> {
        self.call("unread_notification_count", "")?;
        Ok(self.state.lock().unread_count)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        self.call("mark_notification_read", notification_id)
    }

    async fn mark_all_notifications_read(&self) -> Result<()> {
        self.call("mark_all_notifications_read", "")
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<()> {
        self.call("delete_notification", notification_id)
    }

    async fn clear_all_notifications(&self) -> Result<()> {
        self.call("clear_all_notifications", "")
    }

    async fn my_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>> {
        self.call("my_offers", status.map(|s| s.as_str()).unwrap_or(""))?;
        Ok(self
            .state
            .lock()
            .offers
            .iter()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect())
    }

    async fn received_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>> {
        self.call("received_offers", status.map(|s| s.as_str()).unwrap_or(""))?;
        Ok(Vec::new())
    }

    async fn cancel_offer(&self, offer_id: &str) -> Result<()> {
        self.call("cancel_offer", offer_id)
    }

    fn set_access_token(&self, token: &str) {
        self.state.lock().token = Some(token.to_string());
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

// ============================================================================
// Session harness
// ============================================================================

/// One in-memory server per namespace
pub struct Servers {
    pub messages: MemoryConnector,
    pub notifications: MemoryConnector,
    pub offers: MemoryConnector,
}

impl Servers {
    fn new() -> Self {
        let servers = Self {
            messages: MemoryConnector::new(),
            notifications: MemoryConnector::new(),
            offers: MemoryConnector::new(),
        };
        for server in [&servers.messages, &servers.notifications, &servers.offers] {
            server.reply_to("authenticate", control_frame("authenticated", json!({})));
        }
        servers
    }
}

pub fn test_config() -> RealtimeConfig {
    let mut config = RealtimeConfig::from_yaml_str(
        r#"
socket:
  url: ws://realtime.test/ws
  heartbeat_interval_secs: 60
  handshake_timeout_secs: 1
  backoff_base_ms: 5
  backoff_cap_ms: 20
presence:
  timeout_secs: 45
  sweep_interval_secs: 1
notifications:
  unread_poll_interval_secs: 3600
  page_size: 2
"#,
    )
    .unwrap();
    config.user_id = ME.to_string();
    config.access_token = "token-abc".to_string();
    config
}

pub struct Harness {
    pub session: RealtimeSession,
    pub servers: Servers,
    pub api: MockApi,
    pub alerts: Arc<RecordingAlerts>,
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: RealtimeConfig) -> Harness {
    let servers = Servers::new();
    let api = MockApi::new();
    let alerts = Arc::new(RecordingAlerts::default());
    let session = RealtimeSession::new(config, Arc::new(api.clone()))
        .with_alert_sink(alerts.clone())
        .with_connector(Namespace::Messages, Arc::new(servers.messages.clone()))
        .with_connector(Namespace::Notifications, Arc::new(servers.notifications.clone()))
        .with_connector(Namespace::Offers, Arc::new(servers.offers.clone()));
    Harness {
        session,
        servers,
        api,
        alerts,
    }
}

/// Poll `condition` every 5ms until it holds or two seconds pass
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    wait_for(Duration::from_secs(2), condition).await
}

pub async fn wait_for<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Give the event pump a moment to drain frames that should have no effect
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
