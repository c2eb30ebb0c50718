//! Inbound socket events
//!
//! Frames arrive as a JSON envelope `{type, <entity>_id, payload, created_at,
//! sender_id, delivery_id}`. [`decode`] turns an envelope into an
//! [`InboundEvent`] or `None` for control frames and unknown types.

use crate::domain::models::{Message, MessageStatus, Notification, OfferStatus, PriceOffer};
use crate::infrastructure::error::{RealtimeError, Result};
use chrono::{DateTime, Utc};
use hypersockets::WsMessage;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Logical channel a facade talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Messages,
    Notifications,
    Offers,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Messages, Namespace::Notifications, Namespace::Offers];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Messages => "messages",
            Namespace::Notifications => "notifications",
            Namespace::Offers => "offers",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offer lifecycle transition announced by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferTransition {
    Created,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
    Revoked,
}

impl OfferTransition {
    pub fn target_status(&self) -> OfferStatus {
        match self {
            OfferTransition::Created => OfferStatus::Pending,
            OfferTransition::Accepted => OfferStatus::Accepted,
            OfferTransition::Rejected => OfferStatus::Rejected,
            OfferTransition::Expired => OfferStatus::Expired,
            OfferTransition::Cancelled => OfferStatus::Cancelled,
            OfferTransition::Revoked => OfferStatus::Revoked,
        }
    }

    fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "new_offer" => Some(OfferTransition::Created),
            "offer_accepted" => Some(OfferTransition::Accepted),
            "offer_rejected" => Some(OfferTransition::Rejected),
            "offer_expired" => Some(OfferTransition::Expired),
            "offer_cancelled" => Some(OfferTransition::Cancelled),
            "offer_revoked" => Some(OfferTransition::Revoked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    NewMessage(Message),
    MessageStatus {
        message_id: String,
        status: MessageStatus,
    },
    /// Someone read the conversation; the reader is the event's actor
    ConversationRead,
    Typing {
        user_id: String,
        is_typing: bool,
    },
    Presence {
        user_id: String,
        online: bool,
    },
    NewNotification(Notification),
    NotificationRead,
    Offer {
        transition: OfferTransition,
        offer: PriceOffer,
        message: Option<String>,
    },
}

/// A decoded server event
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub entity_id: String,
    pub server_timestamp: DateTime<Utc>,
    pub delivery_id: Option<String>,
    pub actor_id: Option<String>,
    pub body: EventBody,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match &self.body {
            EventBody::NewMessage(_) => "new_message",
            EventBody::MessageStatus { .. } => "message_status_changed",
            EventBody::ConversationRead => "conversation_read",
            EventBody::Typing { .. } => "user_typing",
            EventBody::Presence { .. } => "user_online_status",
            EventBody::NewNotification(_) => "new_notification",
            EventBody::NotificationRead => "notification_read",
            EventBody::Offer { .. } => "offer",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    offer_id: Option<String>,
    #[serde(default)]
    notification_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    delivery_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    is_online: Option<bool>,
}

/// Frames that belong to the handshake or keep-alive
const CONTROL_TYPES: &[&str] = &[
    "authenticated",
    "auth_error",
    "pong",
    "joined_conversation",
    "left_conversation",
    "joined_offers_room",
    "left_offers_room",
    "joined_notifications",
];

/// Decode a frame received on `namespace`
///
/// Returns `Ok(None)` for control frames and event types the namespace does
/// not handle.
pub fn decode(namespace: Namespace, frame: &WsMessage) -> Result<Option<InboundEvent>> {
    let envelope: WireEnvelope = frame
        .parse_json()
        .map_err(|e| RealtimeError::Decode(e.to_string()))?;

    if CONTROL_TYPES.contains(&envelope.event_type.as_str()) {
        return Ok(None);
    }

    let event = match (namespace, envelope.event_type.as_str()) {
        (Namespace::Messages, "new_message") => decode_new_message(envelope)?,
        (Namespace::Messages, "message_status_changed") => decode_message_status(envelope)?,
        (Namespace::Messages, "conversation_read") => decode_conversation_read(envelope)?,
        (Namespace::Messages, "user_typing") => decode_typing(envelope)?,
        (Namespace::Messages, "user_online_status") => decode_presence(envelope)?,
        (Namespace::Notifications, "new_notification") => decode_new_notification(envelope)?,
        (Namespace::Notifications, "notification_read") => decode_notification_read(envelope)?,
        (Namespace::Offers, event_type) => match OfferTransition::from_event_type(event_type) {
            Some(transition) => decode_offer(envelope, transition)?,
            None => {
                debug!("[{}] Ignoring event type '{}'", namespace, event_type);
                return Ok(None);
            }
        },
        (_, event_type) => {
            debug!("[{}] Ignoring event type '{}'", namespace, event_type);
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn missing(field: &str, event_type: &str) -> RealtimeError {
    RealtimeError::Decode(format!("'{}' event without {}", event_type, field))
}

/// The payload itself, or its `key` member when the server nests the entity
fn nested(payload: &Value, key: &str) -> Value {
    match payload.get(key) {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => payload.clone(),
    }
}

fn from_payload<T: serde::de::DeserializeOwned>(value: Value, event_type: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| RealtimeError::Decode(format!("'{}' payload: {}", event_type, e)))
}

fn payload_str(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn payload_time(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}

fn decode_new_message(envelope: WireEnvelope) -> Result<InboundEvent> {
    let message: Message = from_payload(nested(&envelope.payload, "message"), "new_message")?;
    Ok(InboundEvent {
        entity_id: envelope
            .conversation_id
            .unwrap_or_else(|| message.conversation_id.clone()),
        server_timestamp: envelope.created_at.unwrap_or(message.created_at),
        delivery_id: envelope.delivery_id,
        actor_id: Some(envelope.sender_id.unwrap_or_else(|| message.sender_id.clone())),
        body: EventBody::NewMessage(message),
    })
}

fn decode_message_status(envelope: WireEnvelope) -> Result<InboundEvent> {
    let kind = "message_status_changed";
    let payload = &envelope.payload;
    let message_id = payload_str(payload, "message_id").ok_or_else(|| missing("message_id", kind))?;
    let status: MessageStatus = from_payload(
        payload.get("status").cloned().ok_or_else(|| missing("status", kind))?,
        kind,
    )?;
    let entity_id = envelope
        .conversation_id
        .clone()
        .or_else(|| payload_str(payload, "conversation_id"))
        .ok_or_else(|| missing("conversation_id", kind))?;
    let server_timestamp = envelope
        .created_at
        .or_else(|| payload_time(payload, "updated_at"))
        .ok_or_else(|| missing("created_at", kind))?;

    Ok(InboundEvent {
        entity_id,
        server_timestamp,
        delivery_id: envelope.delivery_id,
        actor_id: envelope.sender_id,
        body: EventBody::MessageStatus { message_id, status },
    })
}

fn decode_conversation_read(envelope: WireEnvelope) -> Result<InboundEvent> {
    let kind = "conversation_read";
    let actor_id = envelope
        .sender_id
        .clone()
        .or_else(|| payload_str(&envelope.payload, "reader_id"))
        .ok_or_else(|| missing("reader", kind))?;
    Ok(InboundEvent {
        entity_id: envelope
            .conversation_id
            .ok_or_else(|| missing("conversation_id", kind))?,
        server_timestamp: envelope.created_at.ok_or_else(|| missing("created_at", kind))?,
        delivery_id: envelope.delivery_id,
        actor_id: Some(actor_id),
        body: EventBody::ConversationRead,
    })
}

fn decode_typing(envelope: WireEnvelope) -> Result<InboundEvent> {
    let kind = "user_typing";
    let payload = &envelope.payload;
    let user_id = envelope
        .user_id
        .clone()
        .or_else(|| payload_str(payload, "user_id"))
        .ok_or_else(|| missing("user_id", kind))?;
    let is_typing = payload
        .get("is_typing")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(InboundEvent {
        entity_id: envelope
            .conversation_id
            .clone()
            .or_else(|| payload_str(payload, "conversation_id"))
            .unwrap_or_default(),
        server_timestamp: envelope.created_at.unwrap_or_else(Utc::now),
        delivery_id: envelope.delivery_id,
        actor_id: Some(user_id.clone()),
        body: EventBody::Typing { user_id, is_typing },
    })
}

fn decode_presence(envelope: WireEnvelope) -> Result<InboundEvent> {
    let kind = "user_online_status";
    let payload = &envelope.payload;
    let user_id = envelope
        .user_id
        .clone()
        .or_else(|| payload_str(payload, "user_id"))
        .ok_or_else(|| missing("user_id", kind))?;
    let online = envelope
        .is_online
        .or_else(|| envelope.status.as_deref().map(|status| status == "online"))
        .or_else(|| payload.get("is_online").and_then(Value::as_bool))
        .or_else(|| {
            payload
                .get("status")
                .and_then(Value::as_str)
                .map(|status| status == "online")
        })
        .ok_or_else(|| missing("status", kind))?;

    Ok(InboundEvent {
        entity_id: user_id.clone(),
        server_timestamp: envelope.created_at.unwrap_or_else(Utc::now),
        delivery_id: envelope.delivery_id,
        actor_id: Some(user_id.clone()),
        body: EventBody::Presence { user_id, online },
    })
}

fn decode_new_notification(envelope: WireEnvelope) -> Result<InboundEvent> {
    let notification: Notification = from_payload(
        nested(&envelope.payload, "notification"),
        "new_notification",
    )?;
    Ok(InboundEvent {
        entity_id: envelope
            .notification_id
            .unwrap_or_else(|| notification.id.clone()),
        server_timestamp: envelope.created_at.unwrap_or(notification.created_at),
        delivery_id: envelope.delivery_id,
        actor_id: envelope.sender_id,
        body: EventBody::NewNotification(notification),
    })
}

fn decode_notification_read(envelope: WireEnvelope) -> Result<InboundEvent> {
    let kind = "notification_read";
    let payload = &envelope.payload;
    let entity_id = envelope
        .notification_id
        .clone()
        .or_else(|| payload_str(payload, "notification_id"))
        .ok_or_else(|| missing("notification_id", kind))?;
    let server_timestamp = envelope
        .created_at
        .or_else(|| payload_time(payload, "read_at"))
        .ok_or_else(|| missing("created_at", kind))?;

    Ok(InboundEvent {
        entity_id,
        server_timestamp,
        delivery_id: envelope.delivery_id,
        actor_id: envelope.sender_id,
        body: EventBody::NotificationRead,
    })
}

fn decode_offer(envelope: WireEnvelope, transition: OfferTransition) -> Result<InboundEvent> {
    let offer: PriceOffer = from_payload(nested(&envelope.payload, "offer"), &envelope.event_type)?;
    let message = payload_str(&envelope.payload, "message");
    let server_timestamp = envelope
        .created_at
        .or_else(|| payload_time(&envelope.payload, "timestamp"))
        .unwrap_or(offer.updated_at);

    Ok(InboundEvent {
        entity_id: envelope.offer_id.unwrap_or_else(|| offer.id.clone()),
        server_timestamp,
        delivery_id: envelope.delivery_id,
        actor_id: envelope.sender_id,
        body: EventBody::Offer {
            transition,
            offer,
            message,
        },
    })
}
