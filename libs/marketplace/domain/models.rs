//! Marketplace entities as the REST API and the socket events carry them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// An entity the reducer can keep in a sorted, versioned list
pub trait Versioned {
    fn entity_id(&self) -> &str;

    /// Server-side version used for last-write-wins reconciliation
    fn version(&self) -> DateTime<Utc>;

    /// Lists are kept newest-first by this key
    fn sort_key(&self) -> DateTime<Utc> {
        self.version()
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Location,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Seen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_role: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub professional_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default = "default_conversation_status")]
    pub status: String,
    #[serde(default)]
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub last_message_content: Option<String>,
    #[serde(default)]
    pub last_message_type: Option<MessageType>,
    #[serde(default)]
    pub last_message_sender_id: Option<String>,
    #[serde(default)]
    pub last_message_status: Option<MessageStatus>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_conversation_status() -> String {
    "active".to_string()
}

impl Conversation {
    /// Minimal conversation for a message whose conversation is not cached yet
    pub fn from_first_message(message: &Message) -> Self {
        Self {
            id: message.conversation_id.clone(),
            user_id: None,
            professional_id: None,
            participants: Vec::new(),
            status: default_conversation_status(),
            last_message_id: None,
            last_message_content: None,
            last_message_type: None,
            last_message_sender_id: None,
            last_message_status: None,
            last_message_at: None,
            unread_count: 0,
            created_at: message.created_at,
            updated_at: message.created_at,
        }
    }

    pub fn apply_last_message(&mut self, message: &Message) {
        self.last_message_id = Some(message.id.clone());
        self.last_message_content = Some(message.content.clone());
        self.last_message_type = Some(message.message_type);
        self.last_message_sender_id = Some(message.sender_id.clone());
        self.last_message_status = Some(message.status);
        self.last_message_at = Some(message.created_at);
        if message.created_at > self.updated_at {
            self.updated_at = message.created_at;
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
            || self.professional_id.as_deref() == Some(user_id)
            || self.participants.iter().any(|p| p.user_id == user_id)
    }
}

impl Versioned for Conversation {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> DateTime<Utc> {
        match self.last_message_at {
            Some(at) if at > self.updated_at => at,
            _ => self.updated_at,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl Versioned for Notification {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> DateTime<Utc> {
        match self.read_at {
            Some(at) if at > self.created_at => at,
            _ => self.created_at,
        }
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// ============================================================================
// Offers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
    Revoked,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Expired => "expired",
            OfferStatus::Cancelled => "cancelled",
            OfferStatus::Revoked => "revoked",
        }
    }

    /// Anything but pending; only a REST snapshot may move an offer out of a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }

    /// Socket-driven transitions: anything from pending, and revocation of an accepted offer
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        matches!(
            (*self, next),
            (OfferStatus::Pending, _) | (OfferStatus::Accepted, OfferStatus::Revoked)
        )
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceOffer {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub user_id: String,
    pub professional_id: String,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub offered_price: f64,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_message: Option<String>,
    #[serde(default)]
    pub booking_id: Option<String>,
}

impl Versioned for PriceOffer {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}
