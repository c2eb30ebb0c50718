pub mod events;
pub mod models;
pub mod presence;
pub mod reducer;

pub use events::{decode, EventBody, InboundEvent, Namespace, OfferTransition};
pub use models::{
    Conversation, Message, MessageStatus, MessageType, Notification, NotificationPriority,
    OfferStatus, Participant, PriceOffer, Versioned,
};
pub use presence::{PresenceRecord, PresenceSource, PresenceTracker, DEFAULT_PRESENCE_TIMEOUT};
pub use reducer::{
    ConversationCache, EntityList, EventReducer, FieldSet, NotificationCache, OfferCache,
    Outcome, ReconcileMode, ReconcileReport, RejectReason, Reduced, Reducible, Watermarks,
    MAX_SEEN_DELIVERIES,
};
