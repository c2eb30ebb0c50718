//! Application Layer
//!
//! The facades the UI talks to, and the session that creates them.

pub mod alerts;
pub mod bus;
mod facade;
pub mod messages;
pub mod notifications;
pub mod offers;
pub mod session;

pub use alerts::{Alert, AlertLevel, AlertSink, LogAlertSink};
pub use bus::{EventBus, SubscriptionToken};
pub use messages::{MessagesFacade, PresenceUpdate, StatusUpdate, TypingUpdate};
pub use notifications::NotificationsFacade;
pub use offers::{OfferBuckets, OfferEvent, OffersFacade};
pub use session::RealtimeSession;
