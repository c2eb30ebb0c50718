//! Marketplace Realtime Client
//!
//! Keeps conversations, notifications, price offers and presence consistent
//! with the server across reconnects and out-of-order delivery.
//!
//! - `domain`: entities, event decoding, the pure [`EventReducer`] and
//!   [`PresenceTracker`]
//! - `infrastructure`: REST client, socket wiring, configuration, logging
//! - `application`: the messages / notifications / offers facades and the
//!   [`RealtimeSession`] that creates them

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    Alert, AlertLevel, AlertSink, LogAlertSink, MessagesFacade, NotificationsFacade, OfferBuckets,
    OfferEvent, OffersFacade, RealtimeSession, SubscriptionToken,
};
pub use domain::{
    Conversation, EventReducer, InboundEvent, Message, Namespace, Notification, OfferStatus,
    OfferTransition, Outcome, PresenceTracker, PriceOffer,
};
pub use infrastructure::{
    init_tracing, Credentials, ErrorKind, HttpApi, MarketplaceApi, RealtimeConfig, RealtimeError,
    Result,
};
