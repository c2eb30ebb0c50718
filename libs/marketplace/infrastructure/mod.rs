//! Infrastructure Layer
//!
//! REST client, socket wiring, configuration and logging. Depends on the
//! domain layer but not on the application layer.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod socket;

pub use api::{ConversationPage, HttpApi, MarketplaceApi, NotificationPage};
pub use config::{ConfigError, RealtimeConfig};
pub use error::{ErrorKind, RealtimeError, Result};
pub use logging::init_tracing;
pub use socket::{
    channel_config, Credentials, MarketplaceAuth, MarketplaceHeaders, NamespaceCodec,
    SharedCredentials, OFFERS_ROOM,
};
