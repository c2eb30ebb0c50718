use anyhow::Result;
use marketplace::{
    init_tracing, MessagesFacade, NotificationsFacade, OffersFacade, RealtimeConfig,
    RealtimeSession, SubscriptionToken,
};
use marketplace_realtime::bin_common::{
    load_config_from_env, parse_args, BinaryRunner, ConfigType, RunConfig,
};
use tracing::{info, warn};

/// Follows one user's conversations, notifications and offers and logs
/// everything that changes
struct RealtimeMonitor {
    run_config: RunConfig,
    session: RealtimeSession,
    messages: MessagesFacade,
    notifications: NotificationsFacade,
    offers: OffersFacade,
    subscriptions: Vec<SubscriptionToken>,
}

impl RealtimeMonitor {
    async fn start(config: RealtimeConfig) -> Result<Self> {
        let session = RealtimeSession::from_config(config)?;
        let messages = session.messages()?;
        let notifications = session.notifications()?;
        let offers = session.offers()?;
        offers.join_offers_room();

        let subscriptions = vec![
            messages.on_new_message(|message| {
                info!(
                    "💬 [{}] {}: {}",
                    message.conversation_id, message.sender_id, message.content
                );
            }),
            messages.on_presence(|update| {
                info!(
                    "👤 {} is {}",
                    update.user_id,
                    if update.online { "online" } else { "offline" }
                );
            }),
            notifications.on_new_notification(|notification| {
                info!("🔔 {}: {}", notification.title, notification.message);
            }),
            offers.on_offer_event(|event| {
                info!(
                    "💰 Offer {} {:?}: price {}, now {}",
                    event.offer.id, event.transition, event.offer.offered_price, event.offer.status
                );
            }),
        ];

        let monitor = Self {
            run_config: RunConfig::new("Realtime Monitor").with_status_interval(60),
            session,
            messages,
            notifications,
            offers,
            subscriptions,
        };
        monitor.load_snapshots().await;
        Ok(monitor)
    }

    /// Initial REST load; the socket keeps things current afterwards
    async fn load_snapshots(&self) {
        match self.messages.fetch_conversations().await {
            Ok(conversations) => info!("Loaded {} conversations", conversations.len()),
            Err(e) => warn!("Failed to load conversations: {}", e),
        }
        match self.notifications.fetch_notifications(1).await {
            Ok(notifications) => info!("Loaded {} notifications", notifications.len()),
            Err(e) => warn!("Failed to load notifications: {}", e),
        }
        match self.offers.fetch_my_offers(None).await {
            Ok(offers) => info!("Loaded {} offers", offers.len()),
            Err(e) => warn!("Failed to load offers: {}", e),
        }
    }
}

impl BinaryRunner for RealtimeMonitor {
    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn status(&self) -> String {
        let mut states: Vec<String> = self
            .session
            .connection_states()
            .into_iter()
            .map(|(namespace, state)| format!("{}={}", namespace, state))
            .collect();
        states.sort();
        format!(
            "Status: [{}] | unread messages: {} | unread notifications: {} | offers: {} | online: {}",
            states.join(", "),
            self.messages.unread_count(),
            self.notifications.unread_count(),
            self.offers.offers().len(),
            self.messages.online_users().len()
        )
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.subscriptions.clear();
        self.session.logout().await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_type = match parse_args().into_iter().next() {
        Some(path) => ConfigType::Custom(path),
        None => ConfigType::Realtime,
    };
    let config_path = load_config_from_env(config_type);
    let config = RealtimeConfig::load(&config_path)?;

    init_tracing();
    info!("Loaded configuration from {}", config_path.display());
    config.log();

    let mut monitor = RealtimeMonitor::start(config).await?;
    monitor.execute().await
}
