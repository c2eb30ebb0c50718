//! Entry point tying configuration, the REST client and the channels together
//!
//! One [`RealtimeSession`] per signed-in user. Facades created from it share
//! the session's [`ConnectionManager`], so two facades on the same namespace
//! share one connection.

use crate::application::alerts::{AlertSink, LogAlertSink};
use crate::application::messages::MessagesFacade;
use crate::application::notifications::NotificationsFacade;
use crate::application::offers::OffersFacade;
use crate::domain::events::Namespace;
use crate::infrastructure::api::{HttpApi, MarketplaceApi};
use crate::infrastructure::config::RealtimeConfig;
use crate::infrastructure::error::Result;
use crate::infrastructure::socket::{channel_config, Credentials, SharedCredentials};
use hypersockets::{ChannelHandle, ConnectionManager, ConnectionState, Connector, StateChange};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

pub struct RealtimeSession {
    manager: ConnectionManager,
    api: Arc<dyn MarketplaceApi>,
    config: RealtimeConfig,
    credentials: SharedCredentials,
    alerts: Arc<dyn AlertSink>,
    connectors: HashMap<Namespace, Arc<dyn Connector>>,
}

impl RealtimeSession {
    /// Credentials are taken from `config.user_id` / `config.access_token`
    pub fn new(config: RealtimeConfig, api: Arc<dyn MarketplaceApi>) -> Self {
        let credentials = Credentials::new(config.user_id.clone(), config.access_token.clone());
        Self {
            manager: ConnectionManager::new(),
            api,
            config,
            credentials: SharedCredentials::new(credentials),
            alerts: Arc::new(LogAlertSink),
            connectors: HashMap::new(),
        }
    }

    /// Session talking to the configured REST API over HTTP
    pub fn from_config(config: RealtimeConfig) -> Result<Self> {
        let api = HttpApi::new(
            config.api.base_url.clone(),
            config.access_token.clone(),
            Duration::from_secs(config.api.request_timeout_secs),
        )?;
        Ok(Self::new(config, Arc::new(api)))
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Use `connector` instead of WebSockets for one namespace
    pub fn with_connector(mut self, namespace: Namespace, connector: Arc<dyn Connector>) -> Self {
        self.connectors.insert(namespace, connector);
        self
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.current()
    }

    pub fn user_id(&self) -> String {
        self.credentials.current().user_id
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.manager.subscribe_state()
    }

    pub fn connection_states(&self) -> HashMap<String, ConnectionState> {
        self.manager.get_all_states()
    }

    fn channel(&self, namespace: Namespace) -> Result<ChannelHandle> {
        let config = channel_config(
            namespace,
            &self.config.socket,
            &self.credentials,
            self.connectors.get(&namespace).cloned(),
        )?;
        Ok(self.manager.connect(config))
    }

    pub fn messages(&self) -> Result<MessagesFacade> {
        let handle = self.channel(Namespace::Messages)?;
        Ok(MessagesFacade::start(
            handle,
            Arc::clone(&self.api),
            &self.user_id(),
            &self.config.presence,
        ))
    }

    pub fn notifications(&self) -> Result<NotificationsFacade> {
        let handle = self.channel(Namespace::Notifications)?;
        Ok(NotificationsFacade::start(
            handle,
            Arc::clone(&self.api),
            &self.user_id(),
            &self.config.notifications,
            Arc::clone(&self.alerts),
        ))
    }

    pub fn offers(&self) -> Result<OffersFacade> {
        let handle = self.channel(Namespace::Offers)?;
        Ok(OffersFacade::start(
            handle,
            Arc::clone(&self.api),
            &self.user_id(),
            Arc::clone(&self.alerts),
        ))
    }

    /// Swap in fresh credentials and restart channels closed by an auth rejection
    ///
    /// The REST client and every live channel use the new token from their
    /// next request or reconnect on. Returns the namespaces that were
    /// restarted; their rooms are rejoined.
    pub fn reauthenticate(&self, credentials: Credentials) -> Result<Vec<Namespace>> {
        self.api.set_access_token(&credentials.access_token);
        self.credentials.replace(credentials);

        let mut restarted = Vec::new();
        for name in self.manager.terminated_namespaces() {
            let Some(namespace) = Namespace::from_name(&name) else {
                continue;
            };
            // Connecting a halted namespace restarts it; the extra lease is
            // released right away
            drop(self.channel(namespace)?);
            restarted.push(namespace);
        }
        if !restarted.is_empty() {
            info!("[Session] Restarted {} channel(s) with new credentials", restarted.len());
        }
        Ok(restarted)
    }

    /// Close every channel (logout)
    pub async fn logout(&self) {
        info!("[Session] Logging out");
        self.manager.shutdown().await;
    }
}
