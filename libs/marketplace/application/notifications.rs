//! Notification feed with optimistic mutations
//!
//! Every mutating action changes the cache first, then calls the API. When
//! the call fails, exactly that change is undone and the error is returned.

use crate::application::alerts::{Alert, AlertSink};
use crate::application::bus::{EventBus, SubscriptionToken};
use crate::application::facade::FacadeCore;
use crate::domain::events::{decode, EventBody, InboundEvent, Namespace};
use crate::domain::models::Notification;
use crate::domain::reducer::{EventReducer, NotificationCache, Outcome, ReconcileMode};
use crate::infrastructure::api::MarketplaceApi;
use crate::infrastructure::config::NotificationsConfig;
use crate::infrastructure::error::{RealtimeError, Result};
use chrono::Utc;
use hypersockets::{control_frame, ChannelEvent, ChannelHandle, ConnectionState, WsMessage};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

struct NotificationsState {
    reducer: EventReducer,
    cache: RwLock<NotificationCache>,
    new_notifications: EventBus<Notification>,
    alerts: Arc<dyn AlertSink>,
}

impl NotificationsState {
    fn reduce(&self, event: &InboundEvent) -> Outcome {
        let mut cache = self.cache.write();
        let reduced = self.reducer.apply(std::mem::take(&mut *cache), event);
        *cache = reduced.cache;
        reduced.outcome
    }

    fn handle_frame(&self, frame: &WsMessage) {
        let event = match decode(Namespace::Notifications, frame) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!("[notifications] Dropping undecodable frame: {}", e);
                return;
            }
        };

        if !self.reduce(&event).is_applied() {
            return;
        }
        if let EventBody::NewNotification(_) = &event.body {
            let Some(notification) = self.cache.read().get(&event.entity_id).cloned() else {
                return;
            };
            self.alerts
                .alert(Alert::info(notification.title.clone(), notification.message.clone()));
            self.new_notifications.emit(&notification);
        }
    }
}

pub struct NotificationsFacade {
    core: FacadeCore,
    state: Arc<NotificationsState>,
    api: Arc<dyn MarketplaceApi>,
    page_size: u32,
}

impl NotificationsFacade {
    pub(crate) fn start(
        handle: ChannelHandle,
        api: Arc<dyn MarketplaceApi>,
        user_id: &str,
        settings: &NotificationsConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let core = FacadeCore::new(Namespace::Notifications, handle);
        let state = Arc::new(NotificationsState {
            reducer: EventReducer::new(user_id),
            cache: RwLock::new(NotificationCache::new()),
            new_notifications: EventBus::new(),
            alerts,
        });

        core.join(user_id);

        let pump_state = Arc::clone(&state);
        core.spawn_pump(move |event| {
            if let ChannelEvent::Frame(frame) = event {
                pump_state.handle_frame(&frame);
            }
        });

        // The server count also covers pages never fetched
        let poll_state = Arc::clone(&state);
        let poll_api = Arc::clone(&api);
        let alive = core.alive();
        let period = settings.unread_poll_interval();
        core.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let result = poll_api.unread_notification_count().await;
                if !alive.load(Ordering::Acquire) {
                    break;
                }
                match result {
                    Ok(unread) => poll_state.cache.write().set_unread_count(unread),
                    Err(e) => debug!("[notifications] Unread poll failed: {}", e),
                }
            }
        });

        Self {
            core,
            state,
            api,
            page_size: settings.page_size,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.connection_state()
    }

    pub fn error(&self) -> Option<RealtimeError> {
        self.core.error()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.cache.read().items().to_vec()
    }

    pub fn notification(&self, notification_id: &str) -> Option<Notification> {
        self.state.cache.read().get(notification_id).cloned()
    }

    pub fn unread_count(&self) -> u32 {
        self.state.cache.read().unread_count()
    }

    pub fn total(&self) -> u32 {
        self.state.cache.read().total()
    }

    pub fn on_new_notification<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.state.new_notifications.subscribe(callback)
    }

    /// Page 1 replaces the feed, later pages extend it
    pub async fn fetch_notifications(&self, page: u32) -> Result<Vec<Notification>> {
        let page = page.max(1);
        let response = self
            .core
            .track(self.api.list_notifications(page, self.page_size).await)?;
        let mode = if page == 1 {
            ReconcileMode::Replace
        } else {
            ReconcileMode::Append
        };

        let mut cache = self.state.cache.write();
        let (next, report) = std::mem::take(&mut *cache).reconcile_page(
            response.notifications,
            mode,
            response.unread_count,
            response.total,
        );
        *cache = next;
        debug!(
            "[notifications] Page {} reconciled: {} applied, {} kept newer, {} retained",
            page,
            report.applied,
            report.kept_newer,
            report.retained.len()
        );
        Ok(cache.items().to_vec())
    }

    pub async fn refresh_unread_count(&self) -> Result<u32> {
        let unread = self.core.track(self.api.unread_notification_count().await)?;
        self.state.cache.write().set_unread_count(unread);
        Ok(unread)
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let at = Utc::now();
        let flipped = self.state.cache.write().set_read(notification_id, at);

        let result = self.api.mark_notification_read(notification_id).await;
        match &result {
            Ok(()) => {
                // Other sessions of the same user pick this up
                if let Err(e) = self.core.send(control_frame(
                    "mark_read",
                    json!({ "notification_id": notification_id }),
                )) {
                    debug!("[notifications] mark_read not broadcast: {}", e);
                }
            }
            Err(_) if flipped => {
                self.state.cache.write().revert_read(notification_id, at);
            }
            Err(_) => {}
        }
        self.core.track(result)
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        let at = Utc::now();
        let (flipped, uncached_unread) = {
            let mut cache = self.state.cache.write();
            let ids: Vec<String> = cache
                .items()
                .iter()
                .filter(|n| !n.is_read)
                .map(|n| n.id.clone())
                .collect();
            let flipped: Vec<String> = ids
                .into_iter()
                .filter(|id| cache.set_read(id, at))
                .collect();
            let uncached_unread = cache.unread_count();
            cache.set_unread_count(0);
            (flipped, uncached_unread)
        };

        let result = self.api.mark_all_notifications_read().await;
        if result.is_err() {
            let mut cache = self.state.cache.write();
            for id in &flipped {
                cache.revert_read(id, at);
            }
            let unread = cache.unread_count() + uncached_unread;
            cache.set_unread_count(unread);
        }
        self.core.track(result)
    }

    pub async fn remove_notification(&self, notification_id: &str) -> Result<()> {
        let removed = self.state.cache.write().remove(notification_id);

        let result = self.api.delete_notification(notification_id).await;
        if result.is_err() {
            if let Some(removed) = removed {
                self.state.cache.write().restore(removed);
            }
        }
        self.core.track(result)
    }

    pub async fn clear_all(&self) -> Result<()> {
        let (removed, unread, total) = self.state.cache.write().clear();

        let result = self.api.clear_all_notifications().await;
        if result.is_err() {
            let mut cache = self.state.cache.write();
            let removed_unread = removed.iter().filter(|n| !n.is_read).count() as u32;
            let removed_count = removed.len() as u32;
            for notification in removed {
                cache.restore(notification);
            }
            // Counters also covered notifications that were never fetched
            let unread_rest = unread.saturating_sub(removed_unread);
            let total_rest = total.saturating_sub(removed_count);
            let unread = cache.unread_count() + unread_rest;
            cache.set_unread_count(unread);
            let total = cache.total() + total_rest;
            cache.set_total(total);
        }
        self.core.track(result)
    }
}
