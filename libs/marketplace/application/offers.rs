//! Price offers and their transition buckets
//!
//! Each observed transition is appended to the bucket for its kind and stays
//! there until [`OffersFacade::clear_offer_event`] consumes it.

use crate::application::alerts::{Alert, AlertSink};
use crate::application::bus::{EventBus, SubscriptionToken};
use crate::application::facade::FacadeCore;
use crate::domain::events::{decode, EventBody, InboundEvent, Namespace, OfferTransition};
use crate::domain::models::{OfferStatus, PriceOffer};
use crate::domain::reducer::{EventReducer, OfferCache, Outcome, ReconcileMode};
use crate::infrastructure::api::MarketplaceApi;
use crate::infrastructure::error::{RealtimeError, Result};
use crate::infrastructure::socket::OFFERS_ROOM;
use chrono::{DateTime, Duration, Utc};
use hypersockets::{ChannelEvent, ChannelHandle, ConnectionState, JoinOutcome, RoomId, WsMessage};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One observed offer transition
#[derive(Debug, Clone, PartialEq)]
pub struct OfferEvent {
    pub transition: OfferTransition,
    pub offer: PriceOffer,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferBuckets {
    pub new_offers: Vec<OfferEvent>,
    pub accepted_offers: Vec<OfferEvent>,
    pub rejected_offers: Vec<OfferEvent>,
    pub expired_offers: Vec<OfferEvent>,
    pub cancelled_offers: Vec<OfferEvent>,
    pub revoked_offers: Vec<OfferEvent>,
}

impl OfferBuckets {
    fn bucket_mut(&mut self, transition: OfferTransition) -> &mut Vec<OfferEvent> {
        match transition {
            OfferTransition::Created => &mut self.new_offers,
            OfferTransition::Accepted => &mut self.accepted_offers,
            OfferTransition::Rejected => &mut self.rejected_offers,
            OfferTransition::Expired => &mut self.expired_offers,
            OfferTransition::Cancelled => &mut self.cancelled_offers,
            OfferTransition::Revoked => &mut self.revoked_offers,
        }
    }

    fn all_mut(&mut self) -> [&mut Vec<OfferEvent>; 6] {
        [
            &mut self.new_offers,
            &mut self.accepted_offers,
            &mut self.rejected_offers,
            &mut self.expired_offers,
            &mut self.cancelled_offers,
            &mut self.revoked_offers,
        ]
    }

    fn push(&mut self, event: OfferEvent) {
        self.bucket_mut(event.transition).push(event);
    }

    /// Remove and return every entry for the offer
    fn take(&mut self, offer_id: &str) -> Vec<OfferEvent> {
        let mut taken = Vec::new();
        for bucket in self.all_mut() {
            let (matching, rest): (Vec<OfferEvent>, Vec<OfferEvent>) =
                bucket.drain(..).partition(|event| event.offer.id == offer_id);
            *bucket = rest;
            taken.extend(matching);
        }
        taken.sort_by_key(|event| event.at);
        taken
    }

    pub fn len(&self) -> usize {
        self.new_offers.len()
            + self.accepted_offers.len()
            + self.rejected_offers.len()
            + self.expired_offers.len()
            + self.cancelled_offers.len()
            + self.revoked_offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct OffersState {
    reducer: EventReducer,
    cache: RwLock<OfferCache>,
    buckets: Mutex<OfferBuckets>,
    events: EventBus<OfferEvent>,
    alerts: Arc<dyn AlertSink>,
}

impl OffersState {
    fn reduce(&self, event: &InboundEvent) -> Outcome {
        let mut cache = self.cache.write();
        let reduced = self.reducer.apply(std::mem::take(&mut *cache), event);
        *cache = reduced.cache;
        reduced.outcome
    }

    fn handle_frame(&self, frame: &WsMessage) {
        let event = match decode(Namespace::Offers, frame) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!("[offers] Dropping undecodable frame: {}", e);
                return;
            }
        };

        let outcome = self.reduce(&event);
        if !outcome.is_applied() {
            return;
        }
        let EventBody::Offer {
            transition, message, ..
        } = &event.body
        else {
            return;
        };
        let Some(offer) = self.cache.read().get(&event.entity_id).cloned() else {
            return;
        };

        let observed = OfferEvent {
            transition: *transition,
            offer,
            message: message.clone(),
            at: event.server_timestamp,
        };
        if observed.transition == OfferTransition::Revoked {
            self.alerts.alert(Alert::warning(
                "Offer revoked",
                observed
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Offer {} was revoked", observed.offer.id)),
            ));
        }
        self.buckets.lock().push(observed.clone());
        self.events.emit(&observed);
    }
}

pub struct OffersFacade {
    core: FacadeCore,
    state: Arc<OffersState>,
    api: Arc<dyn MarketplaceApi>,
}

impl OffersFacade {
    pub(crate) fn start(
        handle: ChannelHandle,
        api: Arc<dyn MarketplaceApi>,
        user_id: &str,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let core = FacadeCore::new(Namespace::Offers, handle);
        let state = Arc::new(OffersState {
            reducer: EventReducer::new(user_id),
            cache: RwLock::new(OfferCache::new()),
            buckets: Mutex::new(OfferBuckets::default()),
            events: EventBus::new(),
            alerts,
        });

        let pump_state = Arc::clone(&state);
        core.spawn_pump(move |event| {
            if let ChannelEvent::Frame(frame) = event {
                pump_state.handle_frame(&frame);
            }
        });

        Self { core, state, api }
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

    pub fn join_offers_room(&self) -> JoinOutcome {
        self.core.join(OFFERS_ROOM)
    }

    pub fn leave_offers_room(&self) -> bool {
        self.core.leave(&RoomId::from(OFFERS_ROOM))
    }

    pub fn offers(&self) -> Vec<PriceOffer> {
        self.state.cache.read().items().to_vec()
    }

    pub fn offer(&self, offer_id: &str) -> Option<PriceOffer> {
        self.state.cache.read().get(offer_id).cloned()
    }

    pub fn on_offer_event<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&OfferEvent) + Send + Sync + 'static,
    {
        self.state.events.subscribe(callback)
    }

    /// Snapshot of every bucket
    pub fn buckets(&self) -> OfferBuckets {
        self.state.buckets.lock().clone()
    }

    pub fn new_offers(&self) -> Vec<OfferEvent> {
        self.state.buckets.lock().new_offers.clone()
    }

    pub fn accepted_offers(&self) -> Vec<OfferEvent> {
        self.state.buckets.lock().accepted_offers.clone()
    }

    pub fn rejected_offers(&self) -> Vec<OfferEvent> {
        self.state.buckets.lock().rejected_offers.clone()
    }

    pub fn expired_offers(&self) -> Vec<OfferEvent> {
        self.state.buckets.lock().expired_offers.clone()
    }

    pub fn cancelled_offers(&self) -> Vec<OfferEvent> {
        self.state.buckets.lock().cancelled_offers.clone()
    }

    pub fn revoked_offers(&self) -> Vec<OfferEvent> {
        self.state.buckets.lock().revoked_offers.clone()
    }

    /// Consume the offer's pending events; a second call returns nothing
    pub fn clear_offer_event(&self, offer_id: &str) -> Vec<OfferEvent> {
        self.state.buckets.lock().take(offer_id)
    }

    pub fn clear_all_offer_events(&self) -> OfferBuckets {
        std::mem::take(&mut *self.state.buckets.lock())
    }

    pub async fn fetch_my_offers(&self, status: Option<OfferStatus>) -> Result<Vec<PriceOffer>> {
        let offers = self.core.track(self.api.my_offers(status).await)?;
        Ok(self.merge(offers))
    }

    pub async fn fetch_received_offers(
        &self,
        status: Option<OfferStatus>,
    ) -> Result<Vec<PriceOffer>> {
        let offers = self.core.track(self.api.received_offers(status).await)?;
        Ok(self.merge(offers))
    }

    /// Lists are filtered server-side, so they only ever add to the cache
    fn merge(&self, offers: Vec<PriceOffer>) -> Vec<PriceOffer> {
        let ids: Vec<String> = offers.iter().map(|o| o.id.clone()).collect();
        let mut cache = self.state.cache.write();
        let (next, report) =
            self.state
                .reducer
                .reconcile(std::mem::take(&mut *cache), offers, ReconcileMode::Append);
        *cache = next;
        debug!(
            "[offers] Reconciled {} offers ({} kept newer)",
            report.applied, report.kept_newer
        );
        ids.iter().filter_map(|id| cache.get(id).cloned()).collect()
    }

    /// Cancel a pending offer
    ///
    /// Offers in any other state are refused without contacting the server.
    pub async fn cancel_offer(&self, offer_id: &str) -> Result<()> {
        let Some(offer) = self.offer(offer_id) else {
            return self
                .core
                .track(Err(RealtimeError::OfferNotFound(offer_id.to_string())));
        };
        if offer.status != OfferStatus::Pending {
            return self.core.track(Err(RealtimeError::InvalidOfferState {
                offer_id: offer_id.to_string(),
                status: offer.status,
                action: "cancel",
            }));
        }

        self.core.track(self.api.cancel_offer(offer_id).await)?;

        let mut cache = self.state.cache.write();
        let version = cache
            .marks()
            .entity_version(offer_id)
            .unwrap_or(offer.updated_at);
        let at = Utc::now().max(version + Duration::milliseconds(1));
        let event = InboundEvent {
            entity_id: offer_id.to_string(),
            server_timestamp: at,
            delivery_id: None,
            actor_id: Some(self.state.reducer.local_user_id().to_string()),
            body: EventBody::Offer {
                transition: OfferTransition::Cancelled,
                offer,
                message: None,
            },
        };
        let reduced = self.state.reducer.apply(std::mem::take(&mut *cache), &event);
        *cache = reduced.cache;
        info!("[offers] Offer {} cancelled ({:?})", offer_id, reduced.outcome);
        Ok(())
    }
}
