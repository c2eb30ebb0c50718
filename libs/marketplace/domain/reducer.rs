//! Event-to-cache reconciliation
//!
//! Every cache is a newest-first list guarded by timestamp watermarks kept per
//! `(entity, field set)`. The reducer takes a cache by value and hands back the
//! next one together with what happened; it performs no I/O and reads no
//! clock, so the same inputs always produce the same cache.

use crate::domain::events::{EventBody, InboundEvent};
use crate::domain::models::{
    Conversation, Message, MessageStatus, Notification, OfferStatus, PriceOffer, Versioned,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Delivery ids remembered per cache before the oldest are pruned
pub const MAX_SEEN_DELIVERIES: usize = 10_000;

/// Independent groups of fields; each has its own watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSet {
    LastMessage,
    ReadState,
    MessageStatus,
    Content,
    OfferStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    IllegalTransition { from: OfferStatus, to: OfferStatus },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    DuplicateOrStale,
    Rejected(RejectReason),
    /// The event does not concern anything in this cache
    Ignored,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

#[derive(Debug, Clone)]
pub struct Reduced<C> {
    pub cache: C,
    pub outcome: Outcome,
}

// ============================================================================
// Watermarks
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct EntityMarks {
    /// Version of the last REST snapshot applied; bounds every field set
    floor: Option<DateTime<Utc>>,
    fields: HashMap<FieldSet, DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watermarks {
    entities: HashMap<String, EntityMarks>,
    seen_deliveries: HashSet<String>,
    seen_deliveries_order: VecDeque<String>,
}

impl Watermarks {
    /// Newest timestamp applied to this field set of the entity
    pub fn mark(&self, entity_id: &str, field: FieldSet) -> Option<DateTime<Utc>> {
        let marks = self.entities.get(entity_id)?;
        marks.floor.max(marks.fields.get(&field).copied())
    }

    /// Strictly newer than the watermark
    pub fn admits(&self, entity_id: &str, field: FieldSet, at: DateTime<Utc>) -> bool {
        self.mark(entity_id, field).map_or(true, |mark| at > mark)
    }

    /// Newest timestamp applied to any field set of the entity
    pub fn entity_version(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        let marks = self.entities.get(entity_id)?;
        marks
            .fields
            .values()
            .copied()
            .max()
            .max(marks.floor)
    }

    fn advance(&mut self, entity_id: &str, field: FieldSet, at: DateTime<Utc>) {
        let marks = self.entities.entry(entity_id.to_string()).or_default();
        let current = marks.fields.entry(field).or_insert(at);
        if at > *current {
            *current = at;
        }
    }

    /// Version of the last REST snapshot applied to the entity
    pub fn floor(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        self.entities.get(entity_id)?.floor
    }

    fn raise_floor(&mut self, entity_id: &str, at: DateTime<Utc>) {
        let marks = self.entities.entry(entity_id.to_string()).or_default();
        if marks.floor.map_or(true, |floor| at > floor) {
            marks.floor = Some(at);
        }
    }

    pub fn has_seen(&self, entity_id: &str, delivery_id: &str) -> bool {
        self.seen_deliveries
            .contains(&delivery_key(entity_id, delivery_id))
    }

    fn remember(&mut self, entity_id: &str, delivery_id: &str) {
        let key = delivery_key(entity_id, delivery_id);
        if !self.seen_deliveries.insert(key.clone()) {
            return;
        }
        self.seen_deliveries_order.push_back(key);

        while self.seen_deliveries_order.len() > MAX_SEEN_DELIVERIES {
            if let Some(oldest) = self.seen_deliveries_order.pop_front() {
                self.seen_deliveries.remove(&oldest);
            }
        }
    }

    pub fn seen_delivery_count(&self) -> usize {
        self.seen_deliveries.len()
    }
}

fn delivery_key(entity_id: &str, delivery_id: &str) -> String {
    format!("{}:{}", entity_id, delivery_id)
}

/// Messages are also remembered by id, so a redelivery under a new
/// delivery id is still recognised
fn message_key(message_id: &str) -> String {
    format!("message:{}", message_id)
}

// ============================================================================
// Sorted entity list
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// First page: the snapshot is the new truth, except for newer socket deliveries
    Replace,
    /// Later pages: merge into what is cached
    Append,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: usize,
    /// Snapshot rows skipped because the cache already held a newer version
    pub kept_newer: usize,
    /// Cached entities missing from the snapshot but newer than all of it
    pub retained: Vec<String>,
    pub dropped: usize,
}

/// Newest-first list of entities plus their watermarks
#[derive(Debug, Clone, PartialEq)]
pub struct EntityList<T> {
    items: Vec<T>,
    marks: Watermarks,
}

impl<T> Default for EntityList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            marks: Watermarks::default(),
        }
    }
}

impl<T: Versioned + Clone> EntityList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.entity_id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn marks(&self) -> &Watermarks {
        &self.marks
    }

    /// Not yet delivered and newer than the field set's watermark
    fn is_fresh(&self, event: &InboundEvent, field: FieldSet) -> bool {
        if let Some(delivery_id) = &event.delivery_id {
            if self.marks.has_seen(&event.entity_id, delivery_id) {
                return false;
            }
        }
        self.marks
            .admits(&event.entity_id, field, event.server_timestamp)
    }

    fn commit(&mut self, event: &InboundEvent, field: FieldSet) {
        self.marks
            .advance(&event.entity_id, field, event.server_timestamp);
        if let Some(delivery_id) = &event.delivery_id {
            self.marks.remember(&event.entity_id, delivery_id);
        }
    }

    /// Replace in place (keeping identity) or insert, then re-sort
    pub(crate) fn upsert(&mut self, item: T) {
        match self
            .items
            .iter()
            .position(|existing| existing.entity_id() == item.entity_id())
        {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
        self.resort();
    }

    /// Remove from the list; watermarks are kept so replays stay suppressed
    pub(crate) fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.items.iter().position(|item| item.entity_id() == id)?;
        Some(self.items.remove(index))
    }

    pub(crate) fn update<F: FnOnce(&mut T)>(&mut self, id: &str, change: F) -> bool {
        match self.items.iter_mut().find(|item| item.entity_id() == id) {
            Some(item) => {
                change(item);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    fn resort(&mut self) {
        self.items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    }

    /// Merge a REST snapshot using last-write-wins per entity
    pub fn reconcile(mut self, snapshot: Vec<T>, mode: ReconcileMode) -> (Self, ReconcileReport) {
        let mut report = ReconcileReport::default();
        let newest = snapshot.iter().map(Versioned::version).max();
        let snapshot_ids: HashSet<String> = snapshot
            .iter()
            .map(|item| item.entity_id().to_string())
            .collect();

        for incoming in snapshot {
            let id = incoming.entity_id().to_string();
            let version = incoming.version();

            if self
                .marks
                .entity_version(&id)
                .map_or(false, |cached| cached > version)
            {
                report.kept_newer += 1;
                continue;
            }

            self.marks.raise_floor(&id, version);
            match self.items.iter().position(|item| item.entity_id() == id) {
                Some(index) => self.items[index] = incoming,
                None => self.items.push(incoming),
            }
            report.applied += 1;
        }

        if mode == ReconcileMode::Replace {
            let before = self.items.len();
            let marks = &self.marks;
            let mut retained = Vec::new();

            self.items.retain(|item| {
                let id = item.entity_id();
                if snapshot_ids.contains(id) {
                    return true;
                }
                let keep = match (marks.entity_version(id), newest) {
                    (Some(cached), Some(newest)) => cached > newest,
                    _ => false,
                };
                if keep {
                    retained.push(id.to_string());
                }
                keep
            });

            report.dropped = before - self.items.len();
            report.retained = retained;
        }

        self.resort();
        (self, report)
    }
}

pub type ConversationCache = EntityList<Conversation>;
pub type OfferCache = EntityList<PriceOffer>;

impl EntityList<Conversation> {
    pub fn total_unread(&self) -> u32 {
        self.items.iter().map(|c| c.unread_count).sum()
    }
}

/// Notification feed with server-reported counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationCache {
    list: EntityList<Notification>,
    unread_count: u32,
    total: u32,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Notification] {
        self.list.items()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.list.get(id)
    }

    pub fn list(&self) -> &EntityList<Notification> {
        &self.list
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub(crate) fn set_unread_count(&mut self, unread: u32) {
        self.unread_count = unread;
    }

    pub(crate) fn set_total(&mut self, total: u32) {
        self.total = total;
    }

    /// Flip one notification to read. Returns false if it was missing or already read.
    pub(crate) fn set_read(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        let mut flipped = false;
        self.list.update(id, |n| {
            if !n.is_read {
                n.is_read = true;
                n.read_at = Some(at);
                flipped = true;
            }
        });
        if flipped {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        flipped
    }

    /// Undo [`Self::set_read`], but only if nothing newer touched the entry
    pub(crate) fn revert_read(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        let mut reverted = false;
        self.list.update(id, |n| {
            if n.is_read && n.read_at == Some(at) {
                n.is_read = false;
                n.read_at = None;
                reverted = true;
            }
        });
        if reverted {
            self.unread_count += 1;
        }
        reverted
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Notification> {
        let removed = self.list.remove(id)?;
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        self.total = self.total.saturating_sub(1);
        Some(removed)
    }

    /// Put back a removed notification unless it was re-added meanwhile
    pub(crate) fn restore(&mut self, notification: Notification) -> bool {
        if self.list.contains(&notification.id) {
            return false;
        }
        if !notification.is_read {
            self.unread_count += 1;
        }
        self.total += 1;
        self.list.upsert(notification);
        true
    }

    pub(crate) fn clear(&mut self) -> (Vec<Notification>, u32, u32) {
        let removed = self.list.clear();
        let unread = std::mem::take(&mut self.unread_count);
        let total = std::mem::take(&mut self.total);
        (removed, unread, total)
    }

    /// Apply a REST page; counters come from the server plus anything newer kept locally
    pub fn reconcile_page(
        mut self,
        snapshot: Vec<Notification>,
        mode: ReconcileMode,
        server_unread: u32,
        server_total: u32,
    ) -> (Self, ReconcileReport) {
        let (list, report) = self.list.reconcile(snapshot, mode);
        self.list = list;

        let extra_unread = report
            .retained
            .iter()
            .filter(|id| self.list.get(id).map_or(false, |n| !n.is_read))
            .count() as u32;

        self.unread_count = server_unread + extra_unread;
        self.total = (server_total + report.retained.len() as u32).max(self.list.len() as u32);
        (self, report)
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// A cache the reducer knows how to advance
pub trait Reducible: Sized {
    fn reduce(self, reducer: &EventReducer, event: &InboundEvent) -> Reduced<Self>;
}

/// Pure event reducer bound to the signed-in user (for self-echo suppression)
#[derive(Debug, Clone)]
pub struct EventReducer {
    local_user_id: String,
}

impl EventReducer {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn apply<C: Reducible>(&self, cache: C, event: &InboundEvent) -> Reduced<C> {
        let reduced = cache.reduce(self, event);
        if !reduced.outcome.is_applied() {
            debug!(
                "[Reducer] {} for {} -> {:?}",
                event.kind(),
                event.entity_id,
                reduced.outcome
            );
        }
        reduced
    }

    pub fn reconcile<T: Versioned + Clone>(
        &self,
        cache: EntityList<T>,
        snapshot: Vec<T>,
        mode: ReconcileMode,
    ) -> (EntityList<T>, ReconcileReport) {
        cache.reconcile(snapshot, mode)
    }

    fn is_local(&self, actor_id: Option<&str>) -> bool {
        actor_id == Some(self.local_user_id.as_str())
    }
}

impl Reducible for ConversationCache {
    fn reduce(mut self, reducer: &EventReducer, event: &InboundEvent) -> Reduced<Self> {
        let outcome = match &event.body {
            EventBody::NewMessage(message) => self.apply_new_message(reducer, event, message),
            EventBody::MessageStatus { message_id, status } => {
                self.apply_message_status(event, message_id, *status)
            }
            EventBody::ConversationRead => self.apply_conversation_read(reducer, event),
            _ => Outcome::Ignored,
        };
        Reduced {
            cache: self,
            outcome,
        }
    }
}

impl EntityList<Conversation> {
    /// Every message not seen before counts toward unread and is reported;
    /// only the conversation's last-message projection follows the watermark
    fn apply_new_message(
        &mut self,
        reducer: &EventReducer,
        event: &InboundEvent,
        message: &Message,
    ) -> Outcome {
        let entity_id = event.entity_id.as_str();
        let message_key = message_key(&message.id);
        let redelivered = event
            .delivery_id
            .as_deref()
            .map_or(false, |delivery_id| self.marks.has_seen(entity_id, delivery_id));
        let already_last = self
            .get(entity_id)
            .map_or(false, |c| c.last_message_id.as_deref() == Some(message.id.as_str()));
        if redelivered || already_last || self.marks.has_seen(entity_id, &message_key) {
            return Outcome::DuplicateOrStale;
        }
        // Already counted by the last REST snapshot
        if self
            .marks
            .floor(entity_id)
            .map_or(false, |floor| event.server_timestamp <= floor)
        {
            return Outcome::DuplicateOrStale;
        }

        let mut conversation = match self.get(entity_id) {
            Some(existing) => existing.clone(),
            None => {
                let mut stub = Conversation::from_first_message(message);
                stub.id = event.entity_id.clone();
                stub
            }
        };
        if self
            .marks
            .admits(entity_id, FieldSet::LastMessage, event.server_timestamp)
        {
            conversation.apply_last_message(message);
            self.marks
                .advance(entity_id, FieldSet::LastMessage, event.server_timestamp);
        }
        if !reducer.is_local(event.actor_id.as_deref()) {
            conversation.unread_count += 1;
        }

        self.upsert(conversation);
        self.marks.remember(entity_id, &message_key);
        if let Some(delivery_id) = &event.delivery_id {
            self.marks.remember(entity_id, delivery_id);
        }
        Outcome::Applied
    }

    fn apply_message_status(
        &mut self,
        event: &InboundEvent,
        message_id: &str,
        status: MessageStatus,
    ) -> Outcome {
        let Some(conversation) = self.get(&event.entity_id) else {
            return Outcome::Ignored;
        };
        if conversation.last_message_id.as_deref() != Some(message_id) {
            return Outcome::Ignored;
        }
        if !self.is_fresh(event, FieldSet::MessageStatus) {
            return Outcome::DuplicateOrStale;
        }

        let mut updated = conversation.clone();
        updated.last_message_status = Some(status);
        self.upsert(updated);
        self.commit(event, FieldSet::MessageStatus);
        Outcome::Applied
    }

    fn apply_conversation_read(&mut self, reducer: &EventReducer, event: &InboundEvent) -> Outcome {
        let Some(conversation) = self.get(&event.entity_id) else {
            return Outcome::Ignored;
        };
        if !self.is_fresh(event, FieldSet::ReadState) {
            return Outcome::DuplicateOrStale;
        }

        let mut updated = conversation.clone();
        if reducer.is_local(event.actor_id.as_deref()) {
            // Read on another device
            updated.unread_count = 0;
        } else if updated.last_message_sender_id.as_deref() == Some(reducer.local_user_id()) {
            updated.last_message_status = Some(MessageStatus::Seen);
        }

        self.upsert(updated);
        self.commit(event, FieldSet::ReadState);
        Outcome::Applied
    }
}

impl Reducible for NotificationCache {
    fn reduce(mut self, reducer: &EventReducer, event: &InboundEvent) -> Reduced<Self> {
        let outcome = match &event.body {
            EventBody::NewNotification(notification) => {
                self.apply_new_notification(reducer, event, notification)
            }
            EventBody::NotificationRead => self.apply_notification_read(event),
            _ => Outcome::Ignored,
        };
        Reduced {
            cache: self,
            outcome,
        }
    }
}

impl NotificationCache {
    fn apply_new_notification(
        &mut self,
        reducer: &EventReducer,
        event: &InboundEvent,
        notification: &Notification,
    ) -> Outcome {
        if !self.list.is_fresh(event, FieldSet::Content) {
            return Outcome::DuplicateOrStale;
        }

        let mut incoming = notification.clone();
        incoming.id = event.entity_id.clone();

        // A read receipt that overtook the notification itself
        if let Some(read_at) = self.list.marks.mark(&event.entity_id, FieldSet::ReadState) {
            if read_at >= event.server_timestamp && !incoming.is_read {
                incoming.is_read = true;
                incoming.read_at = Some(read_at);
            }
        }

        match self.list.get(&event.entity_id) {
            Some(existing) => {
                if existing.is_read && !incoming.is_read {
                    incoming.is_read = true;
                    incoming.read_at = existing.read_at;
                }
                if !existing.is_read && incoming.is_read {
                    self.unread_count = self.unread_count.saturating_sub(1);
                }
            }
            None => {
                if !incoming.is_read && !reducer.is_local(event.actor_id.as_deref()) {
                    self.unread_count += 1;
                }
                self.total += 1;
            }
        }

        self.list.upsert(incoming);
        self.list.commit(event, FieldSet::Content);
        Outcome::Applied
    }

    fn apply_notification_read(&mut self, event: &InboundEvent) -> Outcome {
        if !self.list.is_fresh(event, FieldSet::ReadState) {
            return Outcome::DuplicateOrStale;
        }

        // Recorded even when the notification is not cached yet, so a late
        // `new_notification` lands as read
        let outcome = if self.list.contains(&event.entity_id) {
            self.set_read(&event.entity_id, event.server_timestamp);
            Outcome::Applied
        } else {
            Outcome::Ignored
        };
        self.list.commit(event, FieldSet::ReadState);
        outcome
    }
}

impl Reducible for OfferCache {
    fn reduce(mut self, _reducer: &EventReducer, event: &InboundEvent) -> Reduced<Self> {
        let outcome = match &event.body {
            EventBody::Offer {
                transition, offer, ..
            } => self.apply_offer(event, offer, transition.target_status()),
            _ => Outcome::Ignored,
        };
        Reduced {
            cache: self,
            outcome,
        }
    }
}

impl EntityList<PriceOffer> {
    fn apply_offer(&mut self, event: &InboundEvent, offer: &PriceOffer, target: OfferStatus) -> Outcome {
        if !self.is_fresh(event, FieldSet::OfferStatus) {
            return Outcome::DuplicateOrStale;
        }

        if let Some(existing) = self.get(&event.entity_id) {
            if !existing.status.can_transition_to(target) {
                return Outcome::Rejected(RejectReason::IllegalTransition {
                    from: existing.status,
                    to: target,
                });
            }
        }

        let mut incoming = offer.clone();
        incoming.id = event.entity_id.clone();
        incoming.status = target;
        if event.server_timestamp > incoming.updated_at {
            incoming.updated_at = event.server_timestamp;
        }

        self.upsert(incoming);
        self.commit(event, FieldSet::OfferStatus);
        Outcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OfferTransition;
    use crate::domain::models::{MessageType, NotificationPriority};
    use chrono::{Duration, TimeZone};

    const ME: &str = "me";

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn message(id: &str, conversation: &str, sender: &str, ts: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation.to_string(),
            sender_id: sender.to_string(),
            sender_role: None,
            sender_name: None,
            message_type: MessageType::Text,
            content: format!("body of {}", id),
            status: MessageStatus::Sent,
            created_at: at(ts),
        }
    }

    fn new_message(conversation: &str, sender: &str, id: &str, ts: i64) -> InboundEvent {
        InboundEvent {
            entity_id: conversation.to_string(),
            server_timestamp: at(ts),
            delivery_id: Some(format!("dlv-{}", id)),
            actor_id: Some(sender.to_string()),
            body: EventBody::NewMessage(message(id, conversation, sender, ts)),
        }
    }

    fn notification(id: &str, ts: i64) -> Notification {
        Notification {
            id: id.to_string(),
            user_id: ME.to_string(),
            kind: "booking".to_string(),
            category: None,
            priority: NotificationPriority::Normal,
            title: format!("title {}", id),
            message: "body".to_string(),
            data: None,
            action_url: None,
            is_read: false,
            created_at: at(ts),
            read_at: None,
        }
    }

    fn new_notification(id: &str, ts: i64) -> InboundEvent {
        InboundEvent {
            entity_id: id.to_string(),
            server_timestamp: at(ts),
            delivery_id: Some(format!("dlv-{}", id)),
            actor_id: Some("system".to_string()),
            body: EventBody::NewNotification(notification(id, ts)),
        }
    }

    fn notification_read(id: &str, ts: i64) -> InboundEvent {
        InboundEvent {
            entity_id: id.to_string(),
            server_timestamp: at(ts),
            delivery_id: None,
            actor_id: Some(ME.to_string()),
            body: EventBody::NotificationRead,
        }
    }

    fn offer(id: &str, status: OfferStatus, ts: i64) -> PriceOffer {
        PriceOffer {
            id: id.to_string(),
            user_id: ME.to_string(),
            professional_id: "pro".to_string(),
            service_type: Some("plumbing".to_string()),
            description: None,
            offered_price: 120.0,
            status,
            created_at: at(0),
            updated_at: at(ts),
            expires_at: None,
            response_message: None,
            booking_id: None,
        }
    }

    fn offer_event(id: &str, transition: OfferTransition, ts: i64) -> InboundEvent {
        InboundEvent {
            entity_id: id.to_string(),
            server_timestamp: at(ts),
            delivery_id: Some(format!("dlv-{}-{}", id, ts)),
            actor_id: Some("pro".to_string()),
            body: EventBody::Offer {
                transition,
                offer: offer(id, OfferStatus::Pending, 0),
                message: None,
            },
        }
    }

    fn apply_all<C: Reducible>(reducer: &EventReducer, cache: C, events: &[InboundEvent]) -> C {
        events
            .iter()
            .fold(cache, |cache, event| reducer.apply(cache, event).cache)
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let reducer = EventReducer::new(ME);
        let event = new_message("c1", "u2", "m1", 10);

        let once = reducer.apply(ConversationCache::new(), &event);
        assert_eq!(once.outcome, Outcome::Applied);

        let twice = reducer.apply(once.cache.clone(), &event);
        assert_eq!(twice.outcome, Outcome::DuplicateOrStale);
        assert_eq!(twice.cache, once.cache);
        assert_eq!(twice.cache.total_unread(), 1);
    }

    #[test]
    fn test_older_message_counts_but_keeps_newer_preview() {
        let reducer = EventReducer::new(ME);
        let newer = new_message("c1", "u2", "m2", 20);
        let older = new_message("c1", "u2", "m1", 10);

        let cache = apply_all(&reducer, ConversationCache::new(), &[newer]);
        let result = reducer.apply(cache, &older);

        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(result.cache.total_unread(), 2);
        assert_eq!(
            result.cache.get("c1").and_then(|c| c.last_message_id.clone()),
            Some("m2".to_string())
        );
        assert_eq!(
            result.cache.marks().mark("c1", FieldSet::LastMessage),
            Some(at(20))
        );
    }

    #[test]
    fn test_out_of_order_messages_all_count() {
        let reducer = EventReducer::new(ME);
        let mut cache = ConversationCache::new();
        let mut outcomes = Vec::new();
        for event in [
            new_message("c1", "alice", "m3", 3),
            new_message("c1", "bob", "m1", 1),
            new_message("c1", "alice", "m2", 2),
        ] {
            let reduced = reducer.apply(cache, &event);
            outcomes.push(reduced.outcome);
            cache = reduced.cache;
        }

        assert_eq!(outcomes, vec![Outcome::Applied; 3]);
        assert_eq!(cache.total_unread(), 3);
        assert_eq!(
            cache.get("c1").and_then(|c| c.last_message_id.clone()),
            Some("m3".to_string())
        );
    }

    #[test]
    fn test_same_timestamp_messages_from_different_senders() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            ConversationCache::new(),
            &[new_message("c1", "alice", "m1", 5), new_message("c1", "bob", "m2", 5)],
        );
        assert_eq!(cache.total_unread(), 2);
    }

    #[test]
    fn test_message_redelivered_under_new_delivery_id_is_duplicate() {
        let reducer = EventReducer::new(ME);
        let first = new_message("c1", "u2", "m1", 10);
        let mut again = first.clone();
        again.delivery_id = Some("dlv-retry".to_string());

        let cache = apply_all(&reducer, ConversationCache::new(), &[first]);
        let result = reducer.apply(cache.clone(), &again);
        assert_eq!(result.outcome, Outcome::DuplicateOrStale);
        assert_eq!(result.cache, cache);

        // Without any delivery id the message id still identifies it
        let mut bare = new_message("c1", "u2", "m0", 5);
        bare.delivery_id = None;
        let cache = apply_all(&reducer, result.cache, &[bare.clone(), bare]);
        assert_eq!(cache.total_unread(), 2);
    }

    #[test]
    fn test_unread_counts_only_other_senders() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            ConversationCache::new(),
            &[
                new_message("c1", "u2", "m1", 1),
                new_message("c1", "u3", "m2", 2),
                new_message("c1", "u2", "m3", 3),
            ],
        );
        assert_eq!(cache.total_unread(), 3);

        let cache = apply_all(&reducer, cache, &[new_message("c1", ME, "m4", 4)]);
        assert_eq!(cache.total_unread(), 3);
        assert_eq!(
            cache.get("c1").and_then(|c| c.last_message_sender_id.clone()),
            Some(ME.to_string())
        );
    }

    #[test]
    fn test_conversations_sorted_newest_first() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            ConversationCache::new(),
            &[
                new_message("c1", "u2", "m1", 1),
                new_message("c2", "u2", "m2", 2),
                new_message("c3", "u2", "m3", 3),
                new_message("c1", "u2", "m4", 4),
            ],
        );
        let order: Vec<&str> = cache.items().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["c1", "c3", "c2"]);
    }

    #[test]
    fn test_read_by_local_user_on_other_device_clears_unread() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            ConversationCache::new(),
            &[new_message("c1", "u2", "m1", 1), new_message("c1", "u2", "m2", 2)],
        );
        let read = InboundEvent {
            entity_id: "c1".to_string(),
            server_timestamp: at(3),
            delivery_id: None,
            actor_id: Some(ME.to_string()),
            body: EventBody::ConversationRead,
        };

        let result = reducer.apply(cache, &read);
        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(result.cache.total_unread(), 0);
    }

    #[test]
    fn test_read_by_peer_marks_own_last_message_seen() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(&reducer, ConversationCache::new(), &[new_message("c1", ME, "m1", 1)]);
        let read = InboundEvent {
            entity_id: "c1".to_string(),
            server_timestamp: at(2),
            delivery_id: None,
            actor_id: Some("u2".to_string()),
            body: EventBody::ConversationRead,
        };

        let cache = reducer.apply(cache, &read).cache;
        assert_eq!(
            cache.get("c1").and_then(|c| c.last_message_status),
            Some(MessageStatus::Seen)
        );
    }

    #[test]
    fn test_status_change_for_older_message_is_ignored() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            ConversationCache::new(),
            &[new_message("c1", ME, "m1", 1), new_message("c1", ME, "m2", 2)],
        );
        let status = InboundEvent {
            entity_id: "c1".to_string(),
            server_timestamp: at(3),
            delivery_id: None,
            actor_id: Some("u2".to_string()),
            body: EventBody::MessageStatus {
                message_id: "m1".to_string(),
                status: MessageStatus::Delivered,
            },
        };

        let result = reducer.apply(cache, &status);
        assert_eq!(result.outcome, Outcome::Ignored);
    }

    #[test]
    fn test_field_sets_have_independent_watermarks() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(&reducer, ConversationCache::new(), &[new_message("c1", ME, "m1", 10)]);

        // Older than the last message but first for the status field set
        let status = InboundEvent {
            entity_id: "c1".to_string(),
            server_timestamp: at(5),
            delivery_id: None,
            actor_id: Some("u2".to_string()),
            body: EventBody::MessageStatus {
                message_id: "m1".to_string(),
                status: MessageStatus::Delivered,
            },
        };
        let result = reducer.apply(cache, &status);
        assert_eq!(result.outcome, Outcome::Applied);
    }

    #[test]
    fn test_delivery_memory_is_bounded() {
        let mut marks = Watermarks::default();
        for i in 0..(MAX_SEEN_DELIVERIES + 5) {
            marks.remember("e", &i.to_string());
        }
        assert_eq!(marks.seen_delivery_count(), MAX_SEEN_DELIVERIES);
        assert!(!marks.has_seen("e", "0"));
        assert!(marks.has_seen("e", &(MAX_SEEN_DELIVERIES + 4).to_string()));
    }

    #[test]
    fn test_rest_snapshot_and_socket_event_converge_on_newest() {
        let reducer = EventReducer::new(ME);
        let mut stale = Conversation::from_first_message(&message("m1", "c1", "u2", 5));
        stale.apply_last_message(&message("m1", "c1", "u2", 5));
        let socket = new_message("c1", "u2", "m2", 10);

        // Socket first, then an older snapshot
        let cache = reducer.apply(ConversationCache::new(), &socket).cache;
        let (socket_first, report) =
            reducer.reconcile(cache, vec![stale.clone()], ReconcileMode::Replace);
        assert_eq!(report.kept_newer, 1);

        // Snapshot first, then the socket event
        let (cache, _) = reducer.reconcile(ConversationCache::new(), vec![stale], ReconcileMode::Replace);
        let rest_first = reducer.apply(cache, &socket).cache;

        for cache in [&socket_first, &rest_first] {
            assert_eq!(
                cache.get("c1").and_then(|c| c.last_message_id.clone()),
                Some("m2".to_string())
            );
        }
    }

    #[test]
    fn test_snapshot_floor_rejects_older_socket_events() {
        let reducer = EventReducer::new(ME);
        let mut fresh = Conversation::from_first_message(&message("m9", "c1", "u2", 50));
        fresh.apply_last_message(&message("m9", "c1", "u2", 50));

        let (cache, _) = reducer.reconcile(ConversationCache::new(), vec![fresh], ReconcileMode::Replace);
        let result = reducer.apply(cache, &new_message("c1", "u2", "m1", 20));
        assert_eq!(result.outcome, Outcome::DuplicateOrStale);
    }

    #[test]
    fn test_replace_keeps_newer_socket_entities_and_drops_the_rest() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            ConversationCache::new(),
            &[new_message("old", "u2", "m1", 1), new_message("live", "u2", "m2", 100)],
        );
        let mut listed = Conversation::from_first_message(&message("m3", "c9", "u2", 50));
        listed.apply_last_message(&message("m3", "c9", "u2", 50));

        let (cache, report) = reducer.reconcile(cache, vec![listed], ReconcileMode::Replace);
        let ids: Vec<&str> = cache.items().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["live", "c9"]);
        assert_eq!(report.retained, vec!["live".to_string()]);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn test_append_mode_keeps_everything() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(&reducer, ConversationCache::new(), &[new_message("c1", "u2", "m1", 1)]);
        let mut listed = Conversation::from_first_message(&message("m3", "c9", "u2", 50));
        listed.apply_last_message(&message("m3", "c9", "u2", 50));

        let (cache, report) = reducer.reconcile(cache, vec![listed], ReconcileMode::Append);
        assert_eq!(cache.len(), 2);
        assert_eq!(report.dropped, 0);
    }

    #[test]
    fn test_read_receipt_before_notification_lands_as_read() {
        let reducer = EventReducer::new(ME);
        let early_read = reducer.apply(NotificationCache::new(), &notification_read("n1", 20));
        assert_eq!(early_read.outcome, Outcome::Ignored);

        let cache = reducer.apply(early_read.cache, &new_notification("n1", 10)).cache;
        assert_eq!(cache.get("n1").map(|n| n.is_read), Some(true));
        assert_eq!(cache.unread_count(), 0);
        assert_eq!(cache.total(), 1);
    }

    #[test]
    fn test_notification_read_decrements_unread_once() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            NotificationCache::new(),
            &[new_notification("n1", 1), new_notification("n2", 2)],
        );
        assert_eq!(cache.unread_count(), 2);

        let read = notification_read("n1", 3);
        let cache = apply_all(&reducer, cache, &[read.clone(), read]);
        assert_eq!(cache.unread_count(), 1);
        assert_eq!(cache.items()[0].id, "n2");
    }

    #[test]
    fn test_notification_from_self_does_not_raise_unread() {
        let reducer = EventReducer::new(ME);
        let mut event = new_notification("n1", 1);
        event.actor_id = Some(ME.to_string());

        let cache = reducer.apply(NotificationCache::new(), &event).cache;
        assert_eq!(cache.unread_count(), 0);
        assert_eq!(cache.total(), 1);
    }

    #[test]
    fn test_notification_page_keeps_newer_unread_counted() {
        let reducer = EventReducer::new(ME);
        let cache = reducer.apply(NotificationCache::new(), &new_notification("live", 100)).cache;

        let (cache, report) =
            cache.reconcile_page(vec![notification("n1", 10)], ReconcileMode::Replace, 4, 9);
        assert_eq!(report.retained, vec!["live".to_string()]);
        assert_eq!(cache.unread_count(), 5);
        assert_eq!(cache.total(), 10);
    }

    #[test]
    fn test_local_mutations_restore_exactly() {
        let reducer = EventReducer::new(ME);
        let mut cache = apply_all(
            &reducer,
            NotificationCache::new(),
            &[new_notification("n1", 1), new_notification("n2", 2)],
        );
        let original = cache.clone();

        assert!(cache.set_read("n1", at(5)));
        assert!(!cache.set_read("n1", at(6)));
        assert!(cache.revert_read("n1", at(5)));

        let removed = cache.remove("n2").unwrap();
        assert_eq!(cache.total(), 1);
        assert!(cache.restore(removed));

        assert_eq!(cache.items(), original.items());
        assert_eq!(cache.unread_count(), original.unread_count());
        assert_eq!(cache.total(), original.total());
    }

    #[test]
    fn test_offer_lifecycle_rejects_leaving_terminal_states() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            OfferCache::new(),
            &[
                offer_event("o1", OfferTransition::Created, 1),
                offer_event("o1", OfferTransition::Accepted, 2),
            ],
        );
        assert_eq!(cache.get("o1").map(|o| o.status), Some(OfferStatus::Accepted));

        let rejected = reducer.apply(cache.clone(), &offer_event("o1", OfferTransition::Cancelled, 3));
        assert_eq!(
            rejected.outcome,
            Outcome::Rejected(RejectReason::IllegalTransition {
                from: OfferStatus::Accepted,
                to: OfferStatus::Cancelled,
            })
        );
        assert_eq!(rejected.cache, cache);

        let revoked = reducer.apply(cache, &offer_event("o1", OfferTransition::Revoked, 4));
        assert_eq!(revoked.outcome, Outcome::Applied);
        assert_eq!(revoked.cache.get("o1").map(|o| o.updated_at), Some(at(4)));

        let reopened = reducer.apply(revoked.cache, &offer_event("o1", OfferTransition::Created, 5));
        assert!(matches!(reopened.outcome, Outcome::Rejected(_)));
    }

    #[test]
    fn test_rest_reconcile_may_leave_terminal_state() {
        let reducer = EventReducer::new(ME);
        let cache = apply_all(
            &reducer,
            OfferCache::new(),
            &[offer_event("o1", OfferTransition::Rejected, 1)],
        );

        let (cache, _) = reducer.reconcile(
            cache,
            vec![offer("o1", OfferStatus::Pending, 9)],
            ReconcileMode::Replace,
        );
        assert_eq!(cache.get("o1").map(|o| o.status), Some(OfferStatus::Pending));
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let reducer = EventReducer::new(ME);
        let result = reducer.apply(OfferCache::new(), &new_message("c1", "u2", "m1", 1));
        assert_eq!(result.outcome, Outcome::Ignored);
        assert!(result.cache.is_empty());
    }
}
