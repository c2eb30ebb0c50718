//! Conversations, typing indicators and presence

use crate::application::bus::{EventBus, SubscriptionToken};
use crate::application::facade::FacadeCore;
use crate::domain::events::{decode, EventBody, InboundEvent, Namespace};
use crate::domain::models::{Conversation, Message, MessageStatus};
use crate::domain::presence::PresenceTracker;
use crate::domain::reducer::{ConversationCache, EventReducer, Outcome, ReconcileMode};
use crate::infrastructure::api::MarketplaceApi;
use crate::infrastructure::config::PresenceConfig;
use crate::infrastructure::error::{RealtimeError, Result};
use hypersockets::{control_frame, ChannelEvent, ChannelHandle, ConnectionState, JoinOutcome, RoomId, WsMessage};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub conversation_id: String,
    pub message_id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUpdate {
    pub conversation_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub online: bool,
}

struct MessagesState {
    reducer: EventReducer,
    cache: RwLock<ConversationCache>,
    presence: Mutex<PresenceTracker>,
    active_conversation: RwLock<Option<String>>,
    new_messages: EventBus<Message>,
    statuses: EventBus<StatusUpdate>,
    typing: EventBus<TypingUpdate>,
    presence_changes: EventBus<PresenceUpdate>,
}

impl MessagesState {
    fn reduce(&self, event: &InboundEvent) -> Outcome {
        let mut cache = self.cache.write();
        let reduced = self.reducer.apply(std::mem::take(&mut *cache), event);
        *cache = reduced.cache;
        reduced.outcome
    }

    fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(frame) => self.handle_frame(&frame),
            ChannelEvent::StateChanged(ConnectionState::Reconnecting) => {
                // Presence is only known for the live session
                self.presence.lock().reset();
            }
            _ => {}
        }
    }

    fn handle_frame(&self, frame: &WsMessage) {
        let event = match decode(Namespace::Messages, frame) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!("[messages] Dropping undecodable frame: {}", e);
                return;
            }
        };

        match &event.body {
            EventBody::Typing { user_id, is_typing } => {
                if user_id == self.reducer.local_user_id() {
                    return;
                }
                self.typing.emit(&TypingUpdate {
                    conversation_id: event.entity_id.clone(),
                    user_id: user_id.clone(),
                    is_typing: *is_typing,
                });
            }
            EventBody::Presence { user_id, online } => {
                {
                    let mut presence = self.presence.lock();
                    if *online {
                        presence.set_online(user_id);
                    } else {
                        presence.set_offline(user_id);
                    }
                }
                self.presence_changes.emit(&PresenceUpdate {
                    user_id: user_id.clone(),
                    online: *online,
                });
            }
            EventBody::NewMessage(message) => {
                if self.reduce(&event).is_applied() {
                    self.new_messages.emit(message);
                }
            }
            EventBody::MessageStatus { message_id, status } => {
                if self.reduce(&event).is_applied() {
                    self.statuses.emit(&StatusUpdate {
                        conversation_id: event.entity_id.clone(),
                        message_id: message_id.clone(),
                        status: *status,
                    });
                }
            }
            _ => {
                self.reduce(&event);
            }
        }
    }

    fn sweep_presence(&self) {
        let expired = self.presence.lock().sweep(Instant::now());
        for user_id in expired {
            debug!("[messages] {} went quiet, marking offline", user_id);
            self.presence_changes.emit(&PresenceUpdate {
                user_id,
                online: false,
            });
        }
    }
}

/// Conversation list, message events and who is online
pub struct MessagesFacade {
    core: FacadeCore,
    state: Arc<MessagesState>,
    api: Arc<dyn MarketplaceApi>,
}

impl MessagesFacade {
    pub(crate) fn start(
        handle: ChannelHandle,
        api: Arc<dyn MarketplaceApi>,
        user_id: &str,
        presence: &PresenceConfig,
    ) -> Self {
        let core = FacadeCore::new(Namespace::Messages, handle);
        let state = Arc::new(MessagesState {
            reducer: EventReducer::new(user_id),
            cache: RwLock::new(ConversationCache::new()),
            presence: Mutex::new(PresenceTracker::new(presence.timeout())),
            active_conversation: RwLock::new(None),
            new_messages: EventBus::new(),
            statuses: EventBus::new(),
            typing: EventBus::new(),
            presence_changes: EventBus::new(),
        });

        let pump_state = Arc::clone(&state);
        core.spawn_pump(move |event| pump_state.handle_event(event));

        let sweep_state = Arc::clone(&state);
        let alive = core.alive();
        let period = presence.sweep_interval();
        core.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !alive.load(Ordering::Acquire) {
                    break;
                }
                sweep_state.sweep_presence();
            }
        });

        Self { core, state, api }
    }

    pub fn current_user_id(&self) -> &str {
        self.state.reducer.local_user_id()
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

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.cache.read().items().to_vec()
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.state.cache.read().get(conversation_id).cloned()
    }

    pub fn unread_count(&self) -> u32 {
        self.state.cache.read().total_unread()
    }

    pub fn is_user_online(&self, user_id: &str) -> bool {
        self.state.presence.lock().is_online(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.state.presence.lock().online_users_at(Instant::now())
    }

    pub fn on_new_message<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.state.new_messages.subscribe(callback)
    }

    pub fn on_message_status<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        self.state.statuses.subscribe(callback)
    }

    pub fn on_typing<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&TypingUpdate) + Send + Sync + 'static,
    {
        self.state.typing.subscribe(callback)
    }

    pub fn on_presence<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&PresenceUpdate) + Send + Sync + 'static,
    {
        self.state.presence_changes.subscribe(callback)
    }

    pub fn join_conversation(&self, conversation_id: &str) -> JoinOutcome {
        self.core.join(conversation_id)
    }

    pub fn leave_conversation(&self, conversation_id: &str) -> bool {
        self.core.leave(&RoomId::from(conversation_id))
    }

    pub fn is_joined(&self, conversation_id: &str) -> bool {
        self.core.handle().is_joined(&RoomId::from(conversation_id))
    }

    pub fn emit_typing(&self, conversation_id: &str, is_typing: bool) -> Result<()> {
        self.core.send(control_frame(
            "typing",
            json!({ "conversation_id": conversation_id, "is_typing": is_typing }),
        ))
    }

    pub fn emit_message_seen(&self, message_id: &str, conversation_id: &str) -> Result<()> {
        self.core.send(control_frame(
            "message_seen",
            json!({ "message_id": message_id, "conversation_id": conversation_id }),
        ))
    }

    /// The conversation currently on screen, if any
    pub fn active_conversation(&self) -> Option<String> {
        self.state.active_conversation.read().clone()
    }

    pub fn set_active_conversation(&self, conversation_id: Option<String>) {
        *self.state.active_conversation.write() = conversation_id;
    }

    /// Reload the conversation list; newer socket updates survive the reload
    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let page = self.core.track(self.api.list_conversations().await)?;

        let mut cache = self.state.cache.write();
        let (next, report) = self.state.reducer.reconcile(
            std::mem::take(&mut *cache),
            page.conversations,
            ReconcileMode::Replace,
        );
        *cache = next;
        debug!(
            "[messages] Conversations reconciled: {} applied, {} kept newer, {} dropped",
            report.applied, report.kept_newer, report.dropped
        );
        Ok(cache.items().to_vec())
    }

    /// Zero the unread counter now; restored if the server call fails
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        let mut previous = None;
        self.state.cache.write().update(conversation_id, |c| {
            previous = Some(c.unread_count);
            c.unread_count = 0;
        });

        let result = self.api.mark_conversation_read(conversation_id).await;
        if result.is_err() {
            if let Some(previous) = previous {
                self.state.cache.write().update(conversation_id, |c| {
                    // Leave it alone if new messages arrived meanwhile
                    if c.unread_count == 0 {
                        c.unread_count = previous;
                    }
                });
            }
        }
        self.core.track(result)
    }
}
