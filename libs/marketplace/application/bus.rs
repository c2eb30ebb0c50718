//! Typed callback registry
//!
//! Subscribers get a [`SubscriptionToken`]; dropping it (or calling
//! [`SubscriptionToken::unsubscribe`]) removes the callback. Callbacks are
//! invoked outside the registry lock, so they may subscribe or unsubscribe.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

pub struct EventBus<T> {
    listeners: Arc<Mutex<Listeners<T>>>,
}

impl<T: 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.listeners);
        SubscriptionToken {
            remove: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.lock().callbacks.retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    pub fn emit(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self
            .listeners
            .lock()
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

/// Keeps a callback registered until dropped
#[must_use = "the callback is removed as soon as the token is dropped"]
pub struct SubscriptionToken {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionToken {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keep the callback for as long as the bus lives
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&total);
        let _a = bus.subscribe(move |n| {
            t1.fetch_add(*n as usize, Ordering::SeqCst);
        });
        let t2 = Arc::clone(&total);
        let _b = bus.subscribe(move |n| {
            t2.fetch_add(*n as usize, Ordering::SeqCst);
        });

        bus.emit(&5);
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_dropping_token_unsubscribes() {
        let bus = EventBus::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let token = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&());
        drop(token);
        bus.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_detached_token_stays_registered() {
        let bus = EventBus::<()>::new();
        bus.subscribe(|_| {}).detach();
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_callback_may_subscribe_during_emit() {
        let bus = EventBus::<()>::new();
        let inner_bus = bus.clone();
        let _token = bus.subscribe(move |_| {
            inner_bus.subscribe(|_| {}).detach();
        });

        bus.emit(&());
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_token_outliving_bus_is_harmless() {
        let bus = EventBus::<()>::new();
        let token = bus.subscribe(|_| {});
        drop(bus);
        token.unsubscribe();
    }
}
