//! Subscription registry for typed events
//!
//! Status-change notifications are delivered to subscribers either over a
//! channel or through a callback. Subscriptions end with an explicit
//! `unsubscribe`; a channel subscriber whose receiver was dropped is pruned on
//! the next publish.
//!
//! Callbacks run on the publishing thread, after the registry lock has been
//! released, so a callback may itself subscribe or publish.

use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

enum Subscriber<E> {
    Channel(Sender<E>),
    Callback(Callback<E>),
}

struct Registry<E> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber<E>)>,
}

/// Registry of subscribers for one event type
pub struct EventBus<E> {
    registry: Mutex<Registry<E>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    fn add(&self, subscriber: Subscriber<E>) -> SubscriptionId {
        let mut registry = self.registry.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.push((id, subscriber));
        id
    }

    /// Subscribe with a channel
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<E>) {
        let (tx, rx) = mpsc::channel();
        (self.add(Subscriber::Channel(tx)), rx)
    }

    /// Subscribe with a callback
    pub fn subscribe_fn(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        self.add(Subscriber::Callback(Arc::new(callback)))
    }

    /// Remove a subscription
    ///
    /// Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        registry.subscribers.len() != before
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Deliver an event to every subscriber
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: &E) -> usize {
        let mut delivered = 0;
        let mut callbacks = Vec::new();
        {
            let mut registry = self.registry.lock();
            registry.subscribers.retain(|(_, subscriber)| match subscriber {
                Subscriber::Channel(tx) => {
                    let alive = tx.send(event.clone()).is_ok();
                    if alive {
                        delivered += 1;
                    }
                    alive
                }
                Subscriber::Callback(cb) => {
                    callbacks.push(Arc::clone(cb));
                    true
                }
            });
        }
        for cb in callbacks {
            cb(event);
            delivered += 1;
        }
        delivered
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.registry.lock().subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_channel_delivery() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();
        assert_eq!(bus.publish(&7u32), 1);
        assert_eq!(rx.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_callback_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        bus.subscribe_fn(move |v: &usize| {
            seen_cb.fetch_add(*v, Ordering::SeqCst);
        });
        bus.publish(&3);
        bus.publish(&4);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (id, rx) = bus.subscribe();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(&1u8), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();
        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(&1u8);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let (_id, rx) = bus.subscribe();
        let inner = Arc::clone(&bus);
        bus.subscribe_fn(move |v: &u32| {
            if *v == 1 {
                inner.publish(&2);
            }
        });
        bus.publish(&1);
        let got: Vec<u32> = rx.try_iter().collect();
        assert_eq!(got, vec![1, 2]);
    }
}
