//! Type-indexed, channel-scoped publish/subscribe
//!
//! Subscribers are keyed by the event's type AND a string channel; both must
//! match for delivery. Callbacks run synchronously in subscription order and
//! receive the event by `&mut`, so one subscriber's changes are visible to the
//! next (priority chains).
//!
//! The bus is single-threaded: callbacks are not `Send`, which keeps the bus
//! on the thread that created it. Events from other threads arrive through
//! [`bridge`](super::bridge).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

type Callback<E> = Box<dyn FnMut(&mut E)>;

/// Handle returned by [`EventBus::subscribe`], unique for the bus's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw counter value
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    // Always a `Callback<E>` for the `TypeId` it is filed under
    callback: Box<dyn Any>,
}

/// Synchronous event bus owned by the engine
#[derive(Default)]
pub struct EventBus {
    channels: HashMap<TypeId, HashMap<String, Vec<Subscriber>>>,
    next_id: u64,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of type `E` on `channel`
    pub fn subscribe<E, F>(&mut self, channel: &str, callback: F) -> SubscriptionId
    where
        E: 'static,
        F: FnMut(&mut E) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let callback: Callback<E> = Box::new(callback);
        self.channels
            .entry(TypeId::of::<E>())
            .or_default()
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber {
                id,
                callback: Box::new(callback),
            });

        log::trace!(
            "Subscribed {id} to '{channel}' ({})",
            std::any::type_name::<E>()
        );
        id
    }

    /// Remove subscription `id` from `channel`; returns whether it existed
    pub fn unsubscribe<E: 'static>(&mut self, channel: &str, id: SubscriptionId) -> bool {
        let Some(by_channel) = self.channels.get_mut(&TypeId::of::<E>()) else {
            return false;
        };
        let Some(subscribers) = by_channel.get_mut(channel) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            by_channel.remove(channel);
        }
        removed
    }

    /// Deliver `event` to every subscriber of `(E, channel)`
    ///
    /// Returns how many callbacks ran. No subscribers is not an error.
    pub fn publish<E: 'static>(&mut self, channel: &str, event: &mut E) -> usize {
        let Some(subscribers) = self
            .channels
            .get_mut(&TypeId::of::<E>())
            .and_then(|by_channel| by_channel.get_mut(channel))
        else {
            return 0;
        };

        let mut delivered = 0;
        for subscriber in subscribers.iter_mut() {
            if let Some(callback) = subscriber.callback.downcast_mut::<Callback<E>>() {
                callback(event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Publish an owned event and hand it back after every subscriber ran
    pub fn emit<E: 'static>(&mut self, channel: &str, mut event: E) -> E {
        self.publish(channel, &mut event);
        event
    }

    /// Number of subscribers for `(E, channel)`
    pub fn subscriber_count<E: 'static>(&self, channel: &str) -> usize {
        self.channels
            .get(&TypeId::of::<E>())
            .and_then(|by_channel| by_channel.get(channel))
            .map_or(0, Vec::len)
    }

    /// Drop every subscription; ids keep increasing afterwards
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers: usize = self
            .channels
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum();
        f.debug_struct("EventBus")
            .field("subscribers", &subscribers)
            .field("next_id", &self.next_id)
            .finish()
    }
}
