//! Typed event subscription registry.
//!
//! Subscribers register a callback for one topic under an [`ObserverId`].
//! Dropping every subscription of an observer at once is
//! [`EventHub::remove_observer`].

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBSERVER: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscriber, used for bulk unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn new() -> Self {
        Self(NEXT_OBSERVER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a single subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// An event that can be routed by topic.
pub trait Topical {
    type Topic: Copy + Eq;

    fn topic(&self) -> Self::Topic;
}

struct Subscription<E: Topical> {
    id: SubscriptionId,
    observer: ObserverId,
    topic: E::Topic,
    callback: Box<dyn FnMut(&E)>,
}

pub struct EventHub<E: Topical> {
    next_id: u64,
    subscriptions: Vec<Subscription<E>>,
}

impl<E: Topical> Default for EventHub<E> {
    fn default() -> Self {
        Self { next_id: 1, subscriptions: Vec::new() }
    }
}

impl<E: Topical> EventHub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        observer: ObserverId,
        topic: E::Topic,
        callback: impl FnMut(&E) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            observer,
            topic,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Remove every subscription held by `observer`, across all topics.
    pub fn remove_observer(&mut self, observer: ObserverId) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.observer != observer);
        before - self.subscriptions.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Deliver `event` to every subscriber of its topic, in subscription order.
    pub fn emit(&mut self, event: &E) {
        let topic = event.topic();
        for sub in self.subscriptions.iter_mut().filter(|s| s.topic == topic) {
            (sub.callback)(event);
        }
    }
}
