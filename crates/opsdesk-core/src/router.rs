//! Topic router between the push channel and the views.
//!
//! Subscriptions are logical: they live in the router, not in a physical
//! connection, so they survive transport reconnects untouched. Each
//! subscription is an RAII token; views group theirs in a
//! [`SubscriptionScope`] so unmounting a view revokes everything it
//! registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::events::{PushFrame, Topic};
use crate::stats::SharedDeliveryStats;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    active: AtomicBool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<Topic, Vec<Arc<Registration>>>,
}

impl Registry {
    fn remove(&mut self, topic: Topic, id: SubscriptionId) -> bool {
        let Some(regs) = self.topics.get_mut(&topic) else {
            return false;
        };
        let Some(pos) = regs.iter().position(|r| r.id == id) else {
            return false;
        };
        let reg = regs.remove(pos);
        reg.active.store(false, Ordering::Release);
        if regs.is_empty() {
            self.topics.remove(&topic);
        }
        true
    }

    fn find_topic(&self, id: SubscriptionId) -> Option<Topic> {
        self.topics
            .iter()
            .find(|(_, regs)| regs.iter().any(|r| r.id == id))
            .map(|(topic, _)| *topic)
    }
}

/// Routes pushed frames to every active subscriber of their topic.
#[derive(Clone, Default)]
pub struct EventRouter {
    registry: Arc<Mutex<Registry>>,
    stats: SharedDeliveryStats,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: SharedDeliveryStats) -> Self {
        Self {
            registry: Arc::default(),
            stats,
        }
    }

    pub fn stats(&self) -> &SharedDeliveryStats {
        &self.stats
    }

    /// Register `handler` for `topic`. The registration lasts until the
    /// returned token is dropped or unsubscribed.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .topics
            .entry(topic)
            .or_default()
            .push(Arc::new(Registration {
                id,
                active: AtomicBool::new(true),
                handler: Arc::new(handler),
            }));
        debug!(topic = %topic, id = id.0, "subscribed");

        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a registration by id. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        match registry.find_topic(id) {
            Some(topic) => {
                debug!(topic = %topic, id = id.0, "unsubscribed");
                registry.remove(topic, id)
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry
            .lock()
            .topics
            .get(&topic)
            .map(|regs| regs.len())
            .unwrap_or(0)
    }

    /// Deliver one event to every subscriber of `topic`, returning how many
    /// handlers ran.
    ///
    /// The subscriber list is snapshotted before any handler runs and the
    /// lock is released, so handlers may subscribe or unsubscribe freely.
    /// A registration removed during the dispatch is skipped; one added
    /// during the dispatch first sees the next event.
    pub fn dispatch(&self, topic: Topic, payload: &Value) -> usize {
        let snapshot: Vec<Arc<Registration>> = self
            .registry
            .lock()
            .topics
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for reg in snapshot {
            if !reg.active.load(Ordering::Acquire) {
                continue;
            }
            (reg.handler)(payload);
            delivered += 1;
        }
        trace!(topic = %topic, delivered, "dispatched");
        self.stats.record(topic, delivered);
        delivered
    }

    /// Deliver a raw wire frame. Unknown topics are counted and dropped.
    pub fn dispatch_frame(&self, frame: &PushFrame) -> usize {
        match frame.topic() {
            Ok(topic) => self.dispatch(topic, &frame.payload),
            Err(e) => {
                debug!("dropping frame: {}", e);
                self.stats.record_unknown();
                0
            }
        }
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventRouter")
            .field("topics", &registry.topics.len())
            .finish()
    }
}

/// Token for one registration. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Idempotent; only this registration is affected.
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.lock().remove(self.topic, self.id) {
                debug!(topic = %self.topic, id = self.id.0, "unsubscribed");
            }
        }
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// All subscriptions owned by one mounted view.
///
/// Dropping the scope revokes every subscription and flips `is_alive` to
/// false, which late async work checks before touching view state.
#[derive(Debug)]
pub struct SubscriptionScope {
    name: &'static str,
    router: EventRouter,
    subscriptions: Vec<Subscription>,
    alive: Arc<AtomicBool>,
}

impl SubscriptionScope {
    pub fn new(name: &'static str, router: &EventRouter) -> Self {
        Self {
            name,
            router: router.clone(),
            subscriptions: Vec::new(),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe<F>(&mut self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let subscription = self.router.subscribe(topic, handler);
        let id = subscription.id();
        self.subscriptions.push(subscription);
        id
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Shared liveness flag for work that outlives a borrow of the scope.
    pub fn liveness(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }

    /// Revoke everything now. Dropping the scope does the same.
    pub fn close(&mut self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!(view = self.name, count = self.subscriptions.len(), "closing scope");
        }
        self.subscriptions.clear();
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.close();
    }
}
