use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::Topic;

/// Counters for frames delivered by the router
#[derive(Debug, Default, Clone)]
pub struct DeliveryStats {
    /// Frames delivered, by topic
    pub by_topic: HashMap<Topic, u64>,
    /// Handler invocations, by topic (one frame may fan out to many views)
    pub handler_calls: HashMap<Topic, u64>,
    /// Frames dropped because the topic is not one we know
    pub unknown_topics: u64,
    pub total: u64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, topic: Topic, handlers: usize) {
        self.total += 1;
        *self.by_topic.entry(topic).or_insert(0) += 1;
        *self.handler_calls.entry(topic).or_insert(0) += handlers as u64;
    }

    pub fn record_unknown(&mut self) {
        self.total += 1;
        self.unknown_topics += 1;
    }

    /// Topics sorted by delivered count (descending)
    pub fn topics_by_count(&self) -> Vec<(Topic, u64)> {
        let mut topics: Vec<_> = self.by_topic.iter().map(|(&t, &c)| (t, c)).collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        topics
    }
}

/// Thread-safe wrapper for delivery stats
#[derive(Debug, Clone, Default)]
pub struct SharedDeliveryStats {
    inner: Arc<RwLock<DeliveryStats>>,
}

impl SharedDeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, topic: Topic, handlers: usize) {
        self.inner.write().record(topic, handlers);
    }

    pub fn record_unknown(&self) {
        self.inner.write().record_unknown();
    }

    pub fn snapshot(&self) -> DeliveryStats {
        self.inner.read().clone()
    }
}
