//! Channel/topic transport contract and the in-process implementation
//!
//! The messenger layer never talks to a transport directly; it goes through
//! [`crate::bus::Bus`]. Anything that can publish envelopes and hand out
//! removable subscriptions can sit behind it.

use crate::bus::Envelope;
use crate::callback::MessageCallback;
use crate::utils::topic_matches;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Transport-assigned identity of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Transport-assigned identity of one wiretap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WiretapId(pub u64);

/// Observer that sees every envelope published on a transport
pub type WiretapFn = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// The external channel/topic bus.
///
/// Implementations deliver synchronously: `publish` returns after every
/// matching subscriber ran.
pub trait Transport: Send + Sync {
    /// Deliver an envelope, returning how many subscribers received it
    fn publish(&self, envelope: Envelope) -> usize;

    /// Register `callback` for `topic` on `channel`. A callback is registered
    /// at most once per channel and topic; subscribing it again returns the
    /// existing id.
    fn subscribe(&self, channel: &str, topic: &str, callback: MessageCallback) -> SubscriptionId;

    /// Remove a subscription; `false` if it was not registered
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Whether `id` is still registered
    fn is_subscribed(&self, id: SubscriptionId) -> bool;

    fn add_wiretap(&self, tap: WiretapFn) -> WiretapId;

    fn remove_wiretap(&self, id: WiretapId) -> bool;

    fn wiretap_count(&self) -> usize;

    fn subscription_count(&self) -> usize;

    /// Drop every subscription and wiretap. Meant for test harnesses.
    fn reset(&self);
}

#[derive(Clone)]
struct Binding {
    id: SubscriptionId,
    topic: String,
    callback: MessageCallback,
}

/// Synchronous in-process transport.
///
/// Subscribers of a channel are called in subscription order. Topic bindings
/// may use `*` (one word) and `#` (zero or more words) wildcards.
#[derive(Default)]
pub struct LocalTransport {
    next_id: AtomicU64,
    channels: DashMap<String, SmallVec<[Binding; 4]>>,
    index: DashMap<SubscriptionId, String>,
    wiretaps: DashMap<WiretapId, WiretapFn>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Transport for LocalTransport {
    fn publish(&self, envelope: Envelope) -> usize {
        let mut taps: Vec<(WiretapId, WiretapFn)> = self
            .wiretaps
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        taps.sort_by_key(|(id, _)| *id);
        for (_, tap) in taps {
            tap(&envelope);
        }

        let bindings = match self.channels.get(&envelope.channel) {
            Some(bindings) => bindings.value().clone(),
            None => {
                trace!("📭 No subscribers on channel '{}'", envelope.channel);
                return 0;
            }
        };

        let mut delivered = 0;
        for binding in bindings.iter() {
            if topic_matches(&binding.topic, &envelope.topic) {
                binding.callback.call(&envelope.data, &envelope);
                delivered += 1;
            }
        }

        trace!(
            "📤 {} {} delivered to {} subscriber(s)",
            envelope.channel,
            envelope.topic,
            delivered
        );
        delivered
    }

    fn subscribe(&self, channel: &str, topic: &str, callback: MessageCallback) -> SubscriptionId {
        let mut bindings = self.channels.entry(channel.to_string()).or_default();
        if let Some(existing) = bindings
            .iter()
            .find(|binding| binding.topic == topic && binding.callback == callback)
        {
            trace!("♻️ Reusing subscription #{} to {} {}", existing.id.0, channel, topic);
            return existing.id;
        }

        let id = SubscriptionId(self.next_id());
        bindings.push(Binding {
            id,
            topic: topic.to_string(),
            callback,
        });
        drop(bindings);

        self.index.insert(id, channel.to_string());
        debug!("📝 Subscribed #{} to {} {}", id.0, channel, topic);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, channel)) = self.index.remove(&id) else {
            return false;
        };

        self.channels.remove_if_mut(&channel, |_, bindings| {
            bindings.retain(|binding| binding.id != id);
            bindings.is_empty()
        });
        debug!("🗑️ Unsubscribed #{} from {}", id.0, channel);
        true
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.index.contains_key(&id)
    }

    fn add_wiretap(&self, tap: WiretapFn) -> WiretapId {
        let id = WiretapId(self.next_id());
        self.wiretaps.insert(id, tap);
        id
    }

    fn remove_wiretap(&self, id: WiretapId) -> bool {
        self.wiretaps.remove(&id).is_some()
    }

    fn wiretap_count(&self) -> usize {
        self.wiretaps.len()
    }

    fn subscription_count(&self) -> usize {
        self.index.len()
    }

    fn reset(&self) {
        self.channels.clear();
        self.index.clear();
        self.wiretaps.clear();
        debug!("🔄 Transport reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn envelope(channel: &str, topic: &str, data: Value) -> Envelope {
        Envelope {
            channel: channel.to_string(),
            topic: topic.to_string(),
            data,
        }
    }

    fn collector() -> (Arc<Mutex<Vec<Envelope>>>, MessageCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = MessageCallback::new(move |_, envelope| {
            sink.lock().unwrap().push(envelope.clone());
        });
        (seen, callback)
    }

    #[test]
    fn test_publish_reaches_matching_subscribers_only() {
        let transport = LocalTransport::new();
        let (seen, cb) = collector();

        transport.subscribe("Kitchen", "order.ready", cb.clone());
        transport.subscribe("Kitchen", "order.*", cb.clone());
        transport.subscribe("DiningRoom", "order.ready", cb);

        let delivered = transport.publish(envelope("Kitchen", "order.ready", json!({"id": 1})));

        assert_eq!(delivered, 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(transport.publish(envelope("Bar", "order.ready", json!({}))), 0);
    }

    #[test]
    fn test_unsubscribe_is_targeted_and_idempotent() {
        let transport = LocalTransport::new();
        let (seen, cb) = collector();
        let (_, other) = collector();

        let first = transport.subscribe("Kitchen", "order.ready", other);
        let second = transport.subscribe("Kitchen", "order.ready", cb);

        assert!(transport.unsubscribe(first));
        assert!(!transport.unsubscribe(first));
        assert!(!transport.is_subscribed(first));
        assert!(transport.is_subscribed(second));
        assert_eq!(transport.subscription_count(), 1);

        transport.publish(envelope("Kitchen", "order.ready", json!(null)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_same_callback_and_route_registers_once() {
        let transport = LocalTransport::new();
        let (seen, cb) = collector();

        let first = transport.subscribe("Kitchen", "order.ready", cb.clone());
        let again = transport.subscribe("Kitchen", "order.ready", cb.clone());
        let other_topic = transport.subscribe("Kitchen", "order.late", cb);

        assert_eq!(first, again);
        assert_ne!(first, other_topic);
        assert_eq!(transport.subscription_count(), 2);

        assert_eq!(transport.publish(envelope("Kitchen", "order.ready", json!({}))), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_wiretaps_see_everything() {
        let transport = LocalTransport::new();
        let tapped = Arc::new(Mutex::new(Vec::new()));
        let sink = tapped.clone();

        let id = transport.add_wiretap(Arc::new(move |envelope: &Envelope| {
            sink.lock().unwrap().push(envelope.topic.clone());
        }));
        transport.publish(envelope("Nowhere", "ping", json!({})));
        assert_eq!(*tapped.lock().unwrap(), vec!["ping"]);

        assert!(transport.remove_wiretap(id));
        transport.publish(envelope("Nowhere", "ping", json!({})));
        assert_eq!(tapped.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_drops_everything() {
        let transport = LocalTransport::new();
        let (seen, cb) = collector();

        let id = transport.subscribe("Kitchen", "order.ready", cb);
        transport.add_wiretap(Arc::new(|_: &Envelope| {}));
        transport.reset();

        assert_eq!(transport.subscription_count(), 0);
        assert_eq!(transport.wiretap_count(), 0);
        assert!(!transport.is_subscribed(id));
        assert!(!transport.unsubscribe(id));

        transport.publish(envelope("Kitchen", "order.ready", json!({})));
        assert!(seen.lock().unwrap().is_empty());
    }
}
