//! Bus adapter over a channel/topic transport
//!
//! [`Bus`] is the only thing the messenger layer knows about the transport.
//! It is passed explicitly to every object that publishes or subscribes, so
//! two buses never share subscribers and tests get isolation by creating a
//! fresh one.

use crate::callback::MessageCallback;
use crate::emitter::EmitterId;
use crate::transport::{LocalTransport, SubscriptionId, Transport, WiretapId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A delivered message: handlers receive `(data, envelope)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub topic: String,
    pub data: Value,
}

/// Shared handle to a transport
#[derive(Clone)]
pub struct Bus {
    transport: Arc<dyn Transport>,
}

impl Bus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// A bus backed by a fresh [`LocalTransport`]
    pub fn local() -> Self {
        Self::new(Arc::new(LocalTransport::new()))
    }

    /// Fire-and-forget publish
    pub fn publish(&self, channel: &str, topic: &str, data: Value) {
        self.transport.publish(Envelope {
            channel: channel.to_string(),
            topic: topic.to_string(),
            data,
        });
    }

    /// Subscribe `callback` to `topic` on `channel`.
    ///
    /// `context` records which object the subscription belongs to. Subscribing
    /// the same callback to the same channel and topic again yields a handle to
    /// the existing registration. Dropping the returned handle does not
    /// unsubscribe; call [`Subscription::unsubscribe`].
    pub fn subscribe(
        &self,
        channel: &str,
        topic: &str,
        callback: MessageCallback,
        context: Option<EmitterId>,
    ) -> Subscription {
        let id = self.transport.subscribe(channel, topic, callback.clone());
        Subscription {
            inner: Arc::new(SubscriptionInner {
                id,
                channel: channel.to_string(),
                topic: topic.to_string(),
                callback,
                context,
                active: AtomicBool::new(true),
                transport: self.transport.clone(),
            }),
        }
    }

    /// Channel-scoped view of this bus
    pub fn channel(&self, name: &str) -> Channel {
        Channel {
            name: name.to_string(),
            bus: self.clone(),
        }
    }

    /// Install an observer for every envelope published on this bus
    pub fn add_wiretap<F>(&self, tap: F) -> Wiretap
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let enabled = active.clone();
        let id = self.transport.add_wiretap(Arc::new(move |envelope: &Envelope| {
            if enabled.load(Ordering::SeqCst) {
                tap(envelope);
            }
        }));
        Wiretap {
            id,
            active,
            transport: self.transport.clone(),
        }
    }

    pub fn wiretap_count(&self) -> usize {
        self.transport.wiretap_count()
    }

    pub fn subscription_count(&self) -> usize {
        self.transport.subscription_count()
    }

    /// Drop every subscription and wiretap on the transport. Outstanding
    /// handles report inactive afterwards.
    pub fn reset(&self) {
        self.transport.reset();
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("subscriptions", &self.subscription_count())
            .field("wiretaps", &self.wiretap_count())
            .finish()
    }
}

/// A bus bound to one channel name
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    bus: Bus,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn publish(&self, topic: &str, data: Value) {
        self.bus.publish(&self.name, topic, data);
    }

    pub fn subscribe(
        &self,
        topic: &str,
        callback: MessageCallback,
        context: Option<EmitterId>,
    ) -> Subscription {
        self.bus.subscribe(&self.name, topic, callback, context)
    }
}

struct SubscriptionInner {
    id: SubscriptionId,
    channel: String,
    topic: String,
    callback: MessageCallback,
    context: Option<EmitterId>,
    active: AtomicBool,
    transport: Arc<dyn Transport>,
}

/// Disposable handle to one bus registration.
///
/// Clones, and handles returned for a repeated subscription, refer to the same
/// registration and compare equal.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn context(&self) -> Option<EmitterId> {
        self.inner.context
    }

    pub fn callback(&self) -> &MessageCallback {
        &self.inner.callback
    }

    /// Whether the registration is still live on the transport
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
            && self.inner.transport.is_subscribed(self.inner.id)
    }

    /// Remove the callback from the transport. Returns `true` only for the
    /// call that actually removed the registration.
    pub fn unsubscribe(&self) -> bool {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        let removed = self.inner.transport.unsubscribe(self.inner.id);
        if removed {
            debug!(
                "Disposed subscription to {} {}",
                self.inner.channel, self.inner.topic
            );
        }
        removed
    }

    /// Alias for [`Subscription::unsubscribe`]
    pub fn dispose(&self) -> bool {
        self.unsubscribe()
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
            && Arc::ptr_eq(&self.inner.transport, &other.inner.transport)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("channel", &self.inner.channel)
            .field("topic", &self.inner.topic)
            .field("context", &self.inner.context)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Handle to an installed wiretap
pub struct Wiretap {
    id: WiretapId,
    active: Arc<AtomicBool>,
    transport: Arc<dyn Transport>,
}

impl Wiretap {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Pause or resume the tap without removing it
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Remove the tap from the transport
    pub fn remove(&self) -> bool {
        self.set_active(false);
        self.transport.remove_wiretap(self.id)
    }
}

impl fmt::Debug for Wiretap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wiretap")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn collector() -> (Arc<Mutex<Vec<(Value, Envelope)>>>, MessageCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = MessageCallback::new(move |data, envelope| {
            sink.lock().unwrap().push((data.clone(), envelope.clone()));
        });
        (seen, callback)
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = Bus::local();
        let (seen, cb) = collector();

        let subscription = bus.subscribe("Kitchen", "order.ready", cb, None);
        bus.publish("Kitchen", "order.ready", json!({"order": "fries"}));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, json!({"order": "fries"}));
        assert_eq!(seen[0].1.channel, "Kitchen");
        assert_eq!(seen[0].1.topic, "order.ready");
        assert!(subscription.is_active());
    }

    #[test]
    fn test_dispose_twice() {
        let bus = Bus::local();
        let (seen, cb) = collector();

        let subscription = bus.subscribe("Kitchen", "order.ready", cb, None);
        assert!(subscription.unsubscribe());
        assert!(!subscription.dispose());
        assert!(!subscription.is_active());
        assert_eq!(bus.subscription_count(), 0);

        bus.publish("Kitchen", "order.ready", json!({}));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disposing_one_leaves_others() {
        let bus = Bus::local();
        let (seen, cb) = collector();
        let (_, other) = collector();

        let first = bus.subscribe("Kitchen", "order.ready", other, None);
        let second = bus.subscribe("Kitchen", "order.ready", cb, None);
        first.unsubscribe();

        bus.publish("Kitchen", "order.ready", json!({}));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(second.is_active());
        assert_ne!(first, second);
    }

    #[test]
    fn test_repeated_subscription_is_the_same_registration() {
        let bus = Bus::local();
        let (seen, cb) = collector();

        let first = bus.subscribe("Kitchen", "order.ready", cb.clone(), None);
        let again = bus.channel("Kitchen").subscribe("order.ready", cb, None);
        assert_eq!(first, again);
        assert_eq!(bus.subscription_count(), 1);

        bus.publish("Kitchen", "order.ready", json!({}));
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(again.unsubscribe());
        assert!(!first.is_active());
        assert!(!first.unsubscribe());
    }

    #[test]
    fn test_reset_deactivates_handles() {
        let bus = Bus::local();
        let (_, cb) = collector();

        let subscription = bus.subscribe("Kitchen", "order.ready", cb, None);
        bus.reset();

        assert!(!subscription.is_active());
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn test_channel_view() {
        let bus = Bus::local();
        let (seen, cb) = collector();
        let owner = crate::EventEmitter::new();

        let kitchen = bus.channel("Kitchen");
        let subscription = kitchen.subscribe("order.ready", cb, Some(owner.id()));
        kitchen.publish("order.ready", json!(1));

        assert_eq!(kitchen.name(), "Kitchen");
        assert_eq!(subscription.context(), Some(owner.id()));
        assert_eq!(seen.lock().unwrap()[0].1.channel, "Kitchen");
    }

    #[test]
    fn test_wiretap_pause_and_remove() {
        let bus = Bus::local();
        let tapped = Arc::new(Mutex::new(0));
        let sink = tapped.clone();

        let tap = bus.add_wiretap(move |_| *sink.lock().unwrap() += 1);
        bus.publish("A", "x", json!({}));
        tap.set_active(false);
        bus.publish("A", "x", json!({}));
        assert_eq!(*tapped.lock().unwrap(), 1);

        assert!(tap.remove());
        assert_eq!(bus.wiretap_count(), 0);
    }

    #[test]
    fn test_envelope_serializes() {
        let envelope = Envelope {
            channel: "Kitchen".to_string(),
            topic: "order.ready".to_string(),
            data: json!({"order": "fries"}),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"channel": "Kitchen", "topic": "order.ready", "data": {"order": "fries"}})
        );
    }
}
