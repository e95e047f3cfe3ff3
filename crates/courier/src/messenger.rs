//! Declarative bus bindings for event-emitting objects
//!
//! A [`Messenger`] object declares two maps:
//!
//! * `messages`: local event name -> routes. Triggering the event publishes
//!   the accessor's payload to every route.
//! * `subscriptions`: handler method name -> topics. Every matching bus
//!   message invokes the method with `(data, envelope)`.
//!
//! `configure_messaging` turns those maps into emitter handlers and bus
//! subscriptions, tracking everything it installed in the object's
//! [`Messaging`] state so it can be cleared, rebuilt, or torn down exactly.
//!
//! ```text
//!  A.trigger("orderReady", [order])
//!        │  (handler installed by setup_messages)
//!        ▼
//!  Bus::publish("RoomX", "order.placed", order)
//!        │
//!        ▼
//!  B's subscription ──► B.handler("onPlaced")(data, envelope)
//! ```

use crate::bus::{Bus, Channel, Envelope, Subscription, Wiretap};
use crate::callback::{Callback, MessageCallback};
use crate::emitter::{EmitterId, Events};
use crate::spec::{MessageMap, Route, SubscriptionMap, TopicRef};
use crate::utils::normalize_data;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info};

/// Where an object is in its messaging lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Unconfigured,
    Configured,
    TornDown,
}

/// Diagnostics tap settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiretapOptions {
    /// Install the tap at all
    #[serde(default)]
    pub enable: bool,
    /// Start the tap in the active state
    #[serde(default = "default_wiretap_active")]
    pub active: bool,
}

fn default_wiretap_active() -> bool {
    true
}

impl Default for WiretapOptions {
    fn default() -> Self {
        Self {
            enable: false,
            active: default_wiretap_active(),
        }
    }
}

#[derive(Default)]
struct MessagingState {
    lifecycle: Lifecycle,
    configurations: usize,
    /// event name -> (route, publishing handler) installed on the emitter
    messages: BTreeMap<String, Vec<(Route, Callback)>>,
    /// "channel topic" -> subscriptions
    subscriptions: BTreeMap<String, Vec<Subscription>>,
    wiretap: Option<Wiretap>,
}

/// Per-object messaging state: the injected bus, the lazily resolved channel
/// and everything configuration installed.
pub struct Messaging {
    bus: Bus,
    channel: OnceLock<Channel>,
    state: Mutex<MessagingState>,
}

impl Messaging {
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            channel: OnceLock::new(),
            state: Mutex::new(MessagingState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MessagingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Resolve the object's channel on first use and cache it
    pub fn ensure_channel(&self, name: &str) -> &Channel {
        self.channel.get_or_init(|| {
            debug!("📡 Resolved channel '{}'", name);
            self.bus.channel(name)
        })
    }

    /// The resolved channel, if any operation needed it yet
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.get()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    pub fn is_configured(&self) -> bool {
        self.lifecycle() == Lifecycle::Configured
    }

    /// How many times `configure_messaging` ran on this object
    pub fn configurations(&self) -> usize {
        self.state().configurations
    }

    /// Keys (`"channel topic"`) of every tracked subscription
    pub fn subscription_keys(&self) -> Vec<String> {
        self.state().subscriptions.keys().cloned().collect()
    }

    pub fn subscriptions_for(&self, key: &str) -> Vec<Subscription> {
        self.state()
            .subscriptions
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn active_subscription_count(&self) -> usize {
        self.state()
            .subscriptions
            .values()
            .flatten()
            .filter(|subscription| subscription.is_active())
            .count()
    }

    /// Local events that currently publish to the bus
    pub fn message_events(&self) -> Vec<String> {
        self.state().messages.keys().cloned().collect()
    }

    pub fn message_routes(&self, event: &str) -> Vec<Route> {
        self.state()
            .messages
            .get(event)
            .map(|bindings| bindings.iter().map(|(route, _)| route.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_wiretap(&self) -> bool {
        self.state().wiretap.is_some()
    }

    fn track_message(&self, event: &str, route: Route, listener: Callback) {
        self.state()
            .messages
            .entry(event.to_string())
            .or_default()
            .push((route, listener));
    }

    fn take_messages(&self) -> BTreeMap<String, Vec<(Route, Callback)>> {
        std::mem::take(&mut self.state().messages)
    }

    fn track_subscription(&self, key: String, subscription: Subscription) {
        let mut state = self.state();
        let tracked = state.subscriptions.entry(key).or_default();
        if !tracked.contains(&subscription) {
            tracked.push(subscription);
        }
    }

    fn take_subscriptions(&self) -> BTreeMap<String, Vec<Subscription>> {
        std::mem::take(&mut self.state().subscriptions)
    }

    fn set_wiretap(&self, wiretap: Wiretap) {
        self.state().wiretap = Some(wiretap);
    }

    fn take_wiretap(&self) -> Option<Wiretap> {
        self.state().wiretap.take()
    }

    fn pause_wiretap(&self) {
        if let Some(wiretap) = &self.state().wiretap {
            wiretap.set_active(false);
        }
    }

    fn mark_configured(&self) {
        let mut state = self.state();
        state.lifecycle = Lifecycle::Configured;
        state.configurations += 1;
    }

    fn mark_torn_down(&self) {
        self.state().lifecycle = Lifecycle::TornDown;
    }
}

impl std::fmt::Debug for Messaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messaging")
            .field("channel", &self.channel().map(Channel::name))
            .field("lifecycle", &self.lifecycle())
            .field("subscriptions", &self.subscription_keys())
            .field("messages", &self.message_events())
            .finish()
    }
}

/// Bus messaging capability for event-emitting objects.
///
/// Implementors provide their [`Messaging`] state, their channel name, the
/// declarative maps, and a way to look up handler methods by name. Everything
/// else has a default implementation.
pub trait Messenger: Events {
    fn messaging(&self) -> &Messaging;

    /// Name of the object's default channel
    fn channel_name(&self) -> &str;

    /// Takes precedence over `channel_name` when resolving the channel
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Local events that publish to the bus
    fn messages(&self) -> MessageMap {
        MessageMap::new()
    }

    /// Handler methods that receive bus messages
    fn subscriptions(&self) -> SubscriptionMap {
        SubscriptionMap::new()
    }

    /// Resolve a handler method by name. Names without a method are skipped
    /// by `setup_subscriptions`.
    fn handler(&self, method: &str) -> Option<MessageCallback> {
        let _ = method;
        None
    }

    fn ensure_channel(&self) -> &Channel {
        let name = self.namespace().unwrap_or_else(|| self.channel_name());
        self.messaging().ensure_channel(name)
    }

    /// (Re)build every declared subscription and message. Safe to call
    /// repeatedly: existing bindings are cleared first.
    fn configure_messaging(&self) {
        self.ensure_channel();
        self.setup_subscriptions();
        self.setup_messages();
        self.messaging().mark_configured();
        debug!(
            "✅ {} configured messaging on '{}'",
            self.emitter_id(),
            self.ensure_channel().name()
        );
    }

    fn setup_messages(&self) {
        self.clear_messages();

        let owner = self.emitter_id();
        for (event, spec) in self.messages() {
            for (route, accessor) in spec.bindings() {
                let bus = self.messaging().bus().clone();
                let target = route.clone();
                let listener = Callback::new(move |args| {
                    let data = normalize_data(accessor.call(args));
                    bus.publish(&target.channel, &target.topic, data);
                });

                self.emitter().on(&event, listener.clone(), Some(owner));
                self.messaging().track_message(&event, route, listener);
            }
        }
    }

    /// Remove exactly the handlers `setup_messages` installed
    fn clear_messages(&self) {
        for (event, bindings) in self.messaging().take_messages() {
            for (route, listener) in bindings {
                self.emitter().off(Some(&event), Some(&listener), None);
                debug!("🗑️ Unbound '{}' from {}", event, route);
            }
        }
    }

    fn setup_subscriptions(&self) {
        self.clear_subscriptions();

        let owner = self.emitter_id();
        let own_channel = self.ensure_channel().name().to_string();
        for (method, spec) in self.subscriptions() {
            let Some(handler) = self.handler(&method) else {
                debug!(
                    "Skipping subscriptions for '{}': {} has no such handler",
                    method, owner
                );
                continue;
            };

            for topic in spec.topics() {
                let route = topic.resolve(&own_channel);
                let subscription = self.messaging().bus().subscribe(
                    &route.channel,
                    &route.topic,
                    handler.clone(),
                    Some(owner),
                );
                self.messaging().track_subscription(route.key(), subscription);
            }
        }
    }

    /// Dispose every tracked subscription, declarative or ad hoc
    fn clear_subscriptions(&self) {
        for (_, subscriptions) in self.messaging().take_subscriptions() {
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        }
    }

    /// Ad hoc subscription. A bare topic subscribes on the object's own
    /// channel. The subscription is tracked and disposed by
    /// `clear_subscriptions`.
    fn subscribe<T>(
        &self,
        target: T,
        callback: MessageCallback,
        context: Option<EmitterId>,
    ) -> Subscription
    where
        T: Into<TopicRef>,
    {
        let own_channel = self.ensure_channel().name().to_string();
        let route = target.into().resolve(&own_channel);
        let subscription = self.messaging().bus().subscribe(
            &route.channel,
            &route.topic,
            callback,
            Some(context.unwrap_or_else(|| self.emitter_id())),
        );
        self.messaging()
            .track_subscription(route.key(), subscription.clone());
        subscription
    }

    /// Ad hoc publish on the object's own channel
    fn publish(&self, topic: &str, data: Value) {
        self.ensure_channel().publish(topic, normalize_data(data));
    }

    /// Install a tap that logs every bus message. Does nothing unless
    /// `options.enable` is set and the bus has no tap yet.
    fn start_wiretap(&self, options: &WiretapOptions) {
        let bus = self.messaging().bus();
        if !options.enable || bus.wiretap_count() > 0 {
            return;
        }

        let wiretap = bus.add_wiretap(|envelope: &Envelope| {
            info!(
                channel = %envelope.channel,
                topic = %envelope.topic,
                data = %envelope.data,
                "📨 Bus message"
            );
        });
        wiretap.set_active(options.active);
        self.messaging().set_wiretap(wiretap);
    }

    /// Pause this object's tap, or remove it entirely with `kill`
    fn stop_wiretap(&self, kill: bool) {
        if kill {
            if let Some(wiretap) = self.messaging().take_wiretap() {
                wiretap.remove();
            }
        } else {
            self.messaging().pause_wiretap();
        }
    }

    /// Dispose every subscription, unbind every message and remove the
    /// wiretap. A configured object also drops every local handler and
    /// listening relation and moves to `TornDown`; an unconfigured one keeps
    /// its local events and lifecycle.
    fn teardown_messaging(&self) {
        self.clear_subscriptions();
        self.clear_messages();
        self.stop_wiretap(true);

        if self.messaging().lifecycle() != Lifecycle::Configured {
            return;
        }

        self.emitter().stop_listening(None, None, None);
        self.emitter().off(None, None, None);
        self.messaging().mark_torn_down();
        debug!("🧹 {} tore down messaging", self.emitter_id());
    }
}
