//! Main application logic and lifecycle management.
//!
//! The `Application` builds one [`KitchenActor`] per configured actor on a
//! shared bus, wires their messaging, replays the configured orders and
//! tears everything down again.

use crate::{cli::CliArgs, config::AppConfig, config::ActorSettings, logging::display_banner};
use courier::{
    Bus, EventEmitter, Envelope, Events, Listening, MessageCallback, MessageMap, Messaging,
    Messenger, SubscriptionMap,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// A messenger object built from configuration.
///
/// Every declared subscription handler records the envelope it received and,
/// if a reaction is configured for it, triggers that local event with the
/// received data.
pub struct KitchenActor {
    name: String,
    emitter: EventEmitter,
    messaging: Messaging,
    channel: String,
    namespace: Option<String>,
    messages: MessageMap,
    subscriptions: SubscriptionMap,
    reactions: BTreeMap<String, String>,
    received: Arc<Mutex<Vec<Envelope>>>,
}

impl KitchenActor {
    pub fn from_settings(
        name: &str,
        settings: &ActorSettings,
        bus: &Bus,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            name: name.to_string(),
            emitter: EventEmitter::new(),
            messaging: Messaging::new(bus.clone()),
            channel: settings.messaging.channel_name.clone(),
            namespace: settings.messaging.namespace.clone(),
            messages: settings.messaging.message_map()?,
            subscriptions: settings.messaging.subscription_map()?,
            reactions: settings.reactions.clone(),
            received: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every envelope delivered to this actor, in arrival order
    pub fn received(&self) -> Vec<Envelope> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Events for KitchenActor {
    fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

impl Listening for KitchenActor {}

impl Messenger for KitchenActor {
    fn messaging(&self) -> &Messaging {
        &self.messaging
    }

    fn channel_name(&self) -> &str {
        &self.channel
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn messages(&self) -> MessageMap {
        self.messages.clone()
    }

    fn subscriptions(&self) -> SubscriptionMap {
        self.subscriptions.clone()
    }

    fn handler(&self, method: &str) -> Option<MessageCallback> {
        if !self.subscriptions.contains_key(method) {
            return None;
        }

        let name = self.name.clone();
        let method = method.to_string();
        let received = self.received.clone();
        let reaction = self.reactions.get(&method).cloned();
        let emitter = self.emitter.clone();

        Some(MessageCallback::new(move |data, envelope| {
            info!(
                "🍽️ {}.{} got {} {}: {}",
                name, method, envelope.channel, envelope.topic, data
            );
            received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(envelope.clone());

            if let Some(event) = &reaction {
                emitter.trigger(event, &[data.clone()]);
            }
        }))
    }
}

/// Main application struct.
///
/// Owns the bus and every actor on it.
pub struct Application {
    config: AppConfig,
    bus: Bus,
    actors: BTreeMap<String, KitchenActor>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Build the actors
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if args.wiretap {
            config.wiretap.enable = true;
            config.wiretap.active = true;
        }

        display_banner();
        Self::from_config(config)
    }

    /// Builds the application from an already loaded configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        let bus = Bus::local();
        let mut actors = BTreeMap::new();
        for (name, settings) in &config.actors {
            actors.insert(name.clone(), KitchenActor::from_settings(name, settings, &bus)?);
        }

        Ok(Self { config, bus, actors })
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn actor(&self, name: &str) -> Option<&KitchenActor> {
        self.actors.get(name)
    }

    /// Configure every actor and install the wiretap if enabled
    pub fn start(&self) {
        self.log_configuration_summary();

        for actor in self.actors.values() {
            actor.configure_messaging();
        }

        if let Some(first) = self.actors.values().next() {
            first.start_wiretap(&self.config.wiretap);
        }

        info!(
            "✅ {} actor(s) ready, {} subscription(s) on the bus",
            self.actors.len(),
            self.bus.subscription_count()
        );
    }

    /// Trigger every configured order on the host actor. Returns how many
    /// orders were placed.
    pub fn place_orders(&self) -> usize {
        let kitchen = &self.config.kitchen;
        let Some(host) = self.actors.get(&kitchen.host) else {
            warn!("⚠️ Kitchen host '{}' does not exist", kitchen.host);
            return 0;
        };

        for dish in &kitchen.orders {
            info!("📝 {} takes an order for {}", host.name(), dish);
            host.trigger(&kitchen.event, &[json!({ "order": dish })]);
        }
        kitchen.orders.len()
    }

    /// Tear down every actor's messaging
    pub fn shutdown(&self) {
        for actor in self.actors.values() {
            actor.teardown_messaging();
        }
        info!(
            "🧹 Shutdown complete, {} subscription(s) left on the bus",
            self.bus.subscription_count()
        );
    }

    /// Runs the whole scenario and logs what each actor received.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting courier kitchen");
        self.start();

        let placed = self.place_orders();
        info!("📦 Placed {} order(s)", placed);

        log_final_statistics(&self.actors);
        self.shutdown();
        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  📣 Wiretap: {}", self.config.wiretap.enable);
        info!(
            "  🧾 Orders: {} via {}.{}",
            self.config.kitchen.orders.len(),
            self.config.kitchen.host,
            self.config.kitchen.event
        );
        for (name, settings) in &self.config.actors {
            info!(
                "  👤 {} on '{}': {} message(s), {} subscription(s)",
                name,
                settings.messaging.resolved_channel(),
                settings.messaging.messages.len(),
                settings.messaging.subscriptions.len()
            );
        }
    }
}

fn log_final_statistics(actors: &BTreeMap<String, KitchenActor>) {
    info!("📊 Final Statistics:");
    for (name, actor) in actors {
        info!("  - {} received {} message(s)", name, actor.received().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KitchenSettings;

    #[test]
    fn test_default_kitchen_round() {
        let app = Application::from_config(AppConfig::default()).unwrap();
        app.start();
        assert_eq!(app.bus().subscription_count(), 3);

        assert_eq!(app.place_orders(), 2);

        let chef = app.actor("chef").unwrap();
        let placed: Vec<_> = chef.received().iter().map(|e| e.data.clone()).collect();
        assert_eq!(placed, vec![json!({"order": "fries"}), json!({"order": "burger"})]);

        for name in ["waiter", "waitress"] {
            let received = app.actor(name).unwrap().received();
            assert_eq!(received.len(), 2);
            assert!(received.iter().all(|e| e.channel == "Kitchen" && e.topic == "order.ready"));
        }

        app.shutdown();
        assert_eq!(app.bus().subscription_count(), 0);
    }

    #[test]
    fn test_start_twice_does_not_duplicate_subscriptions() {
        let app = Application::from_config(AppConfig::default()).unwrap();
        app.start();
        app.start();
        assert_eq!(app.bus().subscription_count(), 3);

        app.place_orders();
        assert_eq!(app.actor("chef").unwrap().received().len(), 2);
    }

    #[test]
    fn test_wiretap_from_config() {
        let mut config = AppConfig::default();
        config.wiretap.enable = true;
        let app = Application::from_config(config).unwrap();

        app.start();
        assert_eq!(app.bus().wiretap_count(), 1);

        app.shutdown();
        assert_eq!(app.bus().wiretap_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.kitchen = KitchenSettings {
            host: "ghost".to_string(),
            event: "boo".to_string(),
            orders: vec!["soup".to_string()],
        };
        assert!(Application::from_config(config).is_err());
    }

    #[test]
    fn test_actor_without_reaction_only_records() {
        let app = Application::from_config(AppConfig::default()).unwrap();
        app.start();

        app.bus()
            .publish("Kitchen", "order.ready", json!({"order": "pie"}));

        assert_eq!(app.actor("waiter").unwrap().received().len(), 1);
        assert!(app.actor("chef").unwrap().received().is_empty());
    }
}
