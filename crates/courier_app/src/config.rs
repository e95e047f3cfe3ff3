//! Configuration management for the courier kitchen demo.
//!
//! This module handles loading and validation of the application
//! configuration from TOML files. Command-line overrides are applied by the
//! caller.

use courier::{MessagingConfig, WiretapOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Bus diagnostics tap
    #[serde(default)]
    pub wiretap: WiretapOptions,
    /// What gets ordered and who takes the orders
    pub kitchen: KitchenSettings,
    /// Messenger objects by name
    #[serde(default)]
    pub actors: BTreeMap<String, ActorSettings>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

/// The scripted run.
///
/// Every order is triggered as `event` on the `host` actor with
/// `{"order": <dish>}` as its only argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitchenSettings {
    pub host: String,
    pub event: String,
    #[serde(default)]
    pub orders: Vec<String>,
}

/// One messenger object.
///
/// `reactions` maps a subscription handler to a local event the actor
/// triggers with the received data, which lets a message published by one
/// actor cause another to publish in turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSettings {
    #[serde(flatten)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub reactions: BTreeMap<String, String>,
}

impl ActorSettings {
    fn new(
        channel_name: &str,
        messages: &[(&str, &str)],
        subscriptions: &[(&str, &str)],
        reactions: &[(&str, &str)],
    ) -> Self {
        let to_map = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        Self {
            messaging: MessagingConfig {
                channel_name: channel_name.to_string(),
                namespace: None,
                messages: to_map(messages),
                subscriptions: subscriptions
                    .iter()
                    .map(|(k, v)| (k.to_string(), courier::OneOrMany::One(v.to_string())))
                    .collect(),
            },
            reactions: to_map(reactions),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut actors = BTreeMap::new();
        actors.insert(
            "chef".to_string(),
            ActorSettings::new(
                "Kitchen",
                &[("orderCooked", "Kitchen order.ready")],
                &[("handleOrderPlaced", "DiningRoom order.placed")],
                &[("handleOrderPlaced", "orderCooked")],
            ),
        );
        actors.insert(
            "waiter".to_string(),
            ActorSettings::new(
                "DiningRoom",
                &[],
                &[("handleOrderReady", "Kitchen order.ready")],
                &[],
            ),
        );
        actors.insert(
            "waitress".to_string(),
            ActorSettings::new(
                "DiningRoom",
                &[("orderReady", "DiningRoom order.placed")],
                &[("handleOrderReady", "Kitchen order.ready")],
                &[],
            ),
        );

        Self {
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            wiretap: WiretapOptions::default(),
            kitchen: KitchenSettings {
                host: "waitress".to_string(),
                event: "orderReady".to_string(),
                orders: vec!["fries".to_string(), "burger".to_string()],
            },
            actors,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        for (name, actor) in &self.actors {
            actor
                .messaging
                .validate()
                .map_err(|e| format!("Actor '{name}': {e}"))?;

            for (handler, event) in &actor.reactions {
                if !actor.messaging.subscriptions.contains_key(handler) {
                    return Err(format!(
                        "Actor '{name}': reaction '{handler}' is not a subscription handler"
                    ));
                }
                if event.trim().is_empty() {
                    return Err(format!("Actor '{name}': reaction '{handler}' has no event"));
                }
            }
        }

        if !self.kitchen.orders.is_empty() {
            if !self.actors.contains_key(&self.kitchen.host) {
                return Err(format!("Unknown kitchen host: {}", self.kitchen.host));
            }
            if self.kitchen.event.trim().is_empty() {
                return Err("Kitchen event cannot be empty".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(!config.wiretap.enable);
        assert!(config.wiretap.active);
        assert_eq!(config.kitchen.host, "waitress");
        assert_eq!(config.kitchen.orders, vec!["fries", "burger"]);
        assert_eq!(
            config.actors.keys().collect::<Vec<_>>(),
            vec!["chef", "waiter", "waitress"]
        );
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courier.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.kitchen.event, "orderReady");
        assert!(path.exists());

        // The file written out must load back to the same shape
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.actors.len(), 3);
        assert_eq!(
            reloaded.actors["chef"].reactions["handleOrderPlaced"],
            "orderCooked"
        );
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[logging]
level = "debug"
json_format = true

[wiretap]
enable = true

[kitchen]
host = "host"
event = "seat"
orders = ["soup"]

[actors.host]
channel_name = "Door"
messages = { seat = "Hall guest.seated" }

[actors.hall]
channel_name = "Hall"
namespace = "Hall.v2"
subscriptions = { handleSeated = ["Hall guest.seated", "guest.left"] }
"#;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diner.toml");
        fs::write(&path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert!(config.wiretap.enable);
        assert!(config.wiretap.active);
        assert_eq!(config.kitchen.orders, vec!["soup"]);

        let hall = &config.actors["hall"];
        assert_eq!(hall.messaging.resolved_channel(), "Hall.v2");
        assert!(hall.reactions.is_empty());
        assert_eq!(
            hall.messaging.subscriptions["handleSeated"],
            courier::OneOrMany::Many(vec![
                "Hall guest.seated".to_string(),
                "guest.left".to_string()
            ])
        );
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[logging\nlevel = ").await.unwrap();

        assert!(AppConfig::load_from_file(&path).await.is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }

    #[test]
    fn test_validation_unknown_host() {
        let mut config = AppConfig::default();
        config.kitchen.host = "sommelier".to_string();
        assert!(config.validate().is_err());

        config.kitchen.orders.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_malformed_route() {
        let mut config = AppConfig::default();
        if let Some(chef) = config.actors.get_mut("chef") {
            chef.messaging
                .messages
                .insert("burnt".to_string(), "no-topic-here".to_string());
        }
        let err = config.validate().unwrap_err();
        assert!(err.starts_with("Actor 'chef'"));
    }

    #[test]
    fn test_validation_dangling_reaction() {
        let mut config = AppConfig::default();
        if let Some(waiter) = config.actors.get_mut("waiter") {
            waiter
                .reactions
                .insert("handleNothing".to_string(), "shrug".to_string());
        }
        assert!(config.validate().is_err());
    }
}
