//! # Courier Kitchen - Main Entry Point
//!
//! Runnable demo of the `courier` crate: several messenger objects share one
//! bus, take orders, cook them and serve them. This entry point handles CLI
//! parsing, configuration loading and application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! courier_app
//!
//! # Specify custom configuration
//! courier_app --config diner.toml
//!
//! # Log every bus message
//! courier_app --wiretap --log-level debug
//!
//! # JSON logging
//! courier_app --json-logs
//! ```
//!
//! ## Configuration
//!
//! The application loads configuration from a TOML file (default:
//! `courier.toml`). If the file doesn't exist, a default configuration with a
//! chef, a waiter and a waitress is created.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the application: parse arguments, set up logging, build and run.
///
/// Called from the binary's async `main`.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the config file, so read it first
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        return Err(e);
    }

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            return Err(e);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {:?}", e);
        return Err(e);
    }

    Ok(())
}

// Re-export main types for library usage
pub use app::KitchenActor;
pub use config::{ActorSettings, KitchenSettings, LoggingSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_application_from_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("courier.toml");
        let toml_content = toml::to_string_pretty(&AppConfig::default()).unwrap();
        tokio::fs::write(&config_path, toml_content).await.unwrap();

        let args = CliArgs {
            config_path,
            log_level: Some("debug".to_string()),
            json_logs: false,
            wiretap: true,
        };

        let app = Application::new(args).await.unwrap();
        app.start();
        assert_eq!(app.bus().wiretap_count(), 1);
        assert_eq!(app.place_orders(), 2);
        app.shutdown();
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_override() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("courier.toml"),
            log_level: Some("chatty".to_string()),
            json_logs: false,
            wiretap: false,
        };

        assert!(Application::new(args).await.is_err());
        assert!(dir.path().join("courier.toml").exists());
    }
}
