//! Command-line interface handling for the courier kitchen demo.
//!
//! This module provides command-line argument parsing using the `clap` crate.

use clap::{Arg, ArgAction, Command};
use std::ffi::OsString;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "courier.toml";

/// Command line arguments parsed from user input.
///
/// Every option except the config path overrides a configuration file
/// setting.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Whether to force the bus wiretap on
    pub wiretap: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::parse_from(std::env::args_os())
    }

    /// Parses an explicit argument list; the first item is the binary name.
    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().get_matches_from(args);

        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            wiretap: matches.get_flag("wiretap"),
        }
    }

    fn command() -> Command {
        Command::new("Courier Kitchen")
            .version(env!("CARGO_PKG_VERSION"))
            .author("Horizon Team <team@horizon.dev>")
            .about("Runs messenger objects over a shared channel/topic bus")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value(DEFAULT_CONFIG_PATH),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("wiretap")
                    .short('w')
                    .long("wiretap")
                    .help("Log every message published on the bus")
                    .action(ArgAction::SetTrue),
            )
    }
}
