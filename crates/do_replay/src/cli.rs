//! Command-line interface for the replay harness.
//!
//! Options override the matching settings of the configuration file.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "do_hierarchy.toml";

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// JSON-lines event file; standard input when absent
    pub events_path: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Deleting unknown ids only traces
    pub tolerant: bool,
    /// Print the final hierarchy as JSON
    pub dump: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            events_path: None,
            log_level: None,
            json_logs: false,
            tolerant: false,
            dump: false,
        }
    }
}

impl CliArgs {
    /// Parses the process arguments. Exits with usage on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list; the first item is the binary name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            events_path: matches.get_one::<String>("events").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            tolerant: matches.get_flag("tolerant"),
            dump: matches.get_flag("dump"),
        }
    }
}

/// The clap command definition.
pub fn command() -> Command {
    Command::new("do-replay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Replays object lifecycle events through the distributed-object hierarchy")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("events")
                .short('e')
                .long("events")
                .value_name("FILE")
                .help("JSON-lines lifecycle event file (default: stdin)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (error, warning, info, debug)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tolerant")
                .long("tolerant")
                .help("Treat deletes of unknown ids as trace-level noise")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .help("Print the final hierarchy as JSON")
                .action(clap::ArgAction::SetTrue),
        )
}
