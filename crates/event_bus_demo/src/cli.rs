//! Command-line interface for the demo host.

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments. Every option except the config path overrides
/// the matching configuration file setting.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    pub log_level: Option<String>,
    pub json_logs: bool,
    /// Number of simulated rounds
    pub rounds: Option<u32>,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(command().get_matches())
    }

    /// Parses an explicit argument list (first item is the program name).
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        command().try_get_matches_from(args).map(Self::from_matches)
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            rounds: matches.get_one::<u32>("rounds").copied(),
        }
    }
}

fn command() -> Command {
    Command::new("event-bus-demo")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Publishes simulated game events through an event bus with scheduled handlers")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
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
            Arg::new("rounds")
                .short('n')
                .long("rounds")
                .value_name("ROUNDS")
                .help("Number of simulated rounds")
                .value_parser(value_parser!(u32)),
        )
}
