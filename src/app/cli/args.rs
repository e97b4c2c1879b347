//! Command line arguments
//!
//! Global options configure discovery, timeouts and logging; the subcommand
//! picks what the host does once plugins are registered.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Global arguments structure with all command-line options
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "plughost")]
#[command(about = "Discover, activate and call sandboxed plugins")]
#[command(version)]
#[command(after_help = " * can be specified multiple times or as a comma-separated list")]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Plugin directory override
    #[arg(short = 'p', long = "plugins-dir", value_name = "DIR")]
    pub plugins_dir: Option<PathBuf>,

    /// Plugins to exclude from discovery*
    #[arg(long = "exclude-plugin", value_name = "IDS", action = ArgAction::Append, value_delimiter = ',')]
    pub plugin_exclusions: Vec<String>,

    /// Color output control (true/false); unspecified means auto-detect
    #[arg(short = 'g', long = "color", value_name = "BOOL")]
    pub color: Option<bool>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Timeout for plugin activation hooks, in milliseconds
    #[arg(
        long = "activation-timeout-ms",
        value_name = "MS",
        value_parser = clap::builder::RangedU64ValueParser::<u64>::new().range(1..)
    )]
    pub activation_timeout_ms: Option<u64>,

    /// Timeout for a single plugin method call, in milliseconds
    #[arg(
        long = "invocation-timeout-ms",
        value_name = "MS",
        value_parser = clap::builder::RangedU64ValueParser::<u64>::new().range(1..)
    )]
    pub invocation_timeout_ms: Option<u64>,

    /// Buffered plugin events per subscriber
    #[arg(
        long = "event-capacity",
        value_name = "COUNT",
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub event_capacity: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do after discovery
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List discovered plugins
    List {
        /// Print manifests as JSON
        #[arg(long)]
        json: bool,
    },

    /// Activate a plugin if needed and call one of its methods
    Invoke {
        /// Plugin id
        plugin_id: String,

        /// Method name
        method: String,

        /// Arguments; each is parsed as JSON, falling back to a plain string
        #[arg(value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Print where a plugin's presentation module is served from
    Renderer {
        /// Plugin id
        plugin_id: String,
    },

    /// Serve the JSON line protocol on stdin and stdout
    Serve,
}

impl Args {
    /// Subcommand to run, `serve` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Log file as a string, with "none" and "-" disabling file logging
    pub fn log_file_str(&self) -> Option<String> {
        let path = self.log_file.as_ref()?.to_string_lossy().to_string();
        if path.eq_ignore_ascii_case("none") || path == "-" {
            None
        } else {
            Some(path)
        }
    }

    /// Whether to use colored output
    pub fn use_color(&self) -> bool {
        use std::io::IsTerminal;
        self.color.unwrap_or_else(|| std::io::stderr().is_terminal())
    }
}
