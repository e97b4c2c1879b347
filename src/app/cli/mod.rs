//! CLI module containing argument parsing and configuration file layering

pub mod args;
pub mod config;

pub use args::{Args, Command};
pub use config::{default_config_path, ConfigError};
