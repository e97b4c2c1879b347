//! CLI Integration Test Modules

pub mod plugin_commands;
pub mod serve_protocol;
pub mod toml_config;
