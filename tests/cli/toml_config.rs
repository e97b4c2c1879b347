//! CLI TOML configuration tests
//!
//! Configuration file values sit underneath command line values.

use crate::common::PluginDir;
use clap::Parser;
use plughost::app::cli::args::*;
use plughost::app::cli::config::ConfigError;
use std::path::PathBuf;
use toml::Table;

#[test]
fn test_toml_values_fill_unset_options() {
    let mut args = Args::default();
    let mut config = Table::new();
    config.insert(
        "plugins-dir".to_string(),
        toml::Value::String("/srv/plugins".to_string()),
    );
    config.insert("color".to_string(), toml::Value::Boolean(true));
    config.insert("event-capacity".to_string(), toml::Value::Integer(32));

    Args::apply_toml_values(&mut args, &config).unwrap();

    assert_eq!(args.plugins_dir, Some(PathBuf::from("/srv/plugins")));
    assert_eq!(args.color, Some(true));
    assert_eq!(args.host_settings().event_capacity, 32);
}

#[test]
fn test_negative_timeout_is_rejected() {
    let mut args = Args::default();
    let mut config = Table::new();
    config.insert(
        "invocation-timeout-ms".to_string(),
        toml::Value::Integer(-5),
    );

    let err = Args::apply_toml_values(&mut args, &config).unwrap_err();
    assert!(err.to_string().contains("invocation-timeout-ms"));
}

#[tokio::test]
async fn test_cli_overrides_config_file() {
    let dir = PluginDir::new();
    dir.write_config(
        r#"
        log-format = "json"
        log-level = "error"
        exclude-plugin = ["from-file"]
        "#,
    );

    let mut args = Args::try_parse_from([
        "plughost".to_string(),
        "--config-file".to_string(),
        dir.config_file().to_string_lossy().to_string(),
        "--log-level".to_string(),
        "trace".to_string(),
        "--exclude-plugin".to_string(),
        "from-cli".to_string(),
    ])
    .unwrap();
    args.apply_config_file().await.unwrap();

    assert_eq!(args.log_level.as_deref(), Some("trace"));
    assert_eq!(args.log_format.as_deref(), Some("json"));
    assert_eq!(args.plugin_exclusions, vec!["from-cli", "from-file"]);
}

#[tokio::test]
async fn test_unknown_log_format_in_file_is_an_error() {
    let dir = PluginDir::new();
    dir.write_config(r#"log-format = "xml""#);

    let mut args = Args {
        config_file: Some(dir.config_file()),
        ..Args::default()
    };
    assert!(matches!(
        args.apply_config_file().await,
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn test_binary_exits_with_usage_code_on_bad_config() {
    let dir = PluginDir::new();
    dir.write_config("plugins-dir = [");

    let output = dir.run(&["list"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error parsing configuration file"));
}

#[test]
fn test_exclusions_from_config_file_apply_to_discovery() {
    let dir = PluginDir::new();
    dir.echo_plugin("kept", false);
    dir.echo_plugin("hidden", false);
    dir.write_config(r#"exclude-plugin = "hidden""#);

    let output = dir.run(&["list", "--json"]);
    assert!(output.status.success());
    let manifests: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<_> = manifests
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["kept"]);
}
