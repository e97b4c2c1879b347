//! `list`, `invoke` and `renderer` against real plugin directories

use crate::common::{stdout_of, PluginDir};
use serde_json::{json, Value};

#[test]
fn test_list_prints_every_discovered_plugin() {
    let dir = PluginDir::new();
    dir.echo_plugin("beta", true);
    dir.echo_plugin("alpha", false);
    dir.plugin("no-id", json!({"name": "nameless"}));

    let output = dir.run(&["list"]);
    assert!(output.status.success());
    let text = stdout_of(&output);
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected listing:\n{text}");
    assert!(lines[0].starts_with("alpha"));
    assert!(lines[0].contains("disabled"));
    assert!(lines[1].starts_with("beta"));
    assert!(lines[1].contains("enabled"));
    assert!(lines[1].ends_with("beta plugin"));
}

#[test]
fn test_list_json_uses_manifest_field_names() {
    let dir = PluginDir::new();
    dir.echo_plugin("terminal", true);

    let output = dir.run(&["list", "--json"]);
    assert!(output.status.success());
    let manifests: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        manifests,
        json!([{
            "id": "terminal",
            "name": "terminal plugin",
            "version": "1.2.3",
            "enabled": true,
            "mainEntry": "dist/main.wat",
            "rendererEntry": "./dist/renderer.js"
        }])
    );
}

#[test]
fn test_list_empty_directory() {
    let dir = PluginDir::new();
    let output = dir.run(&["list"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).starts_with("No plugins found in"));
}

#[test]
fn test_invoke_enabled_plugin() {
    let dir = PluginDir::new();
    dir.echo_plugin("echo", true);

    let output = dir.run(&["invoke", "echo", "ping"]);
    assert!(output.status.success());
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope, json!({"success": true, "result": "pong"}));
}

#[test]
fn test_invoke_activates_disabled_plugin_on_demand() {
    let dir = PluginDir::new();
    dir.echo_plugin("echo", false);

    let output = dir.run(&["invoke", "echo", "echo", "1", "{\"a\":true}", "plain text"]);
    assert!(output.status.success());
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        envelope,
        json!({"success": true, "result": [1, {"a": true}, "plain text"]})
    );
}

#[test]
fn test_invoke_failures_exit_non_zero() {
    let dir = PluginDir::new();
    dir.echo_plugin("echo", true);

    let fault = dir.run(&["invoke", "echo", "fail"]);
    assert_eq!(fault.status.code(), Some(1));
    let envelope: Value = serde_json::from_slice(&fault.stdout).unwrap();
    assert_eq!(envelope, json!({"success": false, "error": "boom"}));

    let missing = dir.run(&["invoke", "echo", "nope"]);
    assert_eq!(missing.status.code(), Some(1));
    let envelope: Value = serde_json::from_slice(&missing.stdout).unwrap();
    assert_eq!(envelope["error"], "Method nope not found in plugin echo");

    let unknown = dir.run(&["invoke", "ghost", "ping"]);
    assert_eq!(unknown.status.code(), Some(1));
    let envelope: Value = serde_json::from_slice(&unknown.stdout).unwrap();
    assert_eq!(
        envelope["error"],
        "Plugin ghost not active or has no exposed methods"
    );
}

#[test]
fn test_renderer_location() {
    let dir = PluginDir::new();
    dir.echo_plugin("terminal", false);
    dir.plugin("headless", json!({"id": "headless", "main": "main.wat"}));

    let output = dir.run(&["renderer", "terminal"]);
    assert!(output.status.success());
    assert_eq!(stdout_of(&output).trim(), "/plugins/terminal/dist/renderer.js");

    assert_eq!(dir.run(&["renderer", "headless"]).status.code(), Some(1));
    assert_eq!(dir.run(&["renderer", "ghost"]).status.code(), Some(1));
}
